//! `index`: extract every textbook PDF page by page and replace its pages in
//! the remote store.

mod extract;
mod pipeline;
mod run;
#[cfg(test)]
mod tests;
mod upsert;

pub use run::run;
