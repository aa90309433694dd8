pub mod index;
pub mod inventory;
