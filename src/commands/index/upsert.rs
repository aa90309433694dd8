use tracing::{debug, info};

use super::extract::normalize_page_text;
use crate::model::{NewTextbook, PageRow, TextbookLayout};
use crate::rest::{StoreError, TextbookStore};

pub(super) const PAGE_BATCH_SIZE: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct TextbookRef {
    pub id: i64,
    pub created: bool,
}

/// Two concurrent runs can both miss the lookup and insert duplicate textbooks.
pub(super) fn ensure_textbook<S>(
    store: &S,
    layout: &TextbookLayout,
) -> Result<TextbookRef, StoreError>
where
    S: TextbookStore + ?Sized,
{
    if let Some(id) = store.find_textbook(layout.grade, &layout.subject, &layout.file_key)? {
        debug!(textbook_id = id, file_key = %layout.file_key, "reusing textbook");
        return Ok(TextbookRef { id, created: false });
    }

    let id = store.insert_textbook(&NewTextbook::from(layout))?;
    info!(
        textbook_id = id,
        file_key = %layout.file_key,
        title = %layout.title,
        "created textbook"
    );
    Ok(TextbookRef { id, created: true })
}

pub(super) fn build_page_rows(
    textbook_id: i64,
    layout: &TextbookLayout,
    raw_pages: &[String],
) -> Vec<PageRow> {
    raw_pages
        .iter()
        .enumerate()
        .map(|(index, raw)| PageRow {
            textbook_id,
            grade: layout.grade,
            subject: layout.subject.clone(),
            page_number: (index + 1) as u32,
            content: normalize_page_text(raw),
        })
        .collect()
}

pub(super) fn replace_pages<S>(
    store: &S,
    textbook_id: i64,
    pages: &[PageRow],
) -> Result<usize, StoreError>
where
    S: TextbookStore + ?Sized,
{
    store.delete_pages(textbook_id)?;

    let batch_count = pages.len().div_ceil(PAGE_BATCH_SIZE);
    let mut inserted = 0usize;
    for (index, batch) in pages.chunks(PAGE_BATCH_SIZE).enumerate() {
        store.insert_pages(batch)?;
        inserted += batch.len();
        debug!(
            textbook_id,
            batch = index + 1,
            batch_count,
            rows = batch.len(),
            "inserted page batch"
        );
    }

    Ok(inserted)
}
