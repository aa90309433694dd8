use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use super::extract::PageTextSource;
use super::upsert::{build_page_rows, ensure_textbook, replace_pages};
use crate::layout::{PathLayoutError, infer_layout};
use crate::model::{FileOutcome, FileStatus, IndexCounts, TextbookLayout};
use crate::rest::{StoreError, TextbookStore};

#[derive(Debug, Error)]
pub(super) enum IndexError {
    #[error(transparent)]
    Layout(#[from] PathLayoutError),
    #[error("text extraction failed: {0:#}")]
    Extraction(anyhow::Error),
    #[error(transparent)]
    Remote(#[from] StoreError),
}

impl IndexError {
    pub(super) fn kind(&self) -> &'static str {
        match self {
            Self::Layout(_) => "layout",
            Self::Extraction(_) => "extraction",
            Self::Remote(_) => "remote",
        }
    }
}

#[derive(Debug, Clone)]
pub(super) struct IndexedTextbook {
    pub layout: TextbookLayout,
    pub textbook_id: i64,
    pub created: bool,
    pub pages_inserted: usize,
}

#[derive(Debug, Default)]
pub(super) struct IndexReport {
    pub counts: IndexCounts,
    pub files: Vec<FileOutcome>,
}

pub(super) fn index_pdf<E, S>(
    root: &Path,
    pdf: &Path,
    extractor: &E,
    store: &S,
) -> Result<IndexedTextbook, IndexError>
where
    E: PageTextSource + ?Sized,
    S: TextbookStore + ?Sized,
{
    let layout = infer_layout(root, pdf)?;
    // Extract before touching the store so a broken PDF keeps its stored pages.
    let raw_pages = extractor
        .extract_pages(pdf)
        .map_err(IndexError::Extraction)?;

    let textbook = ensure_textbook(store, &layout)?;
    let pages = build_page_rows(textbook.id, &layout, &raw_pages);
    let pages_inserted = replace_pages(store, textbook.id, &pages)?;

    Ok(IndexedTextbook {
        layout,
        textbook_id: textbook.id,
        created: textbook.created,
        pages_inserted,
    })
}

pub(super) fn index_all<E, S>(
    root: &Path,
    pdfs: &[PathBuf],
    extractor: &E,
    store: &S,
) -> IndexReport
where
    E: PageTextSource + ?Sized,
    S: TextbookStore + ?Sized,
{
    let mut report = IndexReport::default();
    report.counts.pdf_count = pdfs.len();

    for (index, pdf) in pdfs.iter().enumerate() {
        match index_pdf(root, pdf, extractor, store) {
            Ok(indexed) => {
                info!(
                    file = index + 1,
                    of = pdfs.len(),
                    file_key = %indexed.layout.file_key,
                    textbook_id = indexed.textbook_id,
                    created = indexed.created,
                    pages = indexed.pages_inserted,
                    "indexed textbook"
                );
                report.counts.indexed_count += 1;
                report.counts.pages_inserted += indexed.pages_inserted;
                report.files.push(FileOutcome {
                    path: pdf.display().to_string(),
                    file_key: Some(indexed.layout.file_key),
                    status: FileStatus::Indexed,
                    textbook_id: Some(indexed.textbook_id),
                    pages_inserted: indexed.pages_inserted,
                    error_kind: None,
                    error: None,
                });
            }
            Err(error) => {
                warn!(
                    path = %pdf.display(),
                    kind = error.kind(),
                    error = %error,
                    "failed to index PDF"
                );
                report.counts.failed_count += 1;
                report.files.push(FileOutcome {
                    path: pdf.display().to_string(),
                    file_key: infer_layout(root, pdf).ok().map(|layout| layout.file_key),
                    status: FileStatus::Failed,
                    textbook_id: None,
                    pages_inserted: 0,
                    error_kind: Some(error.kind().to_string()),
                    error: Some(error.to_string()),
                });
            }
        }
    }

    report
}
