use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextbookLayout {
    pub grade: u32,
    pub subject: String,
    pub file_key: String,
    pub title: String,
    pub relative_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTextbook {
    pub grade: u32,
    pub subject: String,
    pub title: String,
    pub file_url: String,
}

impl From<&TextbookLayout> for NewTextbook {
    fn from(layout: &TextbookLayout) -> Self {
        Self {
            grade: layout.grade,
            subject: layout.subject.clone(),
            title: layout.title.clone(),
            file_url: layout.file_key.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdRow {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRow {
    pub textbook_id: i64,
    pub grade: u32,
    pub subject: String,
    pub page_number: u32,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub relative_path: String,
    pub sha256: String,
    pub grade: Option<u32>,
    pub subject: Option<String>,
    pub file_key: Option<String>,
    pub title: Option<String>,
    pub layout_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_directory: String,
    pub pdf_count: usize,
    pub layout_error_count: usize,
    pub pdfs: Vec<InventoryEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Indexed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: String,
    pub file_key: Option<String>,
    pub status: FileStatus,
    pub textbook_id: Option<i64>,
    pub pages_inserted: usize,
    pub error_kind: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexCounts {
    pub pdf_count: usize,
    pub indexed_count: usize,
    pub failed_count: usize,
    pub pages_inserted: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub elapsed_seconds: f64,
    pub root: String,
    pub bucket: String,
    pub counts: IndexCounts,
    pub files: Vec<FileOutcome>,
}
