use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};
use mockito::{Matcher, Server};
use tempfile::TempDir;

use super::extract::{
    MAX_PAGE_CONTENT_CHARS, PageTextSource, normalize_page_text, split_pdftotext_output,
};
use super::pipeline::{IndexError, index_pdf};
use super::run::execute;
use super::upsert::{PAGE_BATCH_SIZE, build_page_rows, ensure_textbook, replace_pages};
use crate::config::{IndexerConfig, StoreConfig};
use crate::layout::infer_layout;
use crate::model::{FileStatus, NewTextbook, PageRow, TextbookLayout};
use crate::rest::{RestStore, StoreError, TextbookStore};
use crate::retry::RetryPolicy;

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    textbooks: Vec<(i64, NewTextbook)>,
    pages: Vec<PageRow>,
    calls: Vec<String>,
    insert_batch_sizes: Vec<usize>,
    fail_page_inserts: bool,
}

#[derive(Default)]
struct MemoryStore {
    state: RefCell<MemoryState>,
}

impl MemoryStore {
    fn failing_page_inserts() -> Self {
        let store = Self::default();
        store.state.borrow_mut().fail_page_inserts = true;
        store
    }

    fn pages_for(&self, textbook_id: i64) -> Vec<PageRow> {
        self.state
            .borrow()
            .pages
            .iter()
            .filter(|page| page.textbook_id == textbook_id)
            .cloned()
            .collect()
    }
}

impl TextbookStore for MemoryStore {
    fn find_textbook(
        &self,
        grade: u32,
        subject: &str,
        file_url: &str,
    ) -> Result<Option<i64>, StoreError> {
        let mut state = self.state.borrow_mut();
        state.calls.push("find".to_string());
        Ok(state
            .textbooks
            .iter()
            .find(|(_, row)| {
                row.grade == grade && row.subject == subject && row.file_url == file_url
            })
            .map(|(id, _)| *id))
    }

    fn insert_textbook(&self, textbook: &NewTextbook) -> Result<i64, StoreError> {
        let mut state = self.state.borrow_mut();
        state.calls.push("insert_textbook".to_string());
        state.next_id += 1;
        let id = state.next_id;
        state.textbooks.push((id, textbook.clone()));
        Ok(id)
    }

    fn delete_pages(&self, textbook_id: i64) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        state.calls.push("delete_pages".to_string());
        state.pages.retain(|page| page.textbook_id != textbook_id);
        Ok(())
    }

    fn insert_pages(&self, pages: &[PageRow]) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        state.calls.push("insert_pages".to_string());
        if state.fail_page_inserts {
            return Err(StoreError::NoRowsReturned {
                table: "textbook_pages",
            });
        }
        state.insert_batch_sizes.push(pages.len());
        state.pages.extend_from_slice(pages);
        Ok(())
    }
}

struct FixedPages(Vec<String>);

impl PageTextSource for FixedPages {
    fn extract_pages(&self, pdf: &Path) -> Result<Vec<String>> {
        if pdf.file_name().and_then(|name| name.to_str()) == Some("broken.pdf") {
            return Err(anyhow!("pdftotext returned non-zero exit status: Syntax Error"));
        }
        Ok(self.0.clone())
    }
}

fn pages(count: usize) -> Vec<String> {
    (1..=count).map(|number| format!("page {number}")).collect()
}

fn layout() -> TextbookLayout {
    TextbookLayout {
        grade: 6,
        subject: "natural-sciences".to_string(),
        file_key: "grade-6/natural-sciences/energy.pdf".to_string(),
        title: "Energy".to_string(),
        relative_path: "Grade 6/Natural Sciences/energy.pdf".to_string(),
    }
}

fn touch(root: &Path, relative: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("fixture has a parent")).expect("create fixture dirs");
    fs::write(&path, b"%PDF-1.4\n").expect("write fixture");
    path
}

fn config_for(root: &Path, url: &str) -> IndexerConfig {
    IndexerConfig {
        root: root.to_path_buf(),
        store: StoreConfig {
            url: url.to_string(),
            service_key: "test-key".to_string(),
            bucket: "school_textbooks".to_string(),
        },
    }
}

fn no_sleep(_: Duration) {}

#[test]
fn normalize_page_text_collapses_whitespace_runs() {
    assert_eq!(normalize_page_text("Hello   \n\nWorld\t\tFoo"), "Hello\nWorld Foo");
    assert_eq!(normalize_page_text("  \n Title \t \n\n\nBody  "), "Title\nBody");
    assert_eq!(normalize_page_text(""), "");
}

#[test]
fn normalize_page_text_truncates_to_exact_limit() {
    let long = "a".repeat(MAX_PAGE_CONTENT_CHARS + 5_000);
    let normalized = normalize_page_text(&long);
    assert_eq!(normalized.chars().count(), MAX_PAGE_CONTENT_CHARS);

    let multibyte = "é".repeat(MAX_PAGE_CONTENT_CHARS + 1);
    let normalized = normalize_page_text(&multibyte);
    assert_eq!(normalized.chars().count(), MAX_PAGE_CONTENT_CHARS);

    let exact = "b".repeat(MAX_PAGE_CONTENT_CHARS);
    assert_eq!(normalize_page_text(&exact), exact);
}

#[test]
fn split_pdftotext_output_keeps_empty_pages_and_drops_terminator() {
    assert_eq!(
        split_pdftotext_output("first\u{000C}\u{000C}third\u{0000}\u{000C}"),
        vec!["first".to_string(), String::new(), "third".to_string()]
    );
    assert_eq!(split_pdftotext_output("only page"), vec!["only page".to_string()]);
    assert!(split_pdftotext_output("").is_empty());
}

#[test]
fn build_page_rows_numbers_pages_from_one_and_copies_parent_fields() {
    let rows = build_page_rows(
        9,
        &layout(),
        &["  intro  ".to_string(), String::new(), "a\t\tb".to_string()],
    );

    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows.iter().map(|row| row.page_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(rows.iter().all(|row| row.textbook_id == 9
        && row.grade == 6
        && row.subject == "natural-sciences"));
    assert_eq!(rows[0].content, "intro");
    assert_eq!(rows[1].content, "");
    assert_eq!(rows[2].content, "a b");
}

#[test]
fn ensure_textbook_creates_once_then_reuses_existing_row() {
    let store = MemoryStore::default();

    let first = ensure_textbook(&store, &layout()).expect("create");
    let second = ensure_textbook(&store, &layout()).expect("reuse");

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.id, second.id);
    assert_eq!(store.state.borrow().textbooks.len(), 1);
    assert_eq!(store.state.borrow().textbooks[0].1.title, "Energy");
}

#[test]
fn replace_pages_sends_450_pages_as_200_200_50_after_delete() {
    let store = MemoryStore::default();
    let rows = build_page_rows(1, &layout(), &pages(450));

    let inserted = replace_pages(&store, 1, &rows).expect("replace");

    assert_eq!(inserted, 450);
    let state = store.state.borrow();
    assert_eq!(state.insert_batch_sizes, vec![200, 200, 50]);
    assert_eq!(
        state.calls,
        vec!["delete_pages", "insert_pages", "insert_pages", "insert_pages"]
    );
}

#[test]
fn replace_pages_with_no_pages_only_deletes() {
    let store = MemoryStore::default();
    store.state.borrow_mut().pages = build_page_rows(4, &layout(), &pages(3));

    let inserted = replace_pages(&store, 4, &[]).expect("replace");

    assert_eq!(inserted, 0);
    assert!(store.pages_for(4).is_empty());
    assert_eq!(store.state.borrow().calls, vec!["delete_pages"]);
}

#[test]
fn replace_pages_over_rest_posts_one_request_per_batch() {
    let mut server = Server::new();
    let delete = server
        .mock("DELETE", "/rest/v1/textbook_pages")
        .match_query(Matcher::UrlEncoded("textbook_id".into(), "eq.12".into()))
        .with_status(204)
        .expect(1)
        .create();
    let insert = server
        .mock("POST", "/rest/v1/textbook_pages")
        .with_status(201)
        .with_body("[]")
        .expect(3)
        .create();

    let store = RestStore::new(&config_for(Path::new("/unused"), &server.url()).store)
        .expect("client builds")
        .with_retry(RetryPolicy::default().with_sleep(no_sleep));
    let rows = build_page_rows(12, &layout(), &pages(2 * PAGE_BATCH_SIZE + 50));

    let inserted = replace_pages(&store, 12, &rows).expect("replace");

    assert_eq!(inserted, 450);
    delete.assert();
    insert.assert();
}

#[test]
fn index_pdf_reports_layout_errors_before_touching_the_store() {
    let temp = TempDir::new().expect("temp dir");
    let pdf = touch(temp.path(), "Grade X/Maths/algebra.pdf");
    let store = MemoryStore::default();

    let error = index_pdf(temp.path(), &pdf, &FixedPages(pages(2)), &store)
        .expect_err("bad grade");

    assert_eq!(error.kind(), "layout");
    assert!(store.state.borrow().calls.is_empty());
}

#[test]
fn index_pdf_extraction_failure_keeps_previous_pages() {
    let temp = TempDir::new().expect("temp dir");
    let pdf = touch(temp.path(), "Grade 3/Maths/broken.pdf");
    let store = MemoryStore::default();
    let layout = infer_layout(temp.path(), &pdf).expect("layout");
    let id = ensure_textbook(&store, &layout).expect("seed textbook").id;
    store.state.borrow_mut().pages = build_page_rows(id, &layout, &pages(4));

    let error = index_pdf(temp.path(), &pdf, &FixedPages(pages(2)), &store)
        .expect_err("extraction fails");

    assert!(matches!(error, IndexError::Extraction(_)));
    assert!(error.to_string().contains("Syntax Error"));
    assert_eq!(store.pages_for(id).len(), 4);
}

#[test]
fn execute_twice_keeps_one_textbook_and_exact_page_set() {
    let temp = TempDir::new().expect("temp dir");
    touch(temp.path(), "Grade 5/Life Skills/my_body-book.pdf");
    let config = config_for(temp.path(), "http://127.0.0.1:9");
    let store = MemoryStore::default();
    let extractor = FixedPages(pages(7));

    let first = execute(&config, &extractor, &store).expect("first run");
    let second = execute(&config, &extractor, &store).expect("second run");

    assert_eq!(first.counts.indexed_count, 1);
    assert_eq!(second.counts.indexed_count, 1);
    assert_eq!(second.files[0].file_key.as_deref(), Some("grade-5/life-skills/my_body-book.pdf"));

    let state = store.state.borrow();
    assert_eq!(state.textbooks.len(), 1);
    assert_eq!(state.textbooks[0].1.title, "My Body Book");
    let mut numbers = state.pages.iter().map(|page| page.page_number).collect::<Vec<_>>();
    numbers.sort_unstable();
    assert_eq!(numbers, (1..=7).collect::<Vec<u32>>());
}

#[test]
fn execute_continues_past_failing_files() {
    let temp = TempDir::new().expect("temp dir");
    touch(temp.path(), "Grade 1/Art/broken.pdf");
    touch(temp.path(), "Grade 1/Art/colours.pdf");
    touch(temp.path(), "Grade one/Art/shapes.pdf");
    let config = config_for(temp.path(), "http://127.0.0.1:9");
    let store = MemoryStore::default();

    let manifest = execute(&config, &FixedPages(pages(2)), &store).expect("run completes");

    assert_eq!(manifest.counts.pdf_count, 3);
    assert_eq!(manifest.counts.indexed_count, 1);
    assert_eq!(manifest.counts.failed_count, 2);
    assert_eq!(manifest.counts.pages_inserted, 2);

    let kinds = manifest
        .files
        .iter()
        .map(|file| (file.status, file.error_kind.as_deref()))
        .collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![
            (FileStatus::Failed, Some("extraction")),
            (FileStatus::Indexed, None),
            (FileStatus::Failed, Some("layout")),
        ]
    );
}

#[test]
fn execute_records_remote_failures_per_file() {
    let temp = TempDir::new().expect("temp dir");
    touch(temp.path(), "Grade 2/Maths/counting.pdf");
    let config = config_for(temp.path(), "http://127.0.0.1:9");
    let store = MemoryStore::failing_page_inserts();

    let manifest = execute(&config, &FixedPages(pages(3)), &store).expect("run completes");

    assert_eq!(manifest.counts.failed_count, 1);
    assert_eq!(manifest.files[0].error_kind.as_deref(), Some("remote"));
    assert_eq!(manifest.files[0].file_key.as_deref(), Some("grade-2/maths/counting.pdf"));
}

#[test]
fn execute_fails_when_root_is_missing() {
    let temp = TempDir::new().expect("temp dir");
    let config = config_for(&temp.path().join("absent"), "http://127.0.0.1:9");

    let error = execute(&config, &FixedPages(Vec::new()), &MemoryStore::default())
        .expect_err("missing root");
    assert!(error.to_string().contains("LOCAL_TEXTBOOKS_ROOT not found"));
}

#[test]
fn execute_fails_when_no_pdfs_match() {
    let temp = TempDir::new().expect("temp dir");
    touch(temp.path(), "Grade 4/Maths/readme.txt");
    let config = config_for(temp.path(), "http://127.0.0.1:9");
    let store = MemoryStore::default();

    let error = execute(&config, &FixedPages(Vec::new()), &store).expect_err("no PDFs");
    assert!(error.to_string().contains("no PDFs under"));
    assert!(store.state.borrow().calls.is_empty());
}
