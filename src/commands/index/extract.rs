use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::Regex;

use crate::util::truncate_chars;

pub(super) const MAX_PAGE_CONTENT_CHARS: usize = 65_000;

static WHITESPACE_BEFORE_NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+\n").expect("newline whitespace regex is valid"));
static HORIZONTAL_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("horizontal whitespace regex is valid"));

pub(super) trait PageTextSource {
    fn extract_pages(&self, pdf: &Path) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub(super) struct PdftotextExtractor;

impl PageTextSource for PdftotextExtractor {
    fn extract_pages(&self, pdf: &Path) -> Result<Vec<String>> {
        let output = Command::new("pdftotext")
            .arg("-enc")
            .arg("UTF-8")
            .arg(pdf)
            .arg("-")
            .output()
            .with_context(|| format!("failed to execute pdftotext for {}", pdf.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "pdftotext returned non-zero exit status for {}: {}",
                pdf.display(),
                stderr.trim()
            );
        }

        Ok(split_pdftotext_output(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }
}

/// `pdftotext` terminates every page with a form feed, so the chunk after the
/// final form feed is not a page.
pub(super) fn split_pdftotext_output(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }

    let mut pages: Vec<String> = raw
        .split('\u{000C}')
        .map(|chunk| chunk.replace('\u{0000}', ""))
        .collect();

    if raw.ends_with('\u{000C}') {
        pages.pop();
    }

    pages
}

pub(super) fn normalize_page_text(raw: &str) -> String {
    let text = WHITESPACE_BEFORE_NEWLINE.replace_all(raw, "\n");
    let text = HORIZONTAL_WHITESPACE.replace_all(&text, " ");
    truncate_chars(text.trim(), MAX_PAGE_CONTENT_CHARS).to_string()
}
