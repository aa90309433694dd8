use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::model::TextbookLayout;

static GRADE_DIR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^Grade\s*([0-9]{1,2})$").expect("grade directory regex is valid")
});
static SUBJECT_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ _]+").expect("subject separator regex is valid"));

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathLayoutError {
    #[error("{path} is not below textbook root {root}")]
    OutsideRoot { path: String, root: String },
    #[error("bad layout (need Grade X/subject/file.pdf): {relative}")]
    TooShallow { relative: String },
    #[error("cannot parse grade from directory: {component}")]
    BadGrade { component: String },
    #[error("path component is not valid UTF-8: {path}")]
    NonUtf8 { path: String },
}

/// Finds `<root>/Grade */<subject>/*.pdf`, sorted.
///
/// Grade directories are matched loosely here (any name starting with
/// "grade"); [`infer_layout`] rejects the ones whose number cannot be parsed.
/// Symlinks are followed and names starting with `.` are skipped. Only a
/// failure to read `root` itself is an error; unreadable folders below it are
/// logged and left out.
pub fn discover_pdfs(root: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(root).with_context(|| format!("failed to read {}", root.display()))?;
    let mut grade_dirs = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", root.display()))?;
        grade_dirs.push(entry.path());
    }
    grade_dirs.retain(|path| path.is_dir() && is_grade_dir(path));
    grade_dirs.sort();

    let mut pdfs = Vec::new();
    for grade_dir in grade_dirs {
        for subject_dir in visible_children(&grade_dir) {
            if !subject_dir.is_dir() {
                continue;
            }
            pdfs.extend(
                visible_children(&subject_dir)
                    .into_iter()
                    .filter(|path| is_pdf(path) && path.is_file()),
            );
        }
    }

    pdfs.sort();
    Ok(pdfs)
}

fn is_grade_dir(path: &Path) -> bool {
    file_name(path).is_some_and(|name| name.to_ascii_lowercase().starts_with("grade"))
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

/// Sorted entries of `dir` whose names do not start with `.`. A folder that
/// cannot be read yields no entries.
fn visible_children(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) => {
            warn!(path = %dir.display(), error = %error, "skipping unreadable folder");
            return Vec::new();
        }
    };

    let mut children = Vec::new();
    for entry in entries {
        match entry {
            Ok(entry) => children.push(entry.path()),
            Err(error) => {
                warn!(path = %dir.display(), error = %error, "skipping unreadable entry");
            }
        }
    }
    children.retain(|path| !file_name(path).is_some_and(|name| name.starts_with('.')));
    children.sort();
    children
}

pub fn infer_layout(root: &Path, pdf: &Path) -> Result<TextbookLayout, PathLayoutError> {
    let relative = pdf
        .strip_prefix(root)
        .map_err(|_| PathLayoutError::OutsideRoot {
            path: pdf.display().to_string(),
            root: root.display().to_string(),
        })?;

    let parts = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .map(|part| {
            part.to_str().ok_or_else(|| PathLayoutError::NonUtf8 {
                path: relative.display().to_string(),
            })
        })
        .collect::<Result<Vec<&str>, PathLayoutError>>()?;

    if parts.len() < 3 {
        return Err(PathLayoutError::TooShallow {
            relative: relative.display().to_string(),
        });
    }

    let grade = parse_grade(parts[0])?;
    let subject = normalize_subject(parts[1]);
    let file_name = parts[parts.len() - 1];
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name);

    Ok(TextbookLayout {
        grade,
        file_key: canonical_key(grade, &subject, file_name),
        title: title_from_stem(stem),
        subject,
        relative_path: relative.display().to_string(),
    })
}

fn parse_grade(component: &str) -> Result<u32, PathLayoutError> {
    GRADE_DIR_PATTERN
        .captures(component)
        .and_then(|captures| captures.get(1))
        .and_then(|grade| grade.as_str().parse::<u32>().ok())
        .ok_or_else(|| PathLayoutError::BadGrade {
            component: component.to_string(),
        })
}

pub fn canonical_key(grade: u32, subject: &str, file_name: &str) -> String {
    format!("grade-{grade}/{subject}/{file_name}")
}

pub fn normalize_subject(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    SUBJECT_SEPARATORS.replace_all(&lowered, "-").into_owned()
}

/// `algebra_part-two` becomes `Algebra Part Two`. A letter is upper-cased when
/// it follows a non-letter, lower-cased otherwise, so `5th` becomes `5Th`.
pub fn title_from_stem(stem: &str) -> String {
    let spaced = stem.replace(['-', '_'], " ");
    let mut title = String::with_capacity(spaced.len());
    let mut previous_is_letter = false;

    for character in spaced.chars() {
        if character.is_alphabetic() {
            if previous_is_letter {
                title.extend(character.to_lowercase());
            } else {
                title.extend(character.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            title.push(character);
            previous_is_letter = false;
        }
    }

    title
}
