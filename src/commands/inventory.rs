use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::cli::InventoryArgs;
use crate::config::{env_lookup, resolve_root};
use crate::layout::{discover_pdfs, infer_layout};
use crate::model::{InventoryEntry, InventoryManifest};
use crate::util::{now_utc_string, sha256_file, write_json_pretty};

const DEFAULT_MANIFEST_PATH: &str = "manifests/textbook_inventory.json";

pub fn run(args: InventoryArgs) -> Result<()> {
    let root = resolve_root(args.root.clone(), env_lookup);
    let manifest = build_manifest(&root)?;

    for entry in &manifest.pdfs {
        if let Some(error) = &entry.layout_error {
            warn!(path = %entry.relative_path, error = %error, "unusable textbook path");
        }
    }

    if args.dry_run {
        info!(
            pdf_count = manifest.pdf_count,
            layout_errors = manifest.layout_error_count,
            source = %manifest.source_directory,
            "inventory dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args
        .manifest_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST_PATH));

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote inventory manifest");
    info!(
        pdf_count = manifest.pdf_count,
        layout_errors = manifest.layout_error_count,
        "inventory completed"
    );

    Ok(())
}

pub fn build_manifest(root: &Path) -> Result<InventoryManifest> {
    if !root.is_dir() {
        bail!("LOCAL_TEXTBOOKS_ROOT not found: {}", root.display());
    }

    let pdf_paths = discover_pdfs(root)?;
    if pdf_paths.is_empty() {
        bail!("no PDFs under {}/Grade */<subject>/*.pdf", root.display());
    }

    let mut pdfs = Vec::with_capacity(pdf_paths.len());
    for path in &pdf_paths {
        let sha256 = sha256_file(path)?;
        let relative_path = path
            .strip_prefix(root)
            .unwrap_or(path)
            .display()
            .to_string();

        let entry = match infer_layout(root, path) {
            Ok(layout) => InventoryEntry {
                relative_path,
                sha256,
                grade: Some(layout.grade),
                subject: Some(layout.subject),
                file_key: Some(layout.file_key),
                title: Some(layout.title),
                layout_error: None,
            },
            Err(error) => InventoryEntry {
                relative_path,
                sha256,
                grade: None,
                subject: None,
                file_key: None,
                title: None,
                layout_error: Some(error.to_string()),
            },
        };
        pdfs.push(entry);
    }

    let layout_error_count = pdfs
        .iter()
        .filter(|entry| entry.layout_error.is_some())
        .count();

    Ok(InventoryManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source_directory: root.display().to_string(),
        pdf_count: pdfs.len(),
        layout_error_count,
        pdfs,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::build_manifest;

    fn write(root: &Path, relative: &str, body: &[u8]) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().expect("fixture has a parent")).expect("create dirs");
        fs::write(path, body).expect("write fixture");
    }

    #[test]
    fn build_manifest_records_layout_and_hash_per_pdf() {
        let temp = TempDir::new().expect("temp dir");
        write(temp.path(), "Grade 8/Social_Sciences/map-skills.pdf", b"abc");
        write(temp.path(), "Grade eight/Maths/fractions.pdf", b"x");

        let manifest = build_manifest(temp.path()).expect("manifest builds");

        assert_eq!(manifest.pdf_count, 2);
        assert_eq!(manifest.layout_error_count, 1);

        let good = &manifest.pdfs[0];
        assert_eq!(good.relative_path, "Grade 8/Social_Sciences/map-skills.pdf");
        assert_eq!(good.grade, Some(8));
        assert_eq!(good.file_key.as_deref(), Some("grade-8/social-sciences/map-skills.pdf"));
        assert_eq!(good.title.as_deref(), Some("Map Skills"));
        assert_eq!(
            good.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        let bad = &manifest.pdfs[1];
        assert!(bad.grade.is_none());
        assert!(
            bad.layout_error
                .as_deref()
                .is_some_and(|error| error.contains("Grade eight"))
        );
    }

    #[test]
    fn build_manifest_fails_without_pdfs() {
        let temp = TempDir::new().expect("temp dir");
        fs::create_dir_all(temp.path().join("Grade 1/Maths")).expect("create dirs");

        let error = build_manifest(temp.path()).expect_err("empty tree");
        assert!(error.to_string().contains("no PDFs under"));
    }
}
