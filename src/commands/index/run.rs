use std::path::Path;
use std::time::Instant;

use anyhow::{Result, bail};
use chrono::Utc;
use tracing::info;

use super::extract::{PageTextSource, PdftotextExtractor};
use super::pipeline::index_all;
use crate::cli::IndexArgs;
use crate::config::IndexerConfig;
use crate::layout::discover_pdfs;
use crate::model::IndexRunManifest;
use crate::rest::{RestStore, TextbookStore};
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty};

pub fn run(args: IndexArgs) -> Result<()> {
    let config = IndexerConfig::from_env(args.root.clone())?;
    let store = RestStore::new(&config.store)?;

    let manifest = execute(&config, &PdftotextExtractor, &store)?;

    if let Some(path) = &args.run_manifest_path {
        write_json_pretty(path, &manifest)?;
        info!(path = %path.display(), "wrote index run manifest");
    }

    Ok(())
}

pub(super) fn execute<E, S>(
    config: &IndexerConfig,
    extractor: &E,
    store: &S,
) -> Result<IndexRunManifest>
where
    E: PageTextSource + ?Sized,
    S: TextbookStore + ?Sized,
{
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("index-{}", utc_compact_string(started_ts));
    let root = config.root.as_path();

    ensure_root_exists(root)?;
    let pdfs = discover_pdfs(root)?;
    if pdfs.is_empty() {
        bail!(
            "no PDFs under {}/Grade */<subject>/*.pdf",
            root.display()
        );
    }

    info!(
        run_id = %run_id,
        root = %root.display(),
        bucket = %config.store.bucket,
        pdf_count = pdfs.len(),
        "found PDFs to index"
    );

    let started = Instant::now();
    let report = index_all(root, &pdfs, extractor, store);
    let elapsed_seconds = started.elapsed().as_secs_f64();

    info!(
        pdf_count = report.counts.pdf_count,
        indexed = report.counts.indexed_count,
        failed = report.counts.failed_count,
        pages = report.counts.pages_inserted,
        elapsed = %format!("{elapsed_seconds:.1}s"),
        "indexing done"
    );

    Ok(IndexRunManifest {
        manifest_version: 1,
        run_id,
        started_at,
        finished_at: now_utc_string(),
        elapsed_seconds,
        root: root.display().to_string(),
        bucket: config.store.bucket.clone(),
        counts: report.counts,
        files: report.files,
    })
}

fn ensure_root_exists(root: &Path) -> Result<()> {
    if !root.is_dir() {
        bail!("LOCAL_TEXTBOOKS_ROOT not found: {}", root.display());
    }
    Ok(())
}
