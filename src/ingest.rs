//! Batch accumulation, submission, and the `index` command orchestration.
//!
//! [`ingest_chunks`] is the batch engine: it validates the requested batch
//! size against the store's hard ceiling before touching the network, then
//! consumes the lazy chunk stream, flushing the accumulator in slices of
//! exactly `max_batch_size` whenever it overflows. The remainder of an
//! inexact slicing stays accumulated for the next round, and whatever is
//! left when the stream runs dry goes out as one final, possibly smaller,
//! batch — so every chunk consumed is submitted exactly once.
//!
//! Submission failures propagate and abort the run; there is no per-batch
//! retry or resumption checkpoint.

use anyhow::Result;
use serde_json::Value;
use std::fmt::Write as _;

use crate::chunker::{Chunk, Chunker, ParagraphChunker};
use crate::config::Config;
use crate::error::PipelineError;
use crate::filter::FileFilter;
use crate::lifecycle::{self, IndexDecision, Prompt};
use crate::progress::{IngestEvent, ProgressMode, ProgressReporter};
use crate::registry;
use crate::repo::{RepoSpec, RepoSync};
use crate::store::{self, VectorIndex, MAX_DOCS_PER_BATCH};

/// Running totals for one ingestion run. Observational only.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub files: u64,
    pub chunks: u64,
    pub batches: u64,
}

/// Consumes a chunk stream and submits it to the vector index in batches of
/// at most `max_batch_size` documents.
///
/// # Errors
///
/// [`PipelineError::BatchSize`] when the requested size is zero or above
/// the store's per-request ceiling; otherwise the first stream or
/// submission error encountered.
pub async fn ingest_chunks(
    store: &dyn VectorIndex,
    chunks: impl IntoIterator<Item = crate::error::Result<Chunk>>,
    max_batch_size: usize,
    progress: &dyn ProgressReporter,
) -> crate::error::Result<IngestReport> {
    if max_batch_size == 0 || max_batch_size > MAX_DOCS_PER_BATCH {
        return Err(PipelineError::BatchSize {
            requested: max_batch_size,
            limit: MAX_DOCS_PER_BATCH,
        });
    }

    let mut report = IngestReport::default();
    let mut batch: Vec<Chunk> = Vec::new();

    for chunk in chunks {
        batch.push(chunk?);
        report.chunks += 1;

        if batch.len() > max_batch_size {
            // Drain full slices only; the remainder stays accumulated.
            while batch.len() >= max_batch_size {
                let slice: Vec<Chunk> = batch.drain(..max_batch_size).collect();
                submit_batch(store, &slice, &mut report, progress).await?;
            }
        }
    }

    if !batch.is_empty() {
        submit_batch(store, &batch, &mut report, progress).await?;
    }

    tracing::info!(
        chunks = report.chunks,
        batches = report.batches,
        "successfully ingested all chunks"
    );
    Ok(report)
}

async fn submit_batch(
    store: &dyn VectorIndex,
    chunks: &[Chunk],
    report: &mut IngestReport,
    progress: &dyn ProgressReporter,
) -> crate::error::Result<()> {
    tracing::info!(count = chunks.len(), "indexing chunks");
    let documents: Vec<Value> = chunks
        .iter()
        .map(|chunk| Value::Object(chunk.metadata.clone()))
        .collect();
    store.add_documents(&documents).await?;

    report.batches += 1;
    progress.report(IngestEvent::BatchSubmitted {
        batches: report.batches,
        chunks: report.chunks,
    });
    Ok(())
}

/// The full `index` run: confirm, resolve the index lifecycle, sync the
/// snapshot, stream files through the chunker into batched submissions,
/// and record the repository in the registry.
pub async fn run_index(
    config: &Config,
    prompt: &dyn Prompt,
    assume_yes: bool,
    progress_mode: ProgressMode,
) -> Result<()> {
    if !assume_yes && !prompt.confirm_config(&config_summary(config))? {
        println!("aborted.");
        return Ok(());
    }

    let store = store::create_store(&config.index)?;

    // Resolved once, strictly before the repository is synced.
    match lifecycle::resolve_existing_index(store.as_ref(), prompt).await? {
        Some(IndexDecision::Increment) => {
            println!(
                "Incremental indexing is not supported; index '{}' was left unchanged.",
                config.index.name
            );
            return Ok(());
        }
        Some(IndexDecision::Abort) => {
            println!("Aborted; index '{}' was left unchanged.", config.index.name);
            return Ok(());
        }
        Some(IndexDecision::Overwrite) | None => {}
    }

    store.ensure_index(&config.index.model).await?;

    let filter = FileFilter::from_config(&config.filter)?;
    let access_token = std::env::var(&config.repo.token_env).ok();
    let repo = RepoSync::new(
        RepoSpec {
            id: config.repo.id.clone(),
            revision: config.repo.revision.clone(),
            access_token,
            local_dir: config.repo.local_dir.clone(),
            base_url: config.repo.base_url.clone(),
        },
        filter,
    )?;

    let progress = progress_mode.reporter();
    progress.report(IngestEvent::Syncing {
        repo: config.repo.id.clone(),
    });
    if !repo.sync().await? {
        anyhow::bail!(
            "failed to sync {}; see the log for details",
            config.repo.id
        );
    }

    let branch = repo.default_branch().await.to_string();
    tracing::info!(branch, "resolved default branch");

    let chunker = ParagraphChunker::new(config.chunking.max_tokens);
    let mut files = 0u64;
    let mut chunk_count = 0u64;

    let chunk_stream = repo.walk(true)?.flat_map(|item| match item {
        Ok((Some(content), metadata)) => {
            let chunks = chunker.chunk(&content, &metadata);
            files += 1;
            chunk_count += chunks.len() as u64;
            progress.report(IngestEvent::FileChunked {
                files,
                chunks: chunk_count,
            });
            chunks.into_iter().map(Ok).collect::<Vec<_>>()
        }
        Ok((None, _)) => Vec::new(),
        Err(err) => vec![Err(err)],
    });

    let mut report = ingest_chunks(
        store.as_ref(),
        chunk_stream,
        config.index.batch_size,
        progress.as_ref(),
    )
    .await?;
    report.files = files;

    registry::record_indexed_repo(
        &registry::registry_path(config),
        &config.repo.id,
        &config.index.name,
    )?;

    let repo_name = config.repo.id.replace('/', "_");
    println!("index {}", config.repo.id);
    println!("  branch: {branch}");
    println!("  files ingested: {}", report.files);
    println!("  chunks submitted: {}", report.chunks);
    println!("  batches: {}", report.batches);
    println!("  index: {}", config.index.name);
    println!(
        "  included log: {}",
        repo.log_dir()
            .join(format!("included_{repo_name}.txt"))
            .display()
    );
    println!(
        "  excluded log: {}",
        repo.log_dir()
            .join(format!("excluded_{repo_name}.txt"))
            .display()
    );
    println!("ok");

    Ok(())
}

fn config_summary(config: &Config) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "  repo: {}", config.repo.id);
    let _ = writeln!(out, "  base url: {}", config.repo.base_url);
    let _ = writeln!(
        out,
        "  revision: {}",
        config.repo.revision.as_deref().unwrap_or("latest")
    );
    let _ = writeln!(out, "  local dir: {}", config.repo.local_dir.display());

    let rules = config
        .filter
        .inclusion_file
        .as_deref()
        .map(|p| format!("inclusion list {}", p.display()))
        .or_else(|| {
            config
                .filter
                .exclusion_file
                .as_deref()
                .map(|p| format!("exclusion list {}", p.display()))
        })
        .or_else(|| {
            config
                .filter
                .ignore_file
                .as_deref()
                .map(|p| format!("ignore patterns {}", p.display()))
        })
        .unwrap_or_else(|| "none".to_string());
    let _ = writeln!(out, "  filter rules: {rules}");

    let _ = writeln!(out, "  max tokens per chunk: {}", config.chunking.max_tokens);
    let _ = writeln!(
        out,
        "  index: {} ({} at {})",
        config.index.name, config.index.provider, config.index.url
    );
    let _ = writeln!(out, "  batch size: {}", config.index.batch_size);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::FileMetadata;
    use crate::progress::NoProgress;
    use crate::store::MemoryIndex;
    use async_trait::async_trait;

    fn make_chunks(count: usize) -> Vec<crate::error::Result<Chunk>> {
        let chunker = ParagraphChunker::new(100);
        (0..count)
            .map(|i| {
                let meta = FileMetadata {
                    file_path: format!("src/file_{i}.rs"),
                    url: format!("https://example.com/blob/main/src/file_{i}.rs"),
                };
                let mut chunks = chunker.chunk(&format!("contents of file {i}"), &meta);
                Ok(chunks.remove(0))
            })
            .collect()
    }

    #[tokio::test]
    async fn rejects_batch_sizes_above_the_ceiling() {
        let store = MemoryIndex::new("acme");
        let err = ingest_chunks(&store, make_chunks(1), 65, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BatchSize {
                requested: 65,
                limit: 64
            }
        ));
        // Fails fast: nothing was submitted.
        assert_eq!(store.batch_sizes(), Vec::<usize>::new());
    }

    #[tokio::test]
    async fn rejects_a_zero_batch_size() {
        let store = MemoryIndex::new("acme");
        let err = ingest_chunks(&store, make_chunks(1), 0, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::BatchSize { .. }));
    }

    #[tokio::test]
    async fn splits_130_chunks_into_64_64_2() {
        let store = MemoryIndex::new("acme");
        let report = ingest_chunks(&store, make_chunks(130), 64, &NoProgress)
            .await
            .unwrap();

        assert_eq!(store.batch_sizes(), vec![64, 64, 2]);
        assert_eq!(report.chunks, 130);
        assert_eq!(report.batches, 3);
        assert_eq!(store.total_documents(), 130);
    }

    #[tokio::test]
    async fn a_short_stream_goes_out_as_one_final_batch() {
        let store = MemoryIndex::new("acme");
        let report = ingest_chunks(&store, make_chunks(10), 64, &NoProgress)
            .await
            .unwrap();
        assert_eq!(store.batch_sizes(), vec![10]);
        assert_eq!(report.chunks, 10);
    }

    #[tokio::test]
    async fn an_exact_multiple_leaves_no_trailing_batch() {
        let store = MemoryIndex::new("acme");
        let report = ingest_chunks(&store, make_chunks(128), 64, &NoProgress)
            .await
            .unwrap();
        assert_eq!(store.batch_sizes(), vec![64, 64]);
        assert_eq!(report.chunks, 128);
    }

    #[tokio::test]
    async fn no_submitted_batch_exceeds_the_configured_size() {
        let store = MemoryIndex::new("acme");
        let report = ingest_chunks(&store, make_chunks(200), 7, &NoProgress)
            .await
            .unwrap();

        let sizes = store.batch_sizes();
        assert!(sizes.iter().all(|size| *size <= 7));
        assert_eq!(sizes.iter().sum::<usize>(), 200);
        assert_eq!(report.chunks, 200);
    }

    #[tokio::test]
    async fn stream_errors_abort_the_run() {
        let store = MemoryIndex::new("acme");
        let mut chunks = make_chunks(3);
        chunks.insert(
            1,
            Err(PipelineError::Io(std::io::Error::other("disk gone"))),
        );

        let err = ingest_chunks(&store, chunks, 64, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }

    struct FailingIndex;

    #[async_trait]
    impl VectorIndex for FailingIndex {
        fn name(&self) -> &str {
            "failing"
        }
        async fn index_exists(&self) -> crate::error::Result<bool> {
            Ok(true)
        }
        async fn ensure_index(&self, _model: &str) -> crate::error::Result<()> {
            Ok(())
        }
        async fn delete_index(&self) -> crate::error::Result<()> {
            Ok(())
        }
        async fn add_documents(&self, _documents: &[Value]) -> crate::error::Result<()> {
            Err(PipelineError::Store("backend down".to_string()))
        }
    }

    #[tokio::test]
    async fn submission_failures_propagate_without_retry() {
        let err = ingest_chunks(&FailingIndex, make_chunks(70), 64, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Store(_)));
    }

    #[test]
    fn config_summary_names_the_rule_source() {
        let config: Config = toml::from_str(
            r#"
[repo]
id = "acme/billing"
base_url = "https://gitlab.example.com"

[filter]
ignore_file = "/etc/rvec/patterns"

[chunking]
max_tokens = 700

[index]
name = "acme_billing"
"#,
        )
        .unwrap();

        let summary = config_summary(&config);
        assert!(summary.contains("repo: acme/billing"));
        assert!(summary.contains("ignore patterns /etc/rvec/patterns"));
        assert!(summary.contains("batch size: 64"));
    }
}
