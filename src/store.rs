//! Vector index client abstraction and implementations.
//!
//! Defines the [`VectorIndex`] capability trait and the closed set of
//! backends the pipeline can target:
//! - **[`MarqoIndex`]** — talks to a Marqo server over HTTP.
//! - **[`MemoryIndex`]** — records submissions in memory; used by tests and
//!   for offline dry runs.
//!
//! Use [`create_store`] to instantiate the backend selected in the
//! configuration. Selection happens once, at construction; the rest of the
//! pipeline only sees the trait.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::IndexConfig;
use crate::error::{PipelineError, Result};

/// Hard per-request document ceiling enforced by the store.
pub const MAX_DOCS_PER_BATCH: usize = 64;

/// Capability surface the pipeline needs from a vector store: existence,
/// creation, irreversible deletion, and batched document submission with
/// `text` as the tensorized field.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The target index name.
    fn name(&self) -> &str;

    async fn index_exists(&self) -> Result<bool>;

    /// Creates the index with the given embedding model if it is absent.
    async fn ensure_index(&self, model: &str) -> Result<()>;

    /// Deletes the index by name. Irreversible.
    async fn delete_index(&self) -> Result<()>;

    /// Submits one batch of documents as a single atomic call. Callers must
    /// respect [`MAX_DOCS_PER_BATCH`].
    async fn add_documents(&self, documents: &[Value]) -> Result<()>;
}

/// Instantiate the backend named in the configuration.
pub fn create_store(config: &IndexConfig) -> Result<Box<dyn VectorIndex>> {
    match config.provider.as_str() {
        "marqo" => Ok(Box::new(MarqoIndex::new(&config.url, &config.name)?)),
        "memory" => Ok(Box::new(MemoryIndex::new(&config.name))),
        other => Err(PipelineError::Config(format!(
            "unknown index provider: {other}"
        ))),
    }
}

// ============ Marqo ============

/// HTTP client for a Marqo vector index.
pub struct MarqoIndex {
    client: reqwest::Client,
    base_url: String,
    index_name: String,
}

impl MarqoIndex {
    pub fn new(base_url: &str, index_name: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            index_name: index_name.to_string(),
        })
    }
}

#[async_trait]
impl VectorIndex for MarqoIndex {
    fn name(&self) -> &str {
        &self.index_name
    }

    async fn index_exists(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/indexes", self.base_url))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Store(format!(
                "list indexes failed with {status}: {body}"
            )));
        }

        let listing: Value = response.json().await?;
        let exists = listing["results"]
            .as_array()
            .map(|indexes| {
                indexes
                    .iter()
                    .any(|index| index["indexName"] == self.index_name.as_str())
            })
            .unwrap_or(false);
        Ok(exists)
    }

    async fn ensure_index(&self, model: &str) -> Result<()> {
        if self.index_exists().await? {
            return Ok(());
        }

        tracing::info!(index = %self.index_name, model, "creating index");
        let response = self
            .client
            .post(format!("{}/indexes/{}", self.base_url, self.index_name))
            .json(&json!({ "model": model }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Store(format!(
                "create index '{}' failed with {status}: {body}",
                self.index_name
            )));
        }
        Ok(())
    }

    async fn delete_index(&self) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/indexes/{}", self.base_url, self.index_name))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Store(format!(
                "delete index '{}' failed with {status}: {body}",
                self.index_name
            )));
        }
        Ok(())
    }

    async fn add_documents(&self, documents: &[Value]) -> Result<()> {
        let response = self
            .client
            .post(format!(
                "{}/indexes/{}/documents",
                self.base_url, self.index_name
            ))
            .json(&json!({
                "documents": documents,
                "tensorFields": ["text"],
            }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Store(format!(
                "add documents to '{}' failed with {status}: {body}",
                self.index_name
            )));
        }
        Ok(())
    }
}

// ============ In-memory ============

#[derive(Default)]
struct MemoryState {
    exists: bool,
    deletes: usize,
    batch_sizes: Vec<usize>,
    documents: Vec<Value>,
}

/// An in-memory store that records every call. Backs the `memory` provider
/// and the test suites.
pub struct MemoryIndex {
    index_name: String,
    state: Mutex<MemoryState>,
}

impl MemoryIndex {
    pub fn new(index_name: &str) -> Self {
        Self {
            index_name: index_name.to_string(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Pre-mark the index as existing.
    pub fn with_existing_index(index_name: &str) -> Self {
        let store = Self::new(index_name);
        store.lock().exists = true;
        store
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.lock().batch_sizes.clone()
    }

    pub fn total_documents(&self) -> usize {
        self.lock().documents.len()
    }

    pub fn delete_count(&self) -> usize {
        self.lock().deletes
    }

    pub fn documents(&self) -> Vec<Value> {
        self.lock().documents.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn name(&self) -> &str {
        &self.index_name
    }

    async fn index_exists(&self) -> Result<bool> {
        Ok(self.lock().exists)
    }

    async fn ensure_index(&self, _model: &str) -> Result<()> {
        self.lock().exists = true;
        Ok(())
    }

    async fn delete_index(&self) -> Result<()> {
        let mut state = self.lock();
        state.exists = false;
        state.deletes += 1;
        state.documents.clear();
        state.batch_sizes.clear();
        Ok(())
    }

    async fn add_documents(&self, documents: &[Value]) -> Result<()> {
        let mut state = self.lock();
        state.batch_sizes.push(documents.len());
        state.documents.extend_from_slice(documents);
        Ok(())
    }
}
