//! Existing-index detection and the operator's resolution.
//!
//! Before any sync or submission, the pipeline asks the vector store
//! whether the target index already exists. If it does, the operator
//! chooses between overwriting it, incremental indexing (unsupported, the
//! run exits), or aborting. The terminal interaction sits behind the
//! [`Prompt`] trait so the state machine is testable without a TTY.

use anyhow::Result;
use dialoguer::{Confirm, Select};

use crate::store::VectorIndex;

/// Operator's resolution for an index that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexDecision {
    /// Destroy the existing index, then ingest as if it were absent.
    Overwrite,
    /// Incremental indexing — unsupported, terminates the run.
    Increment,
    /// Leave the index untouched and terminate.
    Abort,
}

/// Operator interaction surface for the ingestion run.
pub trait Prompt {
    /// Show the config summary and ask whether to proceed.
    fn confirm_config(&self, summary: &str) -> Result<bool>;

    /// Ask what to do about an index that already exists.
    fn choose_existing_index(&self, index_name: &str) -> Result<IndexDecision>;
}

/// Interactive prompt on the controlling terminal.
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn confirm_config(&self, summary: &str) -> Result<bool> {
        println!("About to index with the following configuration:\n\n{summary}");
        Ok(Confirm::new()
            .with_prompt("Proceed?")
            .default(false)
            .interact()?)
    }

    fn choose_existing_index(&self, index_name: &str) -> Result<IndexDecision> {
        let choice = Select::new()
            .with_prompt(format!("Index '{index_name}' already exists"))
            .items(&[
                "overwrite the index",
                "incremental indexing",
                "abort",
            ])
            .default(2)
            .interact()?;

        Ok(match choice {
            0 => IndexDecision::Overwrite,
            1 => IndexDecision::Increment,
            _ => IndexDecision::Abort,
        })
    }
}

/// Runs the existence check — exactly once per invocation, strictly before
/// the repository is synced. Returns `None` when the index is absent and
/// ingestion can proceed directly; otherwise the operator's decision, with
/// `Overwrite` already applied (the existing index is deleted here, before
/// any document is submitted).
pub async fn resolve_existing_index(
    store: &dyn VectorIndex,
    prompt: &dyn Prompt,
) -> Result<Option<IndexDecision>> {
    if !store.index_exists().await? {
        return Ok(None);
    }

    tracing::warn!(index = store.name(), "index already exists");
    let decision = prompt.choose_existing_index(store.name())?;

    match decision {
        IndexDecision::Overwrite => {
            tracing::info!(index = store.name(), "overwriting existing index");
            store.delete_index().await?;
        }
        IndexDecision::Increment => {
            tracing::info!(index = store.name(), "incremental indexing requested");
        }
        IndexDecision::Abort => {
            tracing::info!(index = store.name(), "aborting at operator request");
        }
    }

    Ok(Some(decision))
}
