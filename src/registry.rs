//! Registry of repositories that have been indexed.
//!
//! A JSON file next to the snapshots records which repository went into
//! which index, so other tooling (and the `repos` command) can see what is
//! searchable. Records are upserted by repository id and the file is kept
//! sorted by index name.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::Config;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoRecord {
    pub repo_id: String,
    pub index_name: String,
    pub index_status: String,
    pub indexed_at: DateTime<Utc>,
}

/// Loads the registry. A missing or empty file is an empty registry; a
/// corrupt file is logged and treated as empty rather than failing the run.
pub fn load_registry(path: &Path) -> Result<Vec<RepoRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read registry file: {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str(&content) {
        Ok(records) => Ok(records),
        Err(err) => {
            tracing::error!(
                file = %path.display(),
                error = %err,
                "registry file is corrupt, starting a fresh one"
            );
            Ok(Vec::new())
        }
    }
}

/// Upserts the record for a freshly indexed repository and rewrites the
/// registry sorted by index name.
pub fn record_indexed_repo(path: &Path, repo_id: &str, index_name: &str) -> Result<()> {
    let mut records = load_registry(path)?;

    match records.iter_mut().find(|record| record.repo_id == repo_id) {
        Some(record) => {
            record.index_name = index_name.to_string();
            record.index_status = "done".to_string();
            record.indexed_at = Utc::now();
        }
        None => records.push(RepoRecord {
            repo_id: repo_id.to_string(),
            index_name: index_name.to_string(),
            index_status: "done".to_string(),
            indexed_at: Utc::now(),
        }),
    }

    records.sort_by(|a, b| a.index_name.cmp(&b.index_name));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&records)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write registry file: {}", path.display()))?;

    tracing::info!(repo = repo_id, index = index_name, "registry updated");
    Ok(())
}

/// The registry lives next to the snapshots.
pub fn registry_path(config: &Config) -> PathBuf {
    config.repo.local_dir.join("repos.json")
}

/// Prints the registry for the `repos` command.
pub fn run_repos(config: &Config) -> Result<()> {
    let records = load_registry(&registry_path(config))?;
    if records.is_empty() {
        println!("no repositories indexed yet");
        return Ok(());
    }

    for record in &records {
        println!(
            "{}  index={}  status={}  indexed_at={}",
            record.repo_id,
            record.index_name,
            record.index_status,
            record.indexed_at.to_rfc3339()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_an_empty_registry() {
        let tmp = TempDir::new().unwrap();
        let records = load_registry(&tmp.path().join("repos.json")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn corrupt_file_is_tolerated() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("repos.json");
        std::fs::write(&path, "{ not json").unwrap();
        let records = load_registry(&path).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn records_are_upserted_and_sorted_by_index_name() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("repos.json");

        record_indexed_repo(&path, "acme/zeta", "zeta_index").unwrap();
        record_indexed_repo(&path, "acme/alpha", "alpha_index").unwrap();

        let records = load_registry(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].index_name, "alpha_index");
        assert_eq!(records[1].index_name, "zeta_index");

        // Re-indexing the same repo updates in place.
        record_indexed_repo(&path, "acme/zeta", "zeta_v2").unwrap();
        let records = load_registry(&path).unwrap();
        assert_eq!(records.len(), 2);
        let zeta = records
            .iter()
            .find(|r| r.repo_id == "acme/zeta")
            .unwrap();
        assert_eq!(zeta.index_name, "zeta_v2");
        assert_eq!(zeta.index_status, "done");
    }
}
