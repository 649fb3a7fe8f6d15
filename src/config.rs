use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::store;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub repo: RepoConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    pub chunking: ChunkingConfig,
    pub index: IndexConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepoConfig {
    /// Repository identifier in `owner/name` form, e.g. `"acme/billing"`.
    pub id: String,
    /// Base URL of the hosting instance, e.g. `https://gitlab.com`.
    pub base_url: String,
    /// Optional commit to pin. When unset, the latest default-branch state is used.
    #[serde(default)]
    pub revision: Option<String>,
    /// Directory holding local snapshots and their audit logs.
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,
    /// Environment variable holding the access token for private remotes.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_local_dir() -> PathBuf {
    PathBuf::from("/tmp/repovec")
}
fn default_token_env() -> String {
    "REPO_ACCESS_TOKEN".to_string()
}

/// Rule source for the file filter. At most one of the three may be set.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FilterConfig {
    /// `ext:`/`file:`/`dir:` rules; only matching paths are ingested.
    #[serde(default)]
    pub inclusion_file: Option<PathBuf>,
    /// `ext:`/`file:`/`dir:` rules; matching paths are dropped.
    #[serde(default)]
    pub exclusion_file: Option<PathBuf>,
    /// Gitignore-style pattern file evaluated against repo-relative paths.
    #[serde(default)]
    pub ignore_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Per-chunk token budget.
    pub max_tokens: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_index_url")]
    pub url: String,
    /// Name of the target index in the vector store.
    pub name: String,
    /// Embedding model used when the index has to be created.
    #[serde(default = "default_model")]
    pub model: String,
    /// Documents per add-documents call. Hard-capped by the store at 64.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_provider() -> String {
    "marqo".to_string()
}
fn default_index_url() -> String {
    "http://localhost:8882".to_string()
}
fn default_model() -> String {
    "hf/e5-base-v2".to_string()
}
fn default_batch_size() -> usize {
    store::MAX_DOCS_PER_BATCH
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate repo identity
    let id = config.repo.id.trim();
    if id.is_empty() || !id.contains('/') || id.starts_with('/') || id.ends_with('/') {
        anyhow::bail!("repo.id must be in owner/name form, got '{}'", config.repo.id);
    }
    if config.repo.base_url.trim().is_empty() {
        anyhow::bail!("repo.base_url must not be empty");
    }

    // Validate chunking
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    // Validate index settings
    if config.index.batch_size == 0 || config.index.batch_size > store::MAX_DOCS_PER_BATCH {
        anyhow::bail!(
            "index.batch_size must be in 1..={}, got {}",
            store::MAX_DOCS_PER_BATCH,
            config.index.batch_size
        );
    }

    match config.index.provider.as_str() {
        "marqo" | "memory" => {}
        other => anyhow::bail!(
            "Unknown index provider: '{}'. Must be marqo or memory.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    const MINIMAL: &str = r#"
[repo]
id = "acme/billing"
base_url = "https://gitlab.example.com"

[chunking]
max_tokens = 700

[index]
name = "acme_billing"
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let file = write_config(MINIMAL);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.repo.local_dir, PathBuf::from("/tmp/repovec"));
        assert_eq!(config.repo.token_env, "REPO_ACCESS_TOKEN");
        assert_eq!(config.index.provider, "marqo");
        assert_eq!(config.index.batch_size, 64);
        assert_eq!(config.index.model, "hf/e5-base-v2");
        assert!(config.filter.inclusion_file.is_none());
    }

    #[test]
    fn rejects_malformed_repo_id() {
        let file = write_config(&MINIMAL.replace("acme/billing", "billing"));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("owner/name"));
    }

    #[test]
    fn rejects_zero_max_tokens() {
        let file = write_config(&MINIMAL.replace("max_tokens = 700", "max_tokens = 0"));
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn rejects_batch_size_over_store_limit() {
        let body = format!("{MINIMAL}batch_size = 65\n");
        let file = write_config(&body);
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn rejects_unknown_provider() {
        let body = format!("{MINIMAL}provider = \"qdrant\"\n");
        let file = write_config(&body);
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unknown index provider"));
    }
}
