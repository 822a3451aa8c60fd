use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub citation: CitationConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_words")]
    pub target_words: usize,
}

fn default_target_words() -> usize {
    500
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_words: default_target_words(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Maximum acceptable distance for a hit to count as relevant
    /// (Euclidean, lower = closer).
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f64,
    #[serde(default = "default_max_docs")]
    pub max_docs: usize,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_distance_threshold() -> f64 {
    1.5
}
fn default_max_docs() -> usize {
    5
}
fn default_pool_size() -> usize {
    50
}
fn default_top_n() -> usize {
    10
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            distance_threshold: default_distance_threshold(),
            max_docs: default_max_docs(),
            pool_size: default_pool_size(),
            top_n: default_top_n(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_generation_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_generation_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_temperature() -> f64 {
    0.3
}
fn default_max_output_tokens() -> u32 {
    1600
}
fn default_generation_timeout_secs() -> u64 {
    60
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_generation_model(),
            endpoint: default_generation_endpoint(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CitationConfig {
    /// Distinct trailing citations kept per body paragraph.
    #[serde(default = "default_refs_per_paragraph")]
    pub max_refs_per_paragraph: usize,
    /// Distinct source documents presented to the generator.
    #[serde(default = "default_context_docs")]
    pub context_docs: usize,
}

fn default_refs_per_paragraph() -> usize {
    2
}
fn default_context_docs() -> usize {
    5
}

impl Default for CitationConfig {
    fn default() -> Self {
        Self {
            max_refs_per_paragraph: default_refs_per_paragraph(),
            context_docs: default_context_docs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.target_words == 0 {
        anyhow::bail!("chunking.target_words must be > 0");
    }

    if config.retrieval.max_docs < 1 {
        anyhow::bail!("retrieval.max_docs must be >= 1");
    }
    if config.retrieval.distance_threshold <= 0.0 {
        anyhow::bail!("retrieval.distance_threshold must be > 0");
    }
    if config.retrieval.top_n < config.retrieval.max_docs {
        anyhow::bail!("retrieval.top_n must be >= retrieval.max_docs");
    }
    if config.retrieval.pool_size < config.retrieval.top_n {
        anyhow::bail!("retrieval.pool_size must be >= retrieval.top_n");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if !(0.0..=2.0).contains(&config.generation.temperature) {
        anyhow::bail!("generation.temperature must be in [0.0, 2.0]");
    }

    if config.citation.max_refs_per_paragraph < 1 {
        anyhow::bail!("citation.max_refs_per_paragraph must be >= 1");
    }
    if config.citation.context_docs < 1 {
        anyhow::bail!("citation.context_docs must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const MINIMAL: &str = r#"
[db]
path = "/tmp/thesis.sqlite"

[corpus]
root = "/tmp/theses"

[server]
bind = "127.0.0.1:5000"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let file = write_config(MINIMAL);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.chunking.target_words, 500);
        assert!((config.retrieval.distance_threshold - 1.5).abs() < 1e-9);
        assert_eq!(config.retrieval.max_docs, 5);
        assert_eq!(config.retrieval.pool_size, 50);
        assert_eq!(config.retrieval.top_n, 10);
        assert_eq!(config.citation.max_refs_per_paragraph, 2);
        assert_eq!(config.citation.context_docs, 5);
        assert_eq!(config.embedding.provider, "disabled");
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.generation.model, "gemini-2.0-flash");
        assert_eq!(config.corpus.include_globs, vec!["**/*.txt".to_string()]);
    }

    #[test]
    fn test_enabled_embedding_requires_model_and_dims() {
        let file = write_config(
            r#"
[db]
path = "/tmp/thesis.sqlite"

[corpus]
root = "/tmp/theses"

[embedding]
provider = "openai"

[server]
bind = "127.0.0.1:5000"
"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let file = write_config(
            r#"
[db]
path = "/tmp/thesis.sqlite"

[corpus]
root = "/tmp/theses"

[embedding]
provider = "local"
model = "all-MiniLM-L6-v2"
dims = 384

[server]
bind = "127.0.0.1:5000"
"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_rejects_top_n_below_max_docs() {
        let file = write_config(
            r#"
[db]
path = "/tmp/thesis.sqlite"

[corpus]
root = "/tmp/theses"

[retrieval]
max_docs = 8
top_n = 5

[server]
bind = "127.0.0.1:5000"
"#,
        );
        assert!(load_config(file.path()).is_err());
    }
}
