use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::embeddings::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::prompts::PromptTemplate;
use crate::vector_db::SimilarityMetric;

pub const DEFAULT_CONFIG_FILE: &str = "health-rag.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub docs_dir: PathBuf,
    pub index_dir: PathBuf,
    pub index_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            docs_dir: PathBuf::from("docs"),
            index_dir: PathBuf::from("vectorstore"),
            index_file: "vectorstore.json".to_string(),
        }
    }
}

impl PathsConfig {
    /// Location of the persisted index file.
    pub fn persist_path(&self) -> PathBuf {
        self.index_dir.join(&self.index_file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub extensions: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            extensions: [".pdf", ".txt", ".md", ".docx", ".epub"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub endpoint: String,
    /// Vector size of the offline hashing embedder.
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Ollama,
            model: "all-minilm".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            dimension: 384,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub endpoint: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gemma3:1b".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            temperature: 0.0,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k: usize,
    pub score_threshold: Option<f32>,
    pub metric: SimilarityMetric,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 15,
            score_threshold: None,
            metric: SimilarityMetric::Cosine,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub template: PromptTemplate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub loader: LoaderConfig,
    pub splitter: SplitterConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub prompt: PromptConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if present, then the per-user config file, else defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if path.is_file() {
            debug!("Loading configuration from {}", path.display());
            return Self::from_file(path);
        }

        if let Some(user_path) = Self::user_config_path() {
            if user_path.is_file() {
                debug!("Loading configuration from {}", user_path.display());
                return Self::from_file(user_path);
            }
        }

        info!("No configuration file found, using defaults");
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("health-rag").join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.retrieval.k == 0 {
            return Err(RagError::Config("retrieval.k must be at least 1".to_string()));
        }
        if self.splitter.chunk_size == 0 {
            return Err(RagError::Config(
                "splitter.chunk_size must be at least 1".to_string(),
            ));
        }
        if self.splitter.chunk_overlap >= self.splitter.chunk_size {
            return Err(RagError::Config(format!(
                "splitter.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.splitter.chunk_overlap, self.splitter.chunk_size
            )));
        }
        if self.embedding.provider == EmbeddingProvider::Hashing && self.embedding.dimension == 0 {
            return Err(RagError::Config(
                "embedding.dimension must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
