//! Configuration management.
//!
//! Every tunable the engine recognizes lives here with a documented effect;
//! nothing is a hidden constant. Configuration merges a TOML file (from an
//! explicit path or the platform config directory) over built-in defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the memory engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding the knowledge graph database and identity document.
    pub data_dir: PathBuf,
    /// Embedding subsystem options.
    pub embedding: EmbeddingConfig,
    /// Wake protocol options.
    pub wake: WakeConfig,
    /// Preference emergence options.
    pub preferences: PreferenceConfig,
    /// Autonomous explorer options.
    pub explorer: ExplorerConfig,
}

/// Embedding provider options.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Provider preference order, probed at startup. Recognized names:
    /// `"remote"`, `"lexical"`. The first available provider wins.
    pub provider_order: Vec<String>,
    /// Base URL of the remote embedding service.
    pub remote_url: String,
    /// Model name requested from the remote service.
    pub remote_model: String,
    /// Bound on each remote embedding call. Node creation degrades to a
    /// null embedding rather than blocking past this.
    pub timeout: Duration,
    /// Minimum cosine similarity for `related_nodes` results.
    pub related_threshold: f32,
    /// Stricter threshold above which the auto-linker creates edges.
    pub auto_link_threshold: f32,
    /// Cap on new edges per auto-link call.
    pub auto_link_max_edges: usize,
    /// Similarity threshold for cluster membership.
    pub cluster_threshold: f32,
}

/// Wake protocol options.
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// How many days of reflections the wake bundle includes.
    pub reflection_lookback_days: i64,
    /// Bound on top-importance nodes in the wake bundle.
    pub important_node_limit: usize,
}

/// Preference emergence options.
#[derive(Debug, Clone)]
pub struct PreferenceConfig {
    /// A chosen value (or reasoning theme) must recur at least this many
    /// times within a domain to become a candidate preference.
    pub min_occurrences: usize,
}

/// Autonomous explorer options.
#[derive(Debug, Clone)]
pub struct ExplorerConfig {
    /// Sleep between exploration cycles.
    pub interval: Duration,
    /// Upper bound (exclusive) of the uniform jitter added to curiosity
    /// priority during selection.
    pub jitter_max: f32,
    /// Cap on follow-up curiosities created per exploration.
    pub max_follow_ups: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".mnemos"),
            embedding: EmbeddingConfig::default(),
            wake: WakeConfig::default(),
            preferences: PreferenceConfig::default(),
            explorer: ExplorerConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider_order: vec!["remote".to_string(), "lexical".to_string()],
            remote_url: "http://localhost:11434".to_string(),
            remote_model: "nomic-embed-text".to_string(),
            timeout: Duration::from_secs(10),
            related_threshold: 0.3,
            auto_link_threshold: 0.6,
            auto_link_max_edges: 5,
            cluster_threshold: 0.5,
        }
    }
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            reflection_lookback_days: 3,
            important_node_limit: 20,
        }
    }
}

impl Default for PreferenceConfig {
    fn default() -> Self {
        Self { min_occurrences: 3 }
    }
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            jitter_max: 0.3,
            max_follow_ups: 3,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Embedding section.
    pub embedding: Option<ConfigFileEmbedding>,
    /// Wake section.
    pub wake: Option<ConfigFileWake>,
    /// Preferences section.
    pub preferences: Option<ConfigFilePreferences>,
    /// Explorer section.
    pub explorer: Option<ConfigFileExplorer>,
}

/// Embedding section of the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileEmbedding {
    /// Provider preference order.
    pub provider_order: Option<Vec<String>>,
    /// Remote service base URL.
    pub remote_url: Option<String>,
    /// Remote model name.
    pub remote_model: Option<String>,
    /// Per-call timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// `related_nodes` threshold.
    pub related_threshold: Option<f32>,
    /// Auto-link threshold.
    pub auto_link_threshold: Option<f32>,
    /// Auto-link edge cap.
    pub auto_link_max_edges: Option<usize>,
    /// Cluster membership threshold.
    pub cluster_threshold: Option<f32>,
}

/// Wake section of the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileWake {
    /// Reflection lookback window in days.
    pub reflection_lookback_days: Option<i64>,
    /// Important-node bound.
    pub important_node_limit: Option<usize>,
}

/// Preferences section of the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFilePreferences {
    /// Minimum occurrences for a candidate preference.
    pub min_occurrences: Option<usize>,
}

/// Explorer section of the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileExplorer {
    /// Seconds between cycles.
    pub interval_secs: Option<u64>,
    /// Jitter upper bound.
    pub jitter_max: Option<f32>,
    /// Follow-up cap.
    pub max_follow_ups: Option<usize>,
}

impl EngineConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::StorageUnavailable {
                operation: "read_config_file".to_string(),
                cause: e.to_string(),
            })?;

        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| crate::Error::Validation(e.to_string()))?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location
    /// (`<config dir>/mnemos/config.toml`), falling back to defaults when
    /// no file exists.
    #[must_use]
    pub fn load_default() -> Self {
        let _ = dotenvy::dotenv();
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };
        let config_path = base_dirs.config_dir().join("mnemos").join("config.toml");
        if config_path.exists() {
            if let Ok(config) = Self::load_from_file(&config_path) {
                return config;
            }
        }
        Self::default()
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(e) = file.embedding {
            if let Some(v) = e.provider_order {
                config.embedding.provider_order = v;
            }
            if let Some(v) = e.remote_url {
                config.embedding.remote_url = v;
            }
            if let Some(v) = e.remote_model {
                config.embedding.remote_model = v;
            }
            if let Some(v) = e.timeout_secs {
                config.embedding.timeout = Duration::from_secs(v);
            }
            if let Some(v) = e.related_threshold {
                config.embedding.related_threshold = v;
            }
            if let Some(v) = e.auto_link_threshold {
                config.embedding.auto_link_threshold = v;
            }
            if let Some(v) = e.auto_link_max_edges {
                config.embedding.auto_link_max_edges = v;
            }
            if let Some(v) = e.cluster_threshold {
                config.embedding.cluster_threshold = v;
            }
        }
        if let Some(w) = file.wake {
            if let Some(v) = w.reflection_lookback_days {
                config.wake.reflection_lookback_days = v;
            }
            if let Some(v) = w.important_node_limit {
                config.wake.important_node_limit = v;
            }
        }
        if let Some(p) = file.preferences {
            if let Some(v) = p.min_occurrences {
                config.preferences.min_occurrences = v;
            }
        }
        if let Some(x) = file.explorer {
            if let Some(v) = x.interval_secs {
                config.explorer.interval = Duration::from_secs(v);
            }
            if let Some(v) = x.jitter_max {
                config.explorer.jitter_max = v;
            }
            if let Some(v) = x.max_follow_ups {
                config.explorer.max_follow_ups = v;
            }
        }

        config
    }
}
