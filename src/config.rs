use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "./config/assistant.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub default: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_available_models")]
    pub available: Vec<String>,
    #[serde(default = "default_multimodal_model")]
    pub multimodal: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            default: default_model(),
            temperature: default_temperature(),
            available: default_available_models(),
            multimodal: default_multimodal_model(),
            timeout_secs: None,
        }
    }
}

fn default_base_url() -> String {
    "https://api.siliconflow.cn/v1".to_string()
}
fn default_model() -> String {
    "Pro/deepseek-ai/DeepSeek-R1".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_available_models() -> Vec<String> {
    vec![
        "Pro/deepseek-ai/DeepSeek-R1".to_string(),
        "Wan-AI/Wan2.1-T2V-14B-Turbo".to_string(),
        "Kwai-Kolors/Kolors".to_string(),
        "Qwen/QVQ-72B-Preview".to_string(),
    ]
}
fn default_multimodal_model() -> String {
    "Qwen/QVQ-72B-Preview".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    #[serde(default = "default_max_history_length")]
    pub max_history_length: usize,
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: PathBuf,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history_length: default_max_history_length(),
            sessions_dir: default_sessions_dir(),
        }
    }
}

fn default_max_history_length() -> usize {
    5
}
fn default_sessions_dir() -> PathBuf {
    PathBuf::from("./sessions")
}

/// How retrieval picks among equally eligible chunks.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Diversity {
    /// Pure chunk-level top-k.
    #[default]
    Chunk,
    /// At most one chunk per source document.
    Document,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_true")]
    pub rag_enabled: bool,
    #[serde(default)]
    pub diversity: Diversity,
    #[serde(default)]
    pub stopwords_path: Option<PathBuf>,
    /// Files picked up when a directory is loaded into the knowledge base.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            top_k: default_top_k(),
            rag_enabled: true,
            diversity: Diversity::Chunk,
            stopwords_path: None,
            include_globs: default_include_globs(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
        "**/*.pdf".to_string(),
        "**/*.docx".to_string(),
    ]
}
fn default_top_k() -> usize {
    3
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouterConfig {
    #[serde(default = "default_location")]
    pub default_location: String,
    #[serde(default)]
    pub extra_search_keywords: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_location: default_location(),
            extra_search_keywords: Vec::new(),
        }
    }
}

fn default_location() -> String {
    "北京市".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ToolsConfig {
    #[serde(default)]
    pub file: FileToolConfig,
    #[serde(default)]
    pub weather: WeatherToolConfig,
    #[serde(default)]
    pub search: SearchToolConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FileToolConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default)]
    pub allowed_dirs: Vec<PathBuf>,
}

impl Default for FileToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_chars: default_max_chars(),
            allowed_dirs: Vec::new(),
        }
    }
}

fn default_max_chars() -> usize {
    3000
}

/// OpenWeatherMap unit systems.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
    Standard,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
            Units::Standard => "standard",
        }
    }

    pub fn temperature_suffix(&self) -> &'static str {
        match self {
            Units::Metric => "°C",
            Units::Imperial => "°F",
            Units::Standard => "K",
        }
    }

    pub fn speed_suffix(&self) -> &'static str {
        match self {
            Units::Imperial => "mph",
            Units::Metric | Units::Standard => "m/s",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WeatherToolConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_weather_url")]
    pub base_url: String,
    #[serde(default)]
    pub units: Units,
}

impl Default for WeatherToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: String::new(),
            base_url: default_weather_url(),
            units: Units::Metric,
        }
    }
}

fn default_weather_url() -> String {
    "http://api.openweathermap.org/data/2.5/weather".to_string()
}

/// Search engines reachable through SerpAPI. `default` means Google.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchProvider {
    #[default]
    Default,
    Google,
    Bing,
    Baidu,
}

impl SearchProvider {
    pub fn engine(&self) -> &'static str {
        match self {
            SearchProvider::Default | SearchProvider::Google => "google",
            SearchProvider::Bing => "bing",
            SearchProvider::Baidu => "baidu",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchToolConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub provider: SearchProvider,
    #[serde(default = "default_num_results")]
    pub num_results: usize,
    #[serde(default = "default_search_url")]
    pub base_url: String,
}

impl Default for SearchToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: String::new(),
            provider: SearchProvider::Default,
            num_results: default_num_results(),
            base_url: default_search_url(),
        }
    }
}

fn default_num_results() -> usize {
    10
}
fn default_search_url() -> String {
    "https://serpapi.com/search".to_string()
}

impl Config {
    /// All defaults, no credentials. Used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    fn expand_credentials(&mut self) {
        self.model.api_key = expand_env_vars(&self.model.api_key);
        self.model.base_url = expand_env_vars(&self.model.base_url);
        self.tools.weather.api_key = expand_env_vars(&self.tools.weather.api_key);
        self.tools.search.api_key = expand_env_vars(&self.tools.search.api_key);
    }

    pub fn validate(&self) -> Result<()> {
        if self.knowledge.chunk_size == 0 {
            anyhow::bail!("knowledge.chunk_size must be > 0");
        }
        if !(1..=5).contains(&self.knowledge.top_k) {
            anyhow::bail!("knowledge.top_k must be in [1, 5]");
        }
        if self.memory.max_history_length < 1 {
            anyhow::bail!("memory.max_history_length must be >= 1");
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            anyhow::bail!("model.temperature must be in [0.0, 2.0]");
        }
        if !self.model.available.contains(&self.model.default) {
            anyhow::bail!(
                "model.default '{}' is not listed in model.available",
                self.model.default
            );
        }
        if !self.model.available.contains(&self.model.multimodal) {
            anyhow::bail!(
                "model.multimodal '{}' is not listed in model.available",
                self.model.multimodal
            );
        }
        if self.tools.file.max_chars == 0 {
            anyhow::bail!("tools.file.max_chars must be > 0");
        }
        if self.tools.search.num_results < 1 {
            anyhow::bail!("tools.search.num_results must be >= 1");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.expand_credentials();
    config.validate()?;

    Ok(config)
}

/// Loads `path` if it exists; falls back to [`Config::minimal`] only for the
/// default location so that an explicit but missing `--config` still fails.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG_PATH) {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        let mut config = Config::minimal();
        config.expand_credentials();
        return Ok(config);
    }
    load_config(path)
}

/// Expands `${VAR}` references from the process environment. Unset variables
/// expand to the empty string.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut search_from = 0;
    while let Some(rel) = result[search_from..].find("${") {
        let start = search_from + rel;
        let end = match result[start..].find('}') {
            Some(pos) => start + pos,
            None => break,
        };
        let var_name = &result[start + 2..end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[end + 1..]);
        search_from = start + value.len();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = write_config("");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.knowledge.chunk_size, 500);
        assert_eq!(config.knowledge.top_k, 3);
        assert_eq!(config.memory.max_history_length, 5);
        assert_eq!(config.router.default_location, "北京市");
        assert_eq!(config.tools.file.max_chars, 3000);
        assert_eq!(config.tools.weather.units, Units::Metric);
        assert_eq!(config.knowledge.diversity, Diversity::Chunk);
        assert_eq!(config.model.multimodal, "Qwen/QVQ-72B-Preview");
    }

    #[test]
    fn test_sections_override_defaults() {
        let file = write_config(
            r#"
[knowledge]
top_k = 5
diversity = "document"

[tools.weather]
units = "imperial"

[tools.search]
provider = "baidu"
num_results = 3
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.knowledge.top_k, 5);
        assert_eq!(config.knowledge.diversity, Diversity::Document);
        assert_eq!(config.tools.weather.units, Units::Imperial);
        assert_eq!(config.tools.search.provider.engine(), "baidu");
        assert_eq!(config.tools.search.num_results, 3);
    }

    #[test]
    fn test_rejects_top_k_out_of_range() {
        let file = write_config("[knowledge]\ntop_k = 6\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn test_rejects_unknown_units() {
        let file = write_config("[tools.weather]\nunits = \"kelvinish\"\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_rejects_default_model_not_available() {
        let file = write_config("[model]\ndefault = \"gpt-x\"\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("model.default"));
    }

    #[test]
    fn test_rejects_temperature_out_of_range() {
        let file = write_config("[model]\ntemperature = 2.5\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("CTXA_TEST_WEATHER_KEY", "abc123");
        assert_eq!(expand_env_vars("${CTXA_TEST_WEATHER_KEY}"), "abc123");
        assert_eq!(
            expand_env_vars("k=${CTXA_TEST_WEATHER_KEY}/${CTXA_TEST_UNSET_VAR}"),
            "k=abc123/"
        );
        assert_eq!(expand_env_vars("no vars"), "no vars");
        assert_eq!(expand_env_vars("${unterminated"), "${unterminated");
    }

    #[test]
    fn test_credentials_are_expanded_on_load() {
        std::env::set_var("CTXA_TEST_SEARCH_KEY", "serp-key");
        let file = write_config("[tools.search]\napi_key = \"${CTXA_TEST_SEARCH_KEY}\"\n");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.tools.search.api_key, "serp-key");
    }
}
