use serde::{Deserialize, Serialize};

/// Main configuration structure for dockloop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Directory holding run state, derived artifacts and structures
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Maximum number of expansion rounds after the initial docking pass
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub reasoning: ReasoningConfig,

    /// Docking backend configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Chat-completions collaborator configuration
    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub pubchem: PubChemConfig,

    #[serde(default)]
    pub rcsb: RcsbConfig,

    /// Retry policy for HTTP collaborators
    #[serde(default)]
    pub retry: RetryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_output_dir() -> String {
    "output".to_string()
}

const fn default_max_rounds() -> u32 {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_rounds: default_max_rounds(),
            dispatch: DispatchConfig::default(),
            reasoning: ReasoningConfig::default(),
            backend: BackendConfig::default(),
            chat: ChatConfig::default(),
            pubchem: PubChemConfig::default(),
            rcsb: RcsbConfig::default(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Job dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DispatchConfig {
    /// Work items per backend job
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum jobs in flight per dispatch call
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_samples_per_item")]
    pub samples_per_item: u32,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Jobs still running after this long are treated as timed out
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Upper bound on sanitized dispatch identifiers
    #[serde(default = "default_max_id_len")]
    pub max_id_len: usize,
}

const fn default_batch_size() -> usize {
    10
}

const fn default_max_concurrency() -> usize {
    3
}

const fn default_samples_per_item() -> u32 {
    10
}

const fn default_poll_interval_secs() -> u64 {
    5
}

const fn default_job_timeout_secs() -> u64 {
    3600
}

const fn default_max_id_len() -> usize {
    80
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
            samples_per_item: default_samples_per_item(),
            poll_interval_secs: default_poll_interval_secs(),
            job_timeout_secs: default_job_timeout_secs(),
            max_id_len: default_max_id_len(),
        }
    }
}

/// Expansion reasoning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReasoningConfig {
    /// Results summarized to the hypothesis collaborator each round
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    #[serde(default = "default_fallback_seed_count")]
    pub fallback_seed_count: usize,

    #[serde(default = "default_similar_per_seed")]
    pub similar_per_seed: usize,

    #[serde(default = "default_class_name_limit")]
    pub class_name_limit: usize,
}

const fn default_top_n() -> usize {
    30
}

const fn default_fallback_seed_count() -> usize {
    5
}

const fn default_similar_per_seed() -> usize {
    10
}

const fn default_class_name_limit() -> usize {
    10
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            fallback_seed_count: default_fallback_seed_count(),
            similar_per_seed: default_similar_per_seed(),
            class_name_limit: default_class_name_limit(),
        }
    }
}

/// Serverless docking endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BackendConfig {
    #[serde(default = "default_backend_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub endpoint_id: String,

    /// API key (can also be set via `RUNPOD_API_KEY`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_backend_base_url() -> String {
    "https://api.runpod.ai/v2".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_base_url(),
            endpoint_id: String::new(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Chat-completions API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChatConfig {
    #[serde(default = "default_chat_base_url")]
    pub base_url: String,

    #[serde(default = "default_chat_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// API key (can also be set via `PERPLEXITY_API_KEY`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_chat_base_url() -> String {
    "https://api.perplexity.ai".to_string()
}

fn default_chat_model() -> String {
    "sonar-pro".to_string()
}

const fn default_temperature() -> f32 {
    0.3
}

const fn default_max_tokens() -> u32 {
    8000
}

const fn default_chat_timeout_secs() -> u64 {
    300
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: default_chat_base_url(),
            model: default_chat_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key: None,
            timeout_secs: default_chat_timeout_secs(),
        }
    }
}

/// `PubChem` REST configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PubChemConfig {
    #[serde(default = "default_pubchem_base_url")]
    pub base_url: String,

    #[serde(default = "default_pubchem_rps")]
    pub requests_per_second: u32,

    /// Bioactive compounds pulled per gene symbol
    #[serde(default = "default_max_target_compounds")]
    pub max_target_compounds: usize,
}

fn default_pubchem_base_url() -> String {
    "https://pubchem.ncbi.nlm.nih.gov/rest/pug".to_string()
}

const fn default_pubchem_rps() -> u32 {
    4
}

const fn default_max_target_compounds() -> usize {
    20
}

impl Default for PubChemConfig {
    fn default() -> Self {
        Self {
            base_url: default_pubchem_base_url(),
            requests_per_second: default_pubchem_rps(),
            max_target_compounds: default_max_target_compounds(),
        }
    }
}

/// RCSB PDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RcsbConfig {
    #[serde(default = "default_rcsb_search_url")]
    pub search_url: String,

    #[serde(default = "default_rcsb_data_url")]
    pub data_url: String,

    #[serde(default = "default_rcsb_download_url")]
    pub download_url: String,

    /// Downloaded structures live here (relative paths resolve under `output_dir`)
    #[serde(default = "default_structures_dir")]
    pub structures_dir: String,

    /// Maximum resolution in angstroms
    #[serde(default = "default_max_resolution")]
    pub max_resolution: f64,
}

fn default_rcsb_search_url() -> String {
    "https://search.rcsb.org/rcsbsearch/v2/query".to_string()
}

fn default_rcsb_data_url() -> String {
    "https://data.rcsb.org/rest/v1/core/entry".to_string()
}

fn default_rcsb_download_url() -> String {
    "https://files.rcsb.org/download".to_string()
}

fn default_structures_dir() -> String {
    "structures".to_string()
}

const fn default_max_resolution() -> f64 {
    3.0
}

impl Default for RcsbConfig {
    fn default() -> Self {
        Self {
            search_url: default_rcsb_search_url(),
            data_url: default_rcsb_data_url(),
            download_url: default_rcsb_download_url(),
            structures_dir: default_structures_dir(),
            max_resolution: default_max_resolution(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    1000
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
