use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::env;
use std::fmt;
use std::str::FromStr;

/// Default Volcengine ASR endpoint used to submit transcription tasks.
pub const DEFAULT_ASR_SUBMIT_URL: &str =
    "https://openspeech.bytedance.com/api/v3/auc/bigmodel/submit";

/// Default Volcengine ASR endpoint used to query transcription tasks.
pub const DEFAULT_ASR_QUERY_URL: &str = "https://openspeech.bytedance.com/api/v3/auc/bigmodel/query";

/// Default resource id sent in the `X-Api-Resource-Id` header.
pub const DEFAULT_ASR_RESOURCE_ID: &str = "volc.bigasr.auc";

/// Default OpenAI-compatible base URL for chat completions.
pub const DEFAULT_LLM_BASE_URL: &str = "https://ark.cn-beijing.volces.com/api/v3";

// Legacy variable names still accepted from older deployments. The first entry
// of each pair is the alias, the second the canonical name read by clap.
const ENV_ALIASES: &[(&str, &str)] = &[
    ("TOS_ACCESS_KEY", "STORAGE_ACCESS_KEY"),
    ("TOS_SECRET_KEY", "STORAGE_SECRET_KEY"),
    ("TOS_ENDPOINT", "STORAGE_ENDPOINT"),
    ("TOS_REGION", "STORAGE_REGION"),
    ("TOS_BUCKET", "STORAGE_BUCKET"),
    ("ARK_API_KEY", "LLM_API_KEY"),
];

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// A list of full CORS origin URLs that allowed to receive server responses.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "http://localhost:3000,https://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// The Volcengine application id (`X-Api-App-Key`). Also used as the rate limit key.
    #[arg(long, env = "AUC_APP_ID")]
    asr_app_id: Option<String>,

    /// The Volcengine access token (`X-Api-Access-Key`).
    #[arg(long, env = "AUC_ACCESS_TOKEN", hide_env_values = true)]
    asr_access_token: Option<String>,

    /// Optional cluster id added to submitted tasks.
    #[arg(long, env = "AUC_CLUSTER_ID")]
    asr_cluster_id: Option<String>,

    /// Resource id sent with every ASR request.
    #[arg(long, env, default_value = DEFAULT_ASR_RESOURCE_ID)]
    asr_resource_id: String,

    /// Endpoint used to submit transcription tasks.
    /// Override in tests to point at a mock server.
    #[arg(long, env, default_value = DEFAULT_ASR_SUBMIT_URL)]
    asr_submit_url: String,

    /// Endpoint used to query transcription tasks.
    /// Override in tests to point at a mock server.
    #[arg(long, env, default_value = DEFAULT_ASR_QUERY_URL)]
    asr_query_url: String,

    /// Recognition model requested for every task.
    #[arg(long, env, default_value = "bigmodel")]
    asr_model_name: String,

    /// Container format of uploaded audio files.
    #[arg(long, env, default_value = "mp3")]
    asr_audio_format: String,

    /// Maximum sustained ASR requests per second, per application id.
    #[arg(long, env, default_value_t = 100)]
    pub asr_rate_limit: u32,

    /// Number of ASR requests allowed instantly before throttling kicks in.
    #[arg(long, env, default_value_t = 100)]
    pub asr_rate_burst: u32,

    /// Longest time in milliseconds a request may wait for a rate limit token.
    /// When unset, requests wait as long as needed.
    #[arg(long, env)]
    pub asr_throttle_max_wait_ms: Option<u64>,

    /// Timeout in seconds for a single ASR request.
    #[arg(long, env, default_value_t = 30)]
    pub asr_request_timeout_secs: u64,

    /// Access key for the S3 compatible object storage.
    #[arg(long, env, hide_env_values = true)]
    storage_access_key: Option<String>,

    /// Secret key for the S3 compatible object storage.
    #[arg(long, env, hide_env_values = true)]
    storage_secret_key: Option<String>,

    /// Object storage endpoint, with or without scheme (e.g. tos-s3-cn-beijing.volces.com).
    #[arg(long, env)]
    storage_endpoint: Option<String>,

    /// Object storage region.
    #[arg(long, env)]
    storage_region: Option<String>,

    /// Bucket holding uploaded audio files.
    #[arg(long, env)]
    storage_bucket: Option<String>,

    /// Lifetime in seconds of generated upload/download URLs.
    #[arg(long, env, default_value_t = 3600)]
    pub storage_url_expiry_secs: u64,

    /// Base URL of the OpenAI compatible chat completion API.
    #[arg(long, env, default_value = DEFAULT_LLM_BASE_URL)]
    llm_base_url: String,

    /// Model (or inference endpoint) id used for chat completions.
    #[arg(long, env = "MODEL_ID")]
    llm_model_id: Option<String>,

    /// API key for the chat completion API.
    #[arg(long, env, hide_env_values = true)]
    llm_api_key: Option<String>,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(
    short,
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING",
        "development", "production", "staging"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap()),
    )]
    pub runtime_env: RustEnv,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        apply_env_aliases();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    /// Builds a config from environment variables only, ignoring process arguments.
    pub fn from_env() -> Self {
        apply_env_aliases();
        Config::parse_from([env!("CARGO_PKG_NAME")])
    }

    pub fn asr_app_id(&self) -> Option<String> {
        self.asr_app_id.clone()
    }

    pub fn asr_access_token(&self) -> Option<String> {
        self.asr_access_token.clone()
    }

    pub fn asr_cluster_id(&self) -> Option<String> {
        self.asr_cluster_id.clone()
    }

    pub fn asr_resource_id(&self) -> &str {
        &self.asr_resource_id
    }

    pub fn asr_submit_url(&self) -> &str {
        &self.asr_submit_url
    }

    pub fn asr_query_url(&self) -> &str {
        &self.asr_query_url
    }

    pub fn asr_model_name(&self) -> &str {
        &self.asr_model_name
    }

    pub fn asr_audio_format(&self) -> &str {
        &self.asr_audio_format
    }

    /// Points both ASR endpoints at `base_url`, keeping the standard paths.
    pub fn set_asr_base_url(mut self, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/');
        self.asr_submit_url = format!("{base_url}/api/v3/auc/bigmodel/submit");
        self.asr_query_url = format!("{base_url}/api/v3/auc/bigmodel/query");
        self
    }

    pub fn set_asr_credentials(mut self, app_id: &str, access_token: &str) -> Self {
        self.asr_app_id = Some(app_id.to_string());
        self.asr_access_token = Some(access_token.to_string());
        self
    }

    pub fn clear_asr_credentials(mut self) -> Self {
        self.asr_app_id = None;
        self.asr_access_token = None;
        self
    }

    pub fn storage_access_key(&self) -> Option<String> {
        self.storage_access_key.clone()
    }

    pub fn storage_secret_key(&self) -> Option<String> {
        self.storage_secret_key.clone()
    }

    pub fn storage_endpoint(&self) -> Option<String> {
        self.storage_endpoint.clone()
    }

    pub fn storage_region(&self) -> Option<String> {
        self.storage_region.clone()
    }

    pub fn storage_bucket(&self) -> Option<String> {
        self.storage_bucket.clone()
    }

    pub fn set_storage(
        mut self,
        endpoint: &str,
        region: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Self {
        self.storage_endpoint = Some(endpoint.to_string());
        self.storage_region = Some(region.to_string());
        self.storage_bucket = Some(bucket.to_string());
        self.storage_access_key = Some(access_key.to_string());
        self.storage_secret_key = Some(secret_key.to_string());
        self
    }

    /// Returns the chat completion API base URL.
    pub fn llm_base_url(&self) -> &str {
        &self.llm_base_url
    }

    pub fn llm_model_id(&self) -> Option<String> {
        self.llm_model_id.clone()
    }

    pub fn llm_api_key(&self) -> Option<String> {
        self.llm_api_key.clone()
    }

    pub fn set_llm(mut self, base_url: &str, model_id: &str, api_key: &str) -> Self {
        self.llm_base_url = base_url.to_string();
        self.llm_model_id = Some(model_id.to_string());
        self.llm_api_key = Some(api_key.to_string());
        self
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_production(&self) -> bool {
        self.runtime_env() == RustEnv::Production
    }
}

/// Copies legacy variables onto their canonical names when the canonical one is unset.
fn apply_env_aliases() {
    for (alias, canonical) in ENV_ALIASES {
        if env::var_os(canonical).is_some() {
            continue;
        }
        if let Some(value) = env::var_os(alias) {
            env::set_var(canonical, value);
        }
    }
}
