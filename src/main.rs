use std::sync::Arc;
use std::time::Duration;

use domain::gateway::llm::LlmClient;
use domain::gateway::object_storage::{S3Storage, Storage};
use domain::gateway::volcengine_asr::AsrClient;
use domain::rate_limit::TokenBucketLimiter;
use domain::Transcriber;
use log::*;
use service::{config::Config, logging::Logger};
use web::AppState;

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config);

    info!(
        "Starting {} v{} ({} environment)",
        clap::crate_name!(),
        clap::crate_version!(),
        config.runtime_env()
    );

    let app_state = match build_app_state(config) {
        Ok(app_state) => app_state,
        Err(e) => {
            error!("Failed to start: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = web::init_server(app_state).await {
        error!("Server exited with error: {e}");
        std::process::exit(1);
    }
}

fn build_app_state(config: Config) -> Result<AppState, domain::error::Error> {
    let mut limiter = TokenBucketLimiter::new();
    if let Some(max_wait_ms) = config.asr_throttle_max_wait_ms {
        limiter = limiter.with_max_wait(Duration::from_millis(max_wait_ms));
    }
    info!(
        "ASR rate limit: {}/s with burst {}",
        config.asr_rate_limit, config.asr_rate_burst
    );

    let storage: Arc<dyn Storage> = Arc::new(S3Storage::new(&config)?);
    let asr = AsrClient::new(&config, Arc::new(limiter))?;
    let transcriber = Arc::new(Transcriber::new(Arc::clone(&storage), asr));

    let llm = match LlmClient::new(&config) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!("Chat completions are disabled: {}", e.detail());
            None
        }
    };

    Ok(AppState::new(config, transcriber, storage, llm))
}
