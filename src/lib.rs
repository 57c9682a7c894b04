pub mod agent;
pub mod cli;
pub mod error;
pub mod llm;
pub mod models;
pub mod server;

use agent::RunPolicy;
use cli::Args;
use llm::AssistantBackend;
use llm::openai::OpenAIAssistantClient;
use log::{ info, warn };
use server::Server;
use server::api::AppState;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Upstream Base URL: {}", args.openai_base_url);
    info!("Completion Model: {}", args.openai_model);
    info!("Allowed Origin: {}", args.allowed_origin);
    info!("Poll Interval: {}ms", args.poll_interval_ms);
    info!("Poll Max Attempts: {}", args.poll_max_attempts);
    info!("Inline Run Input: {}", args.inline_run_input);
    info!("-------------------------");

    let backend: Option<Arc<dyn AssistantBackend>> = match args.openai_api_key.as_deref() {
        Some(key) if !key.is_empty() => {
            let client = OpenAIAssistantClient::new(
                key.to_string(),
                Some(args.openai_base_url.clone()),
                Some(args.openai_model.clone()),
            )?;
            Some(Arc::new(client) as Arc<dyn AssistantBackend>)
        }
        _ => {
            warn!("OPENAI_API_KEY is not set; chat routes will answer with a configuration error");
            None
        }
    };

    let policy = RunPolicy {
        poll_interval: Duration::from_millis(args.poll_interval_ms),
        max_poll_attempts: args.poll_max_attempts,
        inline_run_input: args.inline_run_input,
    };

    let state = AppState::new(backend, policy);
    let server = Server::new(args.server_addr.clone(), state, args.allowed_origin.clone());
    server.run().await
}
