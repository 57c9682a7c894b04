use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:8787")]
    pub server_addr: String,

    /// API key for the upstream assistants service. Requests fail with a
    /// configuration error when unset.
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    /// Base URL of the upstream API.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com")]
    pub openai_base_url: String,

    /// Model used for single-shot completion requests (the /agent route and
    /// the assistant-run fallback path).
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4.1-mini")]
    pub openai_model: String,

    /// Allowed CORS origin; "*" allows any origin.
    #[arg(long, env = "ALLOWED_ORIGIN", default_value = "*")]
    pub allowed_origin: String,

    /// Delay between run status polls, in milliseconds.
    #[arg(long, env = "POLL_INTERVAL_MS", default_value = "500")]
    pub poll_interval_ms: u64,

    /// Maximum number of run status polls before the request times out.
    #[arg(long, env = "POLL_MAX_ATTEMPTS", default_value = "60")]
    pub poll_max_attempts: u32,

    /// Submit the user turn as inline run input instead of posting it to the
    /// thread before the run starts.
    #[arg(long, env = "INLINE_RUN_INPUT", default_value = "false")]
    pub inline_run_input: bool,
}
