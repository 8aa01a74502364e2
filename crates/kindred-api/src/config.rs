//! Process configuration via clap.

use std::path::PathBuf;

use clap::Parser;

/// Kindred persona chat relay service.
#[derive(Debug, Clone, Parser)]
#[command(name = "kindred", version, about = "Persona chat relay service")]
pub struct Config {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8000)]
    pub port: u16,

    /// Data directory for the SQLite database. Defaults to `~/.kindred`.
    #[arg(long, env = "KINDRED_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Model identifier sent to the provider.
    #[arg(long, default_value = "sonar")]
    pub model: String,

    /// Which provider backend to use.
    #[arg(long, default_value = "perplexity", value_parser = ["perplexity", "openai"])]
    pub provider: String,

    /// Provider API key.
    #[arg(long, env = "KINDRED_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Messages allowed per user per calendar day.
    #[arg(long, default_value_t = 50)]
    pub daily_limit: u32,

    /// Soft word cap applied to streamed replies.
    #[arg(long, default_value_t = 30)]
    pub word_cap: usize,

    /// Hard token ceiling passed to the provider per reply.
    #[arg(long, default_value_t = 85)]
    pub max_reply_tokens: u32,

    /// Sampling temperature.
    #[arg(long, default_value_t = 0.8)]
    pub temperature: f64,

    /// Comma-separated CORS origins; `*` allows any.
    #[arg(long, default_value = "*", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,
}
