//! Application state shared across HTTP handlers.

use std::sync::Arc;

use kindred_core::chat::{ChatCoordinator, TurnConfig};
use kindred_infra::llm::OpenAiCompatibleProvider;
use kindred_infra::sqlite::{
    DatabasePool, SqliteConversationRepository, SqliteSessionRepository, SqliteUserRepository,
};

use crate::config::Config;

/// The coordinator over the concrete SQLite and provider implementations.
pub type AppCoordinator = ChatCoordinator<
    SqliteUserRepository,
    SqliteSessionRepository,
    SqliteConversationRepository,
    OpenAiCompatibleProvider,
>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<AppCoordinator>,
}

impl AppState {
    /// Initialize the database pool, repositories, provider, and coordinator.
    pub async fn init(config: &Config) -> anyhow::Result<Self> {
        let data_dir = match &config.data_dir {
            Some(dir) => dir.clone(),
            None => {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                std::path::PathBuf::from(home).join(".kindred")
            }
        };
        tokio::fs::create_dir_all(&data_dir).await?;

        let database_url = format!("sqlite://{}/kindred.db?mode=rwc", data_dir.display());
        let pool = DatabasePool::new(&database_url).await?;

        let provider = match config.provider.as_str() {
            "openai" => OpenAiCompatibleProvider::openai(&config.api_key, &config.model),
            _ => OpenAiCompatibleProvider::perplexity(&config.api_key, &config.model),
        };

        let coordinator = ChatCoordinator::new(
            SqliteUserRepository::new(pool.clone()),
            SqliteSessionRepository::new(pool.clone()),
            SqliteConversationRepository::new(pool),
            Arc::new(provider),
            TurnConfig {
                model: config.model.clone(),
                max_reply_tokens: config.max_reply_tokens,
                temperature: config.temperature,
                word_cap: config.word_cap,
                daily_limit: config.daily_limit,
            },
        );

        Ok(Self {
            coordinator: Arc::new(coordinator),
        })
    }
}
