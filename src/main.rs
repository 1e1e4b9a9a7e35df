use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

use patent_chatbot::chat::ChatService;
use patent_chatbot::db::Database;
use patent_chatbot::ollama::OllamaClient;
use patent_chatbot::patent_data::PatentDataClient;
use patent_chatbot::{run_server, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env();
    tokio::fs::create_dir_all(&config.data_dir).await?;

    let db = Database::new(&config).await?;
    let ollama = OllamaClient::new(config.ollama_base_url.clone());
    let patents = PatentDataClient::new(config.patent_api_base_url.clone(), config.retry.clone());

    let generation_limit = Arc::new(Semaphore::new(1));

    let chat = ChatService::new(config.clone(), db.clone(), ollama, patents, generation_limit);

    run_server(config, db, chat).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
