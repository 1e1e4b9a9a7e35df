use std::env;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub chat_model: String,
    pub selector_model: String,
}

#[derive(Clone, Debug)]
pub struct TokenConfig {
    pub max_output_tokens: usize,
    pub selector_output_tokens: usize,
    pub history_messages: i64,
    pub stream_chunk_chars: usize,
}

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub fetch_attempts: usize,
    pub fetch_backoff_ms: u64,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub ollama_base_url: String,
    pub patent_api_base_url: String,
    pub models: ModelConfig,
    pub tokens: TokenConfig,
    pub retry: RetryConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let data_dir = env::var("PATENT_CHATBOT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let chat_model =
            env::var("CHAT_MODEL").unwrap_or_else(|_| "qwen2.5:14b-instruct".to_string());

        Self {
            bind_addr: env::var("PATENT_CHATBOT_BIND")
                .unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            data_dir,
            ollama_base_url: env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:11434".to_string()),
            patent_api_base_url: env::var("PATENT_API_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8750".to_string()),
            models: ModelConfig {
                selector_model: env::var("SELECTOR_MODEL").unwrap_or_else(|_| chat_model.clone()),
                chat_model,
            },
            tokens: TokenConfig {
                max_output_tokens: env::var("MAX_OUTPUT_TOKENS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(500),
                selector_output_tokens: env::var("SELECTOR_OUTPUT_TOKENS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(200),
                history_messages: env::var("HISTORY_MESSAGES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(8),
                stream_chunk_chars: env::var("STREAM_CHUNK_CHARS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(20),
            },
            retry: RetryConfig {
                fetch_attempts: env::var("FETCH_ATTEMPTS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3),
                fetch_backoff_ms: env::var("FETCH_BACKOFF_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(250),
            },
        }
    }

    pub fn sqlite_dsn(&self) -> String {
        format!(
            "sqlite://{}",
            self.data_dir.join("chatbot.sqlite3").display()
        )
    }
}
