pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod identifier;
pub mod models;
pub mod ollama;
pub mod patent_data;
pub mod record;
pub mod responder;
pub mod server;

pub use config::AppConfig;
pub use server::run_server;
