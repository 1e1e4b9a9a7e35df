use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use serde_json::json;
use tokio::sync::{Mutex, Semaphore};

use crate::config::AppConfig;
use crate::db::Database;
use crate::error::PatentError;
use crate::identifier::{classify, extract, normalize, IdentifierKind};
use crate::models::{AnswerMode, ChatAnswer, ChatRequest, PatentBindingView};
use crate::ollama::OllamaClient;
use crate::patent_data::PatentDataClient;
use crate::record::PatentRecord;
use crate::responder::Responder;

/// Questions starting with this marker route to the patent pipeline.
pub const PATENT_MARKER: &str = "@patent";

const MODEL_UNAVAILABLE_MESSAGE: &str = "The language model is unavailable, try again later.";

/// Per-session patent binding: the last resolved identifier and its fetched
/// record, reused until a question resolves to a different identifier.
#[derive(Clone)]
struct SessionBinding {
    identifier: String,
    record: PatentRecord,
}

#[derive(Clone)]
pub struct ChatService {
    config: AppConfig,
    db: Database,
    ollama: OllamaClient,
    patents: PatentDataClient,
    responder: Responder,
    bindings: Arc<Mutex<HashMap<String, SessionBinding>>>,
    generation_limit: Arc<Semaphore>,
}

impl ChatService {
    pub fn new(
        config: AppConfig,
        db: Database,
        ollama: OllamaClient,
        patents: PatentDataClient,
        generation_limit: Arc<Semaphore>,
    ) -> Self {
        let responder = Responder::new(
            ollama.clone(),
            config.models.clone(),
            config.tokens.clone(),
        );
        Self {
            config,
            db,
            ollama,
            patents,
            responder,
            bindings: Arc::new(Mutex::new(HashMap::new())),
            generation_limit,
        }
    }

    pub fn stream_chunk_chars(&self) -> usize {
        self.config.tokens.stream_chunk_chars
    }

    pub async fn answer(&self, request: ChatRequest) -> Result<ChatAnswer> {
        let started = Instant::now();

        self.db.ensure_session(&request.session_id).await?;
        self.db
            .save_message(&request.session_id, "user", &request.question)
            .await?;

        let _permit = self.generation_limit.acquire().await?;

        let (answer_text, mode, identifier) =
            match strip_patent_marker(&request.question) {
                Some(question) => {
                    let (text, identifier) =
                        self.patent_answer(&request.session_id, &question).await;
                    (text, AnswerMode::Patent, identifier)
                }
                None => (
                    self.general_answer(&request.session_id).await,
                    AnswerMode::General,
                    None,
                ),
            };

        self.db
            .save_message(&request.session_id, "assistant", &answer_text)
            .await?;

        Ok(ChatAnswer {
            answer: answer_text,
            mode,
            identifier,
            latency_ms: started.elapsed().as_millis(),
        })
    }

    pub async fn binding_view(&self, session_id: &str) -> Option<PatentBindingView> {
        let bindings = self.bindings.lock().await;
        bindings.get(session_id).map(|binding| PatentBindingView {
            identifier: binding.identifier.clone(),
            kind: classify(&binding.identifier).as_str().to_string(),
            columns: binding
                .record
                .columns()
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
    }

    /// Resolve the identifier, fetch (or reuse) the record, and produce the
    /// grounded answer. Pipeline errors are converted to their diagnostic
    /// strings so the chat flow always returns displayable text.
    async fn patent_answer(&self, session_id: &str, question: &str) -> (String, Option<String>) {
        let direct = self.extract_via_function_call(question).await;
        let bound = {
            let bindings = self.bindings.lock().await;
            bindings.get(session_id).map(|b| b.identifier.clone())
        };

        let Some(identifier) = resolve_identifier(direct.as_deref(), question, bound.as_deref())
        else {
            return (PatentError::NoIdentifier.user_message(), None);
        };
        tracing::info!("resolved application number: {identifier}");

        let cached = if !should_fetch(&identifier, bound.as_deref()) {
            let bindings = self.bindings.lock().await;
            bindings.get(session_id).map(|b| b.record.clone())
        } else {
            None
        };

        let record = match cached {
            Some(record) => {
                tracing::debug!("reusing cached record for {identifier}");
                record
            }
            None => match self.patents.fetch_record(&identifier).await {
                Ok(record) => {
                    let mut bindings = self.bindings.lock().await;
                    bindings.insert(
                        session_id.to_string(),
                        SessionBinding {
                            identifier: identifier.clone(),
                            record: record.clone(),
                        },
                    );
                    record
                }
                Err(err) => {
                    tracing::warn!("patent fetch failed for {identifier}: {err}");
                    return (err.user_message(), Some(identifier));
                }
            },
        };

        match self.responder.respond(&record, question).await {
            Ok(text) => (text, Some(identifier)),
            Err(err) => {
                tracing::warn!("patent responder failed for {identifier}: {err}");
                (err.user_message(), Some(identifier))
            }
        }
    }

    async fn general_answer(&self, session_id: &str) -> String {
        let history = self
            .db
            .latest_messages(session_id, self.config.tokens.history_messages)
            .await
            .unwrap_or_default();

        self.ollama
            .chat(&self.config.models.chat_model, &history)
            .await
            .unwrap_or_else(|err| {
                tracing::warn!("general chat failed: {err}");
                MODEL_UNAVAILABLE_MESSAGE.to_string()
            })
    }

    /// Opportunistic identifier extraction through model function calling;
    /// any failure degrades to the regex fallback.
    async fn extract_via_function_call(&self, question: &str) -> Option<String> {
        if question.trim().is_empty() {
            return None;
        }

        let parameters = json!({
            "type": "object",
            "properties": {
                "application_number": {
                    "type": "string",
                    "description": "The application or patent number in numeric or \
                     alphanumeric format, irrespective of commas, slashes, or dashes. \
                     It should have 11 or 8 digits.",
                }
            },
            "required": [],
        });

        let arguments = match self
            .ollama
            .extract_tool_arguments(
                &self.config.models.selector_model,
                question,
                "get_application_number",
                "Extract the patent application number mentioned in the question.",
                parameters,
            )
            .await
        {
            Ok(arguments) => arguments?,
            Err(err) => {
                tracing::debug!("function-call extraction failed: {err}");
                return None;
            }
        };

        arguments
            .get("application_number")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Strips the leading patent marker, returning the bare question when the
/// marker was present.
pub fn strip_patent_marker(question: &str) -> Option<String> {
    question
        .trim_start()
        .strip_prefix(PATENT_MARKER)
        .map(|rest| rest.trim().to_string())
}

/// Resolution priority: direct (function-call) extraction, then pattern
/// extraction from the question, then the previously bound identifier. A
/// candidate that classifies as valid wins over an earlier invalid one; when
/// only invalid candidates exist the first is kept so the fetch step refuses
/// it with "Invalid application number" instead of claiming nothing was
/// provided.
pub fn resolve_identifier(
    direct: Option<&str>,
    question: &str,
    bound: Option<&str>,
) -> Option<String> {
    let mut candidates = Vec::new();
    if let Some(direct) = direct {
        let cleaned = normalize(direct);
        if !cleaned.is_empty() {
            candidates.push(cleaned);
        }
    }
    if let Some(found) = extract(question) {
        let cleaned = normalize(&found);
        if !cleaned.is_empty() {
            candidates.push(cleaned);
        }
    }

    if let Some(valid) = candidates
        .iter()
        .find(|c| classify(c) != IdentifierKind::Invalid)
    {
        return Some(valid.clone());
    }

    if let Some(bound) = bound.filter(|b| !b.is_empty()) {
        return Some(bound.to_string());
    }

    candidates.into_iter().next()
}

fn should_fetch(resolved: &str, bound: Option<&str>) -> bool {
    bound != Some(resolved)
}

/// Splits a completed answer into fixed-size fragments for incremental
/// display. Boundaries fall on characters, never inside a code point.
pub fn chunk_answer(text: &str, chunk_chars: usize) -> Vec<String> {
    if text.is_empty() || chunk_chars == 0 {
        return vec![];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;

    for c in text.chars() {
        current.push(c);
        count += 1;
        if count == chunk_chars {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_routes_and_is_stripped() {
        assert_eq!(
            strip_patent_marker("@patent what is the title of US12345678A1?").as_deref(),
            Some("what is the title of US12345678A1?")
        );
        assert_eq!(strip_patent_marker("what is the title?"), None);
    }

    #[test]
    fn direct_extraction_wins() {
        let resolved = resolve_identifier(
            Some("US12345678A1"),
            "see EP-9876543-B2 for details",
            Some("11111111"),
        );
        assert_eq!(resolved.as_deref(), Some("12345678"));
    }

    #[test]
    fn invalid_direct_falls_back_to_question_extraction() {
        let resolved = resolve_identifier(Some("123"), "what about US12345678A1?", None);
        assert_eq!(resolved.as_deref(), Some("12345678"));
    }

    #[test]
    fn bound_identifier_is_reused_when_nothing_extracted() {
        let resolved = resolve_identifier(None, "and who are the inventors?", Some("12345678"));
        assert_eq!(resolved.as_deref(), Some("12345678"));
    }

    #[test]
    fn invalid_only_candidate_is_kept_for_diagnostics() {
        // Fetch will refuse it with "Invalid application number".
        let resolved = resolve_identifier(Some("EP1234"), "no other number here", None);
        assert_eq!(resolved.as_deref(), Some("1234"));
    }

    #[test]
    fn nothing_resolves_to_none() {
        assert_eq!(resolve_identifier(None, "what is a patent?", None), None);
    }

    #[test]
    fn fetch_skipped_only_for_identical_binding() {
        assert!(should_fetch("12345678", None));
        assert!(should_fetch("12345678", Some("87654321")));
        assert!(!should_fetch("12345678", Some("12345678")));
    }

    #[test]
    fn chunks_are_fixed_size_and_lossless() {
        let text = "abcdefghij".repeat(5);
        let chunks = chunk_answer(&text, 20);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[..2].iter().all(|c| c.chars().count() == 20));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn chunking_respects_utf8_boundaries() {
        let text = "héllo wörld ünïcode ßtring";
        let chunks = chunk_answer(text, 7);
        assert_eq!(chunks.concat(), text);
        assert!(chunks[..chunks.len() - 1]
            .iter()
            .all(|c| c.chars().count() == 7));
    }

    #[test]
    fn empty_answer_yields_no_chunks() {
        assert!(chunk_answer("", 20).is_empty());
    }
}
