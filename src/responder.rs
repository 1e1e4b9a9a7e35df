use anyhow::Result;

use crate::config::{ModelConfig, TokenConfig};
use crate::error::PatentError;
use crate::ollama::OllamaClient;
use crate::record::PatentRecord;

/// Two-phase grounded responder: one model call selects the record columns
/// relevant to the question, a second call answers from only those values.
/// Keeping the grounding prompt to model-selected fields trades an extra
/// round-trip for a smaller final context.
#[derive(Clone)]
pub struct Responder {
    ollama: OllamaClient,
    models: ModelConfig,
    tokens: TokenConfig,
}

impl Responder {
    pub fn new(ollama: OllamaClient, models: ModelConfig, tokens: TokenConfig) -> Self {
        Self {
            ollama,
            models,
            tokens,
        }
    }

    pub async fn respond(
        &self,
        record: &PatentRecord,
        question: &str,
    ) -> Result<String, PatentError> {
        if question.trim().is_empty() {
            return Err(PatentError::NoQuestion);
        }

        let selected = self.select_columns(record, question).await?;
        let context = build_context(record, &selected)?;

        let prompt = format!("{question}: context: {context}");
        self.ollama
            .generate_text(
                &self.models.chat_model,
                &prompt,
                self.tokens.max_output_tokens,
                0.7,
            )
            .await
            .map_err(|err| PatentError::Upstream(err.to_string()))
    }

    async fn select_columns(
        &self,
        record: &PatentRecord,
        question: &str,
    ) -> Result<Vec<String>, PatentError> {
        let prompt = selection_prompt(record, question);

        // One bounded re-ask when the reply is not a parseable list.
        let mut last_err = PatentError::ParseFailure("no reply".to_string());
        for _ in 0..2 {
            let reply = self
                .ollama
                .generate_text(
                    &self.models.selector_model,
                    &prompt,
                    self.tokens.selector_output_tokens,
                    0.3,
                )
                .await
                .map_err(|err| PatentError::Upstream(err.to_string()))?;

            match parse_column_list(&reply) {
                Ok(columns) if columns.is_empty() => {
                    last_err = PatentError::ParseFailure("model selected no columns".to_string());
                }
                Ok(columns) => return Ok(columns),
                Err(err) => last_err = err,
            }
        }

        Err(last_err)
    }
}

pub fn selection_prompt(record: &PatentRecord, question: &str) -> String {
    let columns = record.columns().join(", ");
    format!(
        "Determine from this list of column names [{columns}] the column(s) needed to answer \
         the following query: {question}. Reply with only a JSON array of column names, \
         ordered by relevance."
    )
}

/// Strict structured-output contract for the selection reply: a JSON string
/// array, optionally inside a code fence, or a Python-style list with
/// single-quoted items. Anything else is a parse failure.
pub fn parse_column_list(reply: &str) -> Result<Vec<String>, PatentError> {
    let body = strip_code_fence(reply.trim());

    if let Ok(columns) = serde_json::from_str::<Vec<String>>(body) {
        return Ok(columns);
    }

    let inner = body
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| PatentError::ParseFailure(snippet(reply)))?;

    let mut columns = Vec::new();
    for item in inner.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let unquoted = item
            .strip_prefix('\'')
            .and_then(|rest| rest.strip_suffix('\''))
            .or_else(|| {
                item.strip_prefix('"')
                    .and_then(|rest| rest.strip_suffix('"'))
            })
            .ok_or_else(|| PatentError::ParseFailure(snippet(reply)))?;
        columns.push(unquoted.to_string());
    }

    Ok(columns)
}

/// Looks up each selected column in order and appends `"<column>: <value>; "`.
/// A selected column absent from the record is logged and skipped; if none
/// resolve the selection is treated as a parse failure.
pub fn build_context(record: &PatentRecord, selected: &[String]) -> Result<String, PatentError> {
    let mut context = String::new();
    let mut resolved = 0usize;

    for column in selected {
        match record.get(column) {
            Some(value) => {
                context.push_str(&format!("{column}: {value}; "));
                resolved += 1;
            }
            None => tracing::warn!("selected column not present in record: {column}"),
        }
    }

    if resolved == 0 {
        return Err(PatentError::ParseFailure(format!(
            "none of the selected columns exist in the record: {}",
            selected.join(", ")
        )));
    }

    Ok(context)
}

fn strip_code_fence(body: &str) -> &str {
    let Some(rest) = body.strip_prefix("```") else {
        return body;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    rest.trim().trim_end_matches("```").trim()
}

fn snippet(reply: &str) -> String {
    reply.chars().take(120).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::record::flatten_record;

    fn widget_record() -> PatentRecord {
        let (record, _) = flatten_record(&json!({
            "title": "Widget",
            "claims": "A device...",
        }));
        record
    }

    #[test]
    fn parses_json_array() {
        let columns = parse_column_list(r#"["title", "claims"]"#).expect("parse");
        assert_eq!(columns, vec!["title", "claims"]);
    }

    #[test]
    fn parses_fenced_json_array() {
        let columns = parse_column_list("```json\n[\"title\"]\n```").expect("parse");
        assert_eq!(columns, vec!["title"]);
    }

    #[test]
    fn parses_python_style_list() {
        let columns = parse_column_list("['title', 'claims']").expect("parse");
        assert_eq!(columns, vec!["title", "claims"]);
    }

    #[test]
    fn rejects_free_text() {
        let err = parse_column_list("The most relevant column is title.").unwrap_err();
        assert!(matches!(err, PatentError::ParseFailure(_)));
    }

    #[test]
    fn rejects_unquoted_items() {
        let err = parse_column_list("[title, claims]").unwrap_err();
        assert!(matches!(err, PatentError::ParseFailure(_)));
    }

    #[test]
    fn context_uses_only_selected_columns() {
        let context = build_context(&widget_record(), &["title".to_string()]).expect("context");
        assert_eq!(context, "title: Widget; ");
        assert!(!context.contains("claims"));
    }

    #[test]
    fn context_preserves_selection_order() {
        let context = build_context(
            &widget_record(),
            &["claims".to_string(), "title".to_string()],
        )
        .expect("context");
        assert_eq!(context, "claims: A device...; title: Widget; ");
    }

    #[test]
    fn absent_columns_are_skipped() {
        let context = build_context(
            &widget_record(),
            &["abstract".to_string(), "title".to_string()],
        )
        .expect("context");
        assert_eq!(context, "title: Widget; ");
    }

    #[test]
    fn all_absent_columns_fail() {
        let err = build_context(&widget_record(), &["abstract".to_string()]).unwrap_err();
        assert!(matches!(err, PatentError::ParseFailure(_)));
    }

    #[tokio::test]
    async fn empty_question_fails_before_any_model_call() {
        // Unreachable Ollama URL: a model call would surface Upstream.
        let responder = Responder::new(
            OllamaClient::new("http://127.0.0.1:1"),
            ModelConfig {
                chat_model: "m".to_string(),
                selector_model: "m".to_string(),
            },
            TokenConfig {
                max_output_tokens: 100,
                selector_output_tokens: 50,
                history_messages: 8,
                stream_chunk_chars: 20,
            },
        );

        let err = responder.respond(&widget_record(), "   ").await.unwrap_err();
        assert!(matches!(err, PatentError::NoQuestion));
    }

    #[test]
    fn selection_prompt_lists_columns_and_question() {
        let prompt = selection_prompt(&widget_record(), "what is the title?");
        assert!(prompt.contains("title, claims"));
        assert!(prompt.contains("what is the title?"));
        assert!(prompt.contains("JSON array"));
    }
}
