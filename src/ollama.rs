use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn generate_text(
        &self,
        model: &str,
        prompt: &str,
        num_predict: usize,
        temperature: f32,
    ) -> Result<String> {
        #[derive(Serialize)]
        struct GenerateReq<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
            options: GenerateOptions,
        }

        #[derive(Serialize)]
        struct GenerateOptions {
            num_predict: usize,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct GenerateResp {
            response: String,
        }

        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(url)
            .json(&GenerateReq {
                model,
                prompt,
                stream: false,
                options: GenerateOptions {
                    num_predict,
                    temperature,
                },
            })
            .send()
            .await
            .context("failed to call ollama generate endpoint")?
            .error_for_status()
            .context("ollama generate returned non-success status")?
            .json::<GenerateResp>()
            .await
            .context("failed to decode ollama generate response")?;

        Ok(response.response.trim().to_string())
    }

    /// Multi-turn chat completion over the session transcript.
    pub async fn chat(&self, model: &str, messages: &[(String, String)]) -> Result<String> {
        #[derive(Serialize)]
        struct ChatReq<'a> {
            model: &'a str,
            messages: Vec<ChatMessage<'a>>,
            stream: bool,
        }

        #[derive(Serialize)]
        struct ChatMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct ChatResp {
            message: RespMessage,
        }

        #[derive(Deserialize)]
        struct RespMessage {
            content: String,
        }

        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(url)
            .json(&ChatReq {
                model,
                messages: messages
                    .iter()
                    .map(|(role, content)| ChatMessage {
                        role: role.as_str(),
                        content: content.as_str(),
                    })
                    .collect(),
                stream: false,
            })
            .send()
            .await
            .context("failed to call ollama chat endpoint")?
            .error_for_status()
            .context("ollama chat returned non-success status")?
            .json::<ChatResp>()
            .await
            .context("failed to decode ollama chat response")?;

        Ok(response.message.content.trim().to_string())
    }

    /// Single-tool function call: offers one function to the model and returns
    /// its arguments if the model chose to call it. Models without tool
    /// support make Ollama answer 400; that is treated as "no call" so the
    /// caller can fall back to pattern extraction.
    pub async fn extract_tool_arguments(
        &self,
        model: &str,
        question: &str,
        tool_name: &str,
        description: &str,
        parameters: serde_json::Value,
    ) -> Result<Option<serde_json::Value>> {
        #[derive(Serialize)]
        struct ToolChatReq<'a> {
            model: &'a str,
            messages: Vec<ToolChatMessage<'a>>,
            stream: bool,
            tools: Vec<Tool<'a>>,
        }

        #[derive(Serialize)]
        struct ToolChatMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Tool<'a> {
            #[serde(rename = "type")]
            kind: &'a str,
            function: ToolFunction<'a>,
        }

        #[derive(Serialize)]
        struct ToolFunction<'a> {
            name: &'a str,
            description: &'a str,
            parameters: serde_json::Value,
        }

        #[derive(Deserialize)]
        struct ToolChatResp {
            message: ToolRespMessage,
        }

        #[derive(Deserialize)]
        struct ToolRespMessage {
            #[serde(default)]
            tool_calls: Vec<ToolCall>,
        }

        #[derive(Deserialize)]
        struct ToolCall {
            function: ToolCallFunction,
        }

        #[derive(Deserialize)]
        struct ToolCallFunction {
            name: String,
            arguments: serde_json::Value,
        }

        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(url)
            .json(&ToolChatReq {
                model,
                messages: vec![ToolChatMessage {
                    role: "user",
                    content: question,
                }],
                stream: false,
                tools: vec![Tool {
                    kind: "function",
                    function: ToolFunction {
                        name: tool_name,
                        description,
                        parameters,
                    },
                }],
            })
            .send()
            .await
            .context("failed to call ollama chat endpoint with tools")?;

        if response.status() == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!("model {model} rejected tool call request: {body}");
            return Ok(None);
        }

        let response = response
            .error_for_status()
            .context("ollama tool chat returned non-success status")?
            .json::<ToolChatResp>()
            .await
            .context("failed to decode ollama tool chat response")?;

        let arguments = response
            .message
            .tool_calls
            .into_iter()
            .find(|call| call.function.name == tool_name)
            .map(|call| call.function.arguments);

        // Some models return the arguments object JSON-encoded as a string.
        match arguments {
            Some(serde_json::Value::String(encoded)) => {
                Ok(serde_json::from_str(&encoded).ok())
            }
            other => Ok(other),
        }
    }
}
