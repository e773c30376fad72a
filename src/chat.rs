//! Remote chat completion (OpenAI-compatible, Groq by default)

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::ChatConfig;
use crate::knowledge::KnowledgeBase;
use crate::{Error, Result};

/// Produces an answer for a system prompt and user message
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Complete one exchange
    ///
    /// # Errors
    ///
    /// Returns error on transport, HTTP or parse failure
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Build the IDMS expert system prompt around the knowledge base
#[must_use]
pub fn system_prompt(knowledge: &KnowledgeBase) -> String {
    format!(
        "You are an IDMS ERP system expert assistant. Your purpose is to help users understand and use the IDMS ERP system effectively.

Use the following knowledge base to answer user questions:

{}

Focus on providing accurate, helpful information about the IDMS ERP system. If a user asks about something not covered in your knowledge base, you can provide general ERP guidance but make it clear that it may not be specific to IDMS.

For GST-related questions, be especially precise and reference the appropriate sections of the IDMS system.",
        knowledge.context()
    )
}

/// Chat client for OpenAI-compatible `/chat/completions` endpoints
pub struct CompletionClient {
    client: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl CompletionClient {
    /// Create a client from configuration
    #[must_use]
    pub fn new(config: ChatConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl ChatClient for CompletionClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        tracing::debug!(model = %self.model, input_len = user.len(), "requesting chat completion");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Chat(format!("completion API error {status}: {body}")));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Chat(format!("failed to parse completion response: {e}")))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Chat("completion returned no content".to_string()))?;

        tracing::debug!(response_len = content.len(), "chat completion received");
        Ok(content)
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> CompletionClient {
        CompletionClient::new(ChatConfig {
            api_key: SecretString::from("gsk_test".to_string()),
            base_url: base_url.to_string(),
            model: "llama3-8b-8192".to_string(),
            temperature: 0.3,
            max_tokens: 800,
        })
    }

    #[test]
    fn test_system_prompt_embeds_knowledge() {
        let kb = KnowledgeBase::new("SECRET-MODULE-LIST", Vec::new());
        let prompt = system_prompt(&kb);
        assert!(prompt.contains("SECRET-MODULE-LIST"));
        assert!(prompt.starts_with("You are an IDMS ERP system expert assistant."));
    }

    #[tokio::test]
    async fn test_complete_reads_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer gsk_test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "llama3-8b-8192",
                "max_tokens": 800,
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "What is GST?"}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"GST is a tax."}}]}"#)
            .create_async()
            .await;

        let answer = client(&server.url()).complete("sys", "What is GST?").await.unwrap();
        assert_eq!(answer, "GST is a tax.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_http_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("invalid key")
            .create_async()
            .await;

        let err = client(&server.url()).complete("sys", "hi").await.unwrap_err();
        assert!(matches!(err, Error::Chat(msg) if msg.contains("401")));
    }

    #[tokio::test]
    async fn test_complete_empty_choices() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let err = client(&server.url()).complete("sys", "hi").await.unwrap_err();
        assert!(matches!(err, Error::Chat(_)));
    }
}
