use std::time::Duration;

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{RagError, Result};

/// Prompt in, one text completion out.
pub trait LanguageModel {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String>;
}

/// Chat client for a local Ollama server.
pub struct OllamaClient {
    model: String,
    endpoint: String,
    client: Client,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

/// HTTP client for an Ollama endpoint. A loopback server is never reached
/// through a system proxy.
pub(crate) fn ollama_http_client(endpoint: &str, timeout: Duration) -> Result<Client> {
    let mut builder = Client::builder().timeout(timeout);
    let loopback = Url::parse(endpoint)
        .ok()
        .and_then(|url| url.host_str().map(|host| matches!(host, "localhost" | "127.0.0.1" | "[::1]")))
        .unwrap_or(false);
    if loopback {
        builder = builder.no_proxy();
    }
    Ok(builder.build()?)
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client =
            ollama_http_client(&config.endpoint, Duration::from_secs(config.timeout_secs))?;

        Ok(OllamaClient {
            model: config.model.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Checks that the server answers at all.
    pub async fn ping(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.endpoint);
        let response = self.client.get(&url).send().await.map_err(|e| {
            RagError::Llm(format!("Ollama is not reachable at {}: {e}", self.endpoint))
        })?;

        if !response.status().is_success() {
            return Err(RagError::Llm(format!(
                "Ollama at {} answered {}",
                self.endpoint,
                response.status()
            )));
        }
        Ok(())
    }
}

impl LanguageModel for OllamaClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(RagError::Llm("Prompt cannot be empty".to_string()));
        }

        let url = format!("{}/api/chat", self.endpoint);
        debug!("Calling Ollama chat API: {} ({})", url, self.model);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            options: ChatOptions { temperature },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::Llm(format!(
                "Ollama API error ({status}): {error_text}"
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| RagError::Llm(format!("Failed to parse response: {e}")))?;

        Ok(result.message.content)
    }
}
