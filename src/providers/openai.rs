//! OpenAI-compatible embeddings and chat completions.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{EmbeddingError, EmbeddingProvider, ProviderError, Responder};
use crate::prompt;
use crate::retrieval::RetrievalHit;

const PROVIDER: &str = "OpenAI";

/// Inputs per embeddings request
const EMBEDDING_BATCH_SIZE: usize = 256;

const ANSWER_TEMPERATURE: f32 = 0.7;
const GENERATE_TEMPERATURE: f32 = 0.8;
const MAX_TOKENS: u32 = 1500;

/// Message shown when asked to answer from an empty hit list.
pub const NO_RECIPES_FOUND: &str = "No recipes found in your collection matching your query.";

fn build_client(api_key: &str, timeout: Duration) -> anyhow::Result<Client> {
    anyhow::ensure!(!api_key.trim().is_empty(), "missing OpenAI API key");

    let mut headers = HeaderMap::new();
    let auth = format!("Bearer {}", api_key.trim());
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&auth).map_err(|_| anyhow::anyhow!("invalid OpenAI API key"))?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let client = Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()?;

    Ok(client)
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

/// Blocking embeddings client.
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: &str, base_url: &str, model: &str, timeout: Duration) -> anyhow::Result<Self> {
        anyhow::ensure!(!model.trim().is_empty(), "missing OpenAI embedding model name");

        Ok(Self {
            client: build_client(api_key, timeout)?,
            endpoint: endpoint(base_url, "embeddings"),
            model: model.to_string(),
        })
    }

    fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbeddingError::Request(format!("{PROVIDER} returned {status}: {body}")));
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .map_err(|e| EmbeddingError::Request(format!("failed to parse response: {e}")))?;

        vectors_in_input_order(parsed, inputs.len())
    }
}

impl EmbeddingProvider for OpenAiEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.request(&[text.to_string()])?
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or(EmbeddingError::NoVector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(EMBEDDING_BATCH_SIZE) {
            log::debug!("embedding batch of {} texts with {}", chunk.len(), self.model);
            vectors.extend(self.request(chunk)?);
        }
        Ok(vectors)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Reorder response entries by `index` and check one vector came back per input.
fn vectors_in_input_order(
    mut response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if response.data.is_empty() {
        return Err(EmbeddingError::NoVector);
    }
    if response.data.len() != expected {
        return Err(EmbeddingError::Request(format!(
            "{PROVIDER} returned {} embeddings for {} inputs",
            response.data.len(),
            expected
        )));
    }

    response.data.sort_by_key(|entry| entry.index);
    Ok(response.data.into_iter().map(|entry| entry.embedding).collect())
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Chat-completions responder.
pub struct OpenAiResponder {
    client: Client,
    endpoint: String,
    model: String,
}

impl OpenAiResponder {
    pub fn new(api_key: &str, base_url: &str, model: &str, timeout: Duration) -> anyhow::Result<Self> {
        anyhow::ensure!(!model.trim().is_empty(), "missing OpenAI chat model name");

        Ok(Self {
            client: build_client(api_key, timeout)?,
            endpoint: endpoint(base_url, "chat/completions"),
            model: model.to_string(),
        })
    }

    fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            temperature,
            max_tokens: MAX_TOKENS,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let resp = self.client.post(&self.endpoint).json(&body).send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp.json().map_err(|e| ProviderError::Decode {
            provider: PROVIDER,
            message: e.to_string(),
        })?;

        first_choice_content(parsed)
    }
}

impl Responder for OpenAiResponder {
    fn answer_from_hits(
        &self,
        query: &str,
        hits: &[RetrievalHit],
    ) -> Result<String, ProviderError> {
        if hits.is_empty() {
            return Ok(NO_RECIPES_FOUND.to_string());
        }

        let user = prompt::answer_user_prompt(query, hits);
        self.complete(prompt::ANSWER_SYSTEM_PROMPT, &user, ANSWER_TEMPERATURE)
    }

    fn generate_from_scratch(&self, query: &str) -> Result<String, ProviderError> {
        let user = prompt::generate_user_prompt(query);
        self.complete(prompt::GENERATE_SYSTEM_PROMPT, &user, GENERATE_TEMPERATURE)
    }
}

fn first_choice_content(response: ChatResponse) -> Result<String, ProviderError> {
    response
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .ok_or_else(|| ProviderError::Decode {
            provider: PROVIDER,
            message: "response contained no message content".to_string(),
        })
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}
