//! Streaming chat completions from an OpenAI-compatible endpoint

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

use super::{CompletionModel, TokenStream};
use crate::call::ChatMessage;
use crate::config::LlmConfig;
use crate::{Error, Result};

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Outcome of one server-sent-events line
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Token(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> Result<SseLine> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let chunk: CompletionChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map_or(SseLine::Skip, SseLine::Token))
}

/// Forward content deltas from an SSE byte stream until `[DONE]`
///
/// A body that ends without `[DONE]` is reported as an error so the caller
/// knows the reply was cut short.
async fn forward_sse<S, B>(body: S, tx: mpsc::Sender<Result<String>>)
where
    S: Stream<Item = reqwest::Result<B>>,
    B: AsRef<[u8]>,
{
    let mut body = Box::pin(body);
    // bytes, so a character split across chunks is decoded whole
    let mut line_buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx.send(Err(Error::Llm(format!("completion stream error: {e}")))).await;
                return;
            }
        };

        line_buffer.extend_from_slice(bytes.as_ref());

        while let Some(newline) = line_buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = line_buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw[..newline]);
            let line = line.trim_end_matches('\r');

            match parse_sse_line(line) {
                Ok(SseLine::Token(token)) => {
                    if tx.send(Ok(token)).await.is_err() {
                        return;
                    }
                }
                Ok(SseLine::Done) => return,
                Ok(SseLine::Skip) => {}
                Err(e) => tracing::warn!(error = %e, "skipping malformed completion chunk"),
            }
        }
    }

    let _ = tx
        .send(Err(Error::Llm("completion stream ended before [DONE]".to_string())))
        .await;
}

/// Chat-completions client
pub struct OpenAiCompletion {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiCompletion {
    /// Create a client from config
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("OpenAI API key required for completions".to_string()))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl CompletionModel for OpenAiCompletion {
    async fn stream_completion(&self, messages: Vec<ChatMessage>) -> Result<TokenStream> {
        let request = CompletionRequest {
            model: &self.model,
            messages: &messages,
            max_tokens: self.max_tokens,
            stream: true,
        };

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
            return Err(Error::Llm(format!("completion error {status}: {body}")));
        }

        tracing::debug!(model = %self.model, messages = messages.len(), "completion stream opened");

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(forward_sse(response.bytes_stream(), tx).instrument(tracing::Span::current()));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
