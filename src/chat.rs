//! Summary and follow-up chat over an OpenAI-compatible chat completions endpoint.

use std::path::Path;

use async_trait::async_trait;
use eyre::{Result, bail};
use futures::StreamExt;
use log::{debug, warn};
use serde::Serialize;

use crate::config::Config;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const MODEL_ENV: &str = "MODEL";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

/// Used when the seed-instruction file does not exist
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that summarizes video transcripts. \
Provide a clear, structured summary that captures the key points, main arguments, and important details. \
Use bullet points for key takeaways. Afterwards, answer follow-up questions using the transcript.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Append-only chat history sent with every request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// System instruction followed by the transcript as the first user turn
    pub fn seeded(instructions: &str, transcript: &str) -> Self {
        let mut conversation = Self::default();
        conversation.push(Role::System, instructions);
        conversation.push(Role::User, transcript);
        conversation
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message {
            role,
            content: content.into(),
        });
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Credential and endpoint for the chat API, resolved once at startup
#[derive(Clone)]
pub struct ChatConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl std::fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ChatConfig {
    /// Environment variables take priority over the config file
    pub fn resolve<E>(config: &Config, env: E) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = lookup(API_KEY_ENV)
            .ok_or_else(|| eyre::eyre!("{API_KEY_ENV} environment variable not set (required for summarization)"))?;
        let model = lookup(MODEL_ENV)
            .or_else(|| config.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = lookup(BASE_URL_ENV)
            .or_else(|| config.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            api_key,
            model,
            base_url,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Receives each piece of the reply as it streams in
pub type DeltaSink<'s> = dyn for<'d> FnMut(&'d str) + Send + 's;

/// Something that can stream an assistant reply for a list of messages
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, messages: &[Message], on_delta: &mut DeltaSink<'_>) -> Result<String>;
}

pub struct ChatClient {
    client: reqwest::Client,
    config: ChatConfig,
}

impl ChatClient {
    pub fn new(client: reqwest::Client, config: ChatConfig) -> Self {
        Self { client, config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl Completion for ChatClient {
    async fn complete(&self, messages: &[Message], on_delta: &mut DeltaSink<'_>) -> Result<String> {
        debug!(
            "Requesting chat completion: model={} messages={}",
            self.config.model,
            messages.len()
        );

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "stream": true
        });

        let resp = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("chat API returned {status}: {body}");
        }

        let mut stream = resp.bytes_stream();
        let mut decoder = SseDecoder::default();
        let mut reply = String::new();
        let mut done = false;

        while !done {
            let Some(chunk) = stream.next().await else {
                break;
            };
            for event in decoder.feed(&chunk?)? {
                match event {
                    StreamEvent::Delta(text) => {
                        on_delta(&text);
                        reply.push_str(&text);
                    }
                    StreamEvent::Done => {
                        done = true;
                        break;
                    }
                }
            }
        }

        if !done {
            for event in decoder.finish()? {
                if let StreamEvent::Delta(text) = event {
                    on_delta(&text);
                    reply.push_str(&text);
                }
            }
        }

        if reply.is_empty() {
            bail!("chat API returned an empty reply");
        }
        debug!("Chat completion finished: {} chars", reply.len());
        Ok(reply)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta(String),
    Done,
}

/// Splits a server-sent-event byte stream into lines, tolerating chunk boundaries anywhere
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = parse_sse_line(&line)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Parse whatever is left after the stream closed without a trailing newline
    pub fn finish(&mut self) -> Result<Vec<StreamEvent>> {
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest);
        Ok(parse_sse_line(&line)?.into_iter().collect())
    }
}

/// Interpret one SSE line from a streaming chat completion
pub fn parse_sse_line(line: &str) -> Result<Option<StreamEvent>> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        // blank separators, comments and other fields
        return Ok(None);
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(Some(StreamEvent::Done));
    }
    if data.is_empty() {
        return Ok(None);
    }

    let json: serde_json::Value = serde_json::from_str(data)?;

    if let Some(error) = json.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        bail!("chat API stream error: {message}");
    }

    let delta = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|t| t.as_str())
        .filter(|t| !t.is_empty());

    Ok(delta.map(|t| StreamEvent::Delta(t.to_string())))
}

/// Read the system instruction, falling back to the built-in prompt when the file is absent
pub fn load_instructions(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(content) if !content.trim().is_empty() => Ok(content),
        Ok(_) => {
            warn!("Instruction file {} is empty, using default prompt", path.display());
            Ok(DEFAULT_SYSTEM_PROMPT.to_string())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Instruction file {} not found, using default prompt", path.display());
            Ok(DEFAULT_SYSTEM_PROMPT.to_string())
        }
        Err(e) => Err(eyre::eyre!("failed to read {}: {e}", path.display())),
    }
}

/// Session commands are slash-prefixed so any plain text, "exit" included, can be asked
pub fn is_exit_command(input: &str) -> bool {
    matches!(input.trim().to_ascii_lowercase().as_str(), "/exit" | "/quit")
}

/// A conversation plus the backend that answers it
pub struct ChatSession<C> {
    backend: C,
    conversation: Conversation,
}

impl<C: Completion> ChatSession<C> {
    pub fn new(backend: C, conversation: Conversation) -> Self {
        Self { backend, conversation }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Stream a reply to the conversation as it stands and record it
    pub async fn respond(&mut self, on_delta: &mut DeltaSink<'_>) -> Result<String> {
        let reply = self.backend.complete(self.conversation.messages(), on_delta).await?;
        self.conversation.push(Role::Assistant, reply.clone());
        Ok(reply)
    }

    /// Record a question and stream the answer; the question stays in the history even if the reply fails
    pub async fn ask(&mut self, question: &str, on_delta: &mut DeltaSink<'_>) -> Result<String> {
        self.conversation.push(Role::User, question);
        self.respond(on_delta).await
    }
}
