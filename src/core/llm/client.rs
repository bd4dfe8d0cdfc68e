use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::pin::Pin;
use tracing::{debug, trace};

use crate::error::{Result, WikiError};

/// Lazy, finite stream of decoded text chunks. Consumed once per request.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Body of `POST /chat/completions/stream`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub repo_url: String,

    #[serde(rename = "type")]
    pub repo_type: String,

    pub provider: String,
    pub model: String,

    /// Newline-joined, `null` when empty
    pub excluded_dirs: Option<String>,

    /// Newline-joined, `null` when empty
    pub excluded_files: Option<String>,

    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    /// Single-message request about a repository on the local disk
    pub fn for_local_repo(
        repo_path: &Path,
        provider: &str,
        model: &str,
        excluded_dirs: &[String],
        excluded_files: &[String],
        prompt: String,
    ) -> Self {
        Self {
            repo_url: format!("file://{}", repo_path.display()),
            repo_type: "local".to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            excluded_dirs: join_lines(excluded_dirs),
            excluded_files: join_lines(excluded_files),
            messages: vec![ChatMessage::user(prompt)],
        }
    }
}

fn join_lines(items: &[String]) -> Option<String> {
    if items.is_empty() {
        None
    } else {
        Some(items.join("\n"))
    }
}

/// Anything that can turn a completion request into streamed text
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Issue the request; the returned stream yields the response body as text
    async fn stream(&self, request: &CompletionRequest) -> Result<TextStream>;

    /// Human-readable name for logs
    fn name(&self) -> &str;

    /// Issue the request and accumulate the whole response
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let stream = self.stream(request).await?;
        collect_stream(stream).await
    }
}

/// Drain a text stream into one buffer
pub async fn collect_stream(mut stream: TextStream) -> Result<String> {
    let mut buffer = String::new();
    let mut chunks = 0usize;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        chunks += 1;
        trace!("chunk {}: {} bytes", chunks, chunk.len());
        buffer.push_str(&chunk);
    }

    debug!("Stream finished after {} chunks ({} bytes)", chunks, buffer.len());
    Ok(buffer)
}

/// Decode a byte stream into UTF-8 text chunks.
///
/// Multi-byte characters split across chunk boundaries are carried over to the
/// next chunk; invalid sequences become U+FFFD.
pub fn text_stream<S, B, E>(bytes: S) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<WikiError> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut decoder = Utf8Decoder::default();
        let mut bytes = Box::pin(bytes);
        let mut failed = false;

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    let text = decoder.push(chunk.as_ref());
                    if !text.is_empty() {
                        yield Ok::<String, WikiError>(text);
                    }
                }
                Err(e) => {
                    failed = true;
                    let err: WikiError = e.into();
                    yield Err(err);
                    break;
                }
            }
        }

        if !failed {
            let tail = decoder.finish();
            if !tail.is_empty() {
                yield Ok::<String, WikiError>(tail);
            }
        }
    })
}

#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        // Incomplete sequence at the end, wait for more bytes
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    pub(crate) fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}
