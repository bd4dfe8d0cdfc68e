use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::config::ResolvedModelConfig;
use crate::error::{Result, WikiError};
use super::client::{CompletionClient, CompletionRequest, TextStream};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Talks to an OpenAI-compatible chat completions API directly, bypassing the
/// completion service. Parameters come from the resolved model configuration.
pub struct OpenAiClient {
    api_base: String,
    api_key: String,
    model_config: ResolvedModelConfig,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_base: &str, api_key: String, model_config: ResolvedModelConfig) -> Self {
        Self::with_http(api_base, api_key, model_config, reqwest::Client::new())
    }

    pub fn with_http(
        api_base: &str,
        api_key: String,
        model_config: ResolvedModelConfig,
        http: reqwest::Client,
    ) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model_config,
            http,
        }
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut body: Map<String, Value> = self.model_config.parameters.clone();
        body.insert("model".to_string(), Value::String(self.model_config.model.clone()));
        body.insert("messages".to_string(), serde_json::to_value(&request.messages).unwrap_or_default());
        body.insert("stream".to_string(), Value::Bool(true));
        Value::Object(body)
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn stream(&self, request: &CompletionRequest) -> Result<TextStream> {
        let url = format!("{}/chat/completions", self.api_base);
        debug!("POST {} (model={})", url, self.model_config.model);

        let response = self.http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| WikiError::Network(format!("OpenAI API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WikiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let mut bytes = Box::pin(response.bytes_stream());

        Ok(Box::pin(async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();

            'read: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err::<String, WikiError>(WikiError::from(e));
                        break;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(frame) = extract_sse_frame(&mut buffer) {
                    let Some(data) = sse_data(&String::from_utf8_lossy(&frame)) else {
                        continue;
                    };
                    if data.trim() == "[DONE]" {
                        break 'read;
                    }
                    match delta_content(&data) {
                        Ok(Some(text)) => yield Ok::<String, WikiError>(text),
                        Ok(None) => trace!("SSE frame without content"),
                        Err(e) => {
                            yield Err::<String, WikiError>(e);
                            break 'read;
                        }
                    }
                }
            }
        }))
    }

    fn name(&self) -> &str {
        "OpenAI API"
    }
}

/// Split one `\n\n`- or `\r\n\r\n`-terminated SSE frame off the front of `buffer`
fn extract_sse_frame(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| (pos, 4));
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|pos| (pos, 2));

    // Earliest delimiter wins
    let (pos, delimiter_len) = match (crlf, lf) {
        (Some(a), Some(b)) => if a.0 <= b.0 { a } else { b },
        (a, b) => a.or(b)?,
    };

    let frame = buffer.drain(..pos).collect::<Vec<u8>>();
    buffer.drain(..delimiter_len);
    Some(frame)
}

/// Joined `data:` lines of a frame, `None` for comment-only or empty frames
fn sse_data(frame: &str) -> Option<String> {
    let parts: Vec<&str> = frame.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

fn delta_content(data: &str) -> Result<Option<String>> {
    let json: Value = serde_json::from_str(data)?;
    Ok(json["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientKind;
    use crate::core::llm::test_server::{serve, Canned};

    #[test]
    fn test_extract_frames_with_both_delimiters() {
        let mut buffer = b"data: 0\n\ndata: 1\r\n\r\ndata: 2\n\npartial".to_vec();

        let zero = extract_sse_frame(&mut buffer).unwrap();
        assert_eq!(sse_data(&String::from_utf8_lossy(&zero)).unwrap(), "0");

        let first = extract_sse_frame(&mut buffer).unwrap();
        assert_eq!(sse_data(&String::from_utf8_lossy(&first)).unwrap(), "1");

        let second = extract_sse_frame(&mut buffer).unwrap();
        assert_eq!(sse_data(&String::from_utf8_lossy(&second)).unwrap(), "2");

        assert!(extract_sse_frame(&mut buffer).is_none());
        assert_eq!(buffer, b"partial");
    }

    #[test]
    fn test_sse_data_ignores_comments() {
        assert!(sse_data(": keep-alive").is_none());
        assert_eq!(sse_data("event: message\ndata: a\ndata:b").unwrap(), "a\nb");
    }

    #[test]
    fn test_delta_content() {
        let data = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(delta_content(data).unwrap().as_deref(), Some("Hel"));

        let role_only = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(delta_content(role_only).unwrap(), None);

        assert!(delta_content("not json").is_err());
    }

    fn local_client(url: &str) -> OpenAiClient {
        let mut parameters = Map::new();
        parameters.insert("model".to_string(), Value::String("gpt-4o-mini".to_string()));
        parameters.insert("temperature".to_string(), serde_json::json!(0.2));

        OpenAiClient::with_http(
            url,
            "sk-test".to_string(),
            ResolvedModelConfig {
                client: ClientKind::OpenAi,
                model: "gpt-4o-mini".to_string(),
                parameters,
            },
            reqwest::Client::builder().no_proxy().build().unwrap(),
        )
    }

    fn request() -> CompletionRequest {
        CompletionRequest::for_local_repo(
            std::path::Path::new("/r"),
            "openai",
            "gpt-4o-mini",
            &[],
            &[],
            "Write the page".to_string(),
        )
    }

    #[tokio::test]
    async fn test_stream_collects_deltas_until_done() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"# Hel\"}}]}\n\n",
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo ✓\"}}]}\r\n\r\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"after done\"}}]}\n\n",
        );
        let (url, mut bodies) = serve(vec![Canned::ok(body)]).await;

        let text = local_client(&url).complete(&request()).await.unwrap();
        assert_eq!(text, "# Hello ✓");

        let sent: Value = serde_json::from_str(&bodies.recv().await.unwrap()).unwrap();
        assert_eq!(sent["model"], "gpt-4o-mini");
        assert_eq!(sent["stream"], true);
        assert_eq!(sent["temperature"], serde_json::json!(0.2));
        assert_eq!(sent["messages"][0]["content"], "Write the page");
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported() {
        let (url, _bodies) = serve(vec![Canned::status(401, "invalid api key")]).await;

        match local_client(&url).complete(&request()).await {
            Err(WikiError::Http { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("expected HTTP error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_is_an_error() {
        let (url, _bodies) = serve(vec![Canned::ok("data: {not json\n\n")]).await;

        let err = local_client(&url).complete(&request()).await.unwrap_err();
        assert!(matches!(err, WikiError::Serialization(_)));
    }

    #[test]
    fn test_request_body_merges_parameters() {
        let mut parameters = Map::new();
        parameters.insert("model".to_string(), Value::String("gpt-4o".to_string()));
        parameters.insert("temperature".to_string(), serde_json::json!(0.7));

        let client = OpenAiClient::new(
            OPENAI_API_BASE,
            "sk-test".to_string(),
            ResolvedModelConfig {
                client: ClientKind::OpenAi,
                model: "gpt-4o".to_string(),
                parameters,
            },
        );

        let request = CompletionRequest::for_local_repo(
            std::path::Path::new("/r"),
            "openai",
            "gpt-4o",
            &[],
            &[],
            "hi".to_string(),
        );
        let body = client.request_body(&request);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["temperature"], serde_json::json!(0.7));
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["content"], "hi");
    }
}
