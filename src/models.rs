use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::settings::ModelParams;

/// Incremental text of one model reply. Ends when the model is done.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self { Self { speaker: Speaker::User, text: text.into() } }
    pub fn model(text: impl Into<String>) -> Self { Self { speaker: Speaker::Model, text: text.into() } }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub model: String,
    pub system_instruction: String,
    pub turns: Vec<Turn>,
    pub params: ModelParams,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream_generate(&self, req: ModelRequest) -> Result<ChunkStream, ChatError>;
}

/// Builds a model client for a credential. No network traffic happens here.
pub trait ModelConnector: Send + Sync {
    fn connect(&self, credential: &str) -> Arc<dyn ChatModel>;
}

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into(), api_key: api_key.into() }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiConnector {
    pub base_url: String,
}

impl ModelConnector for GeminiConnector {
    fn connect(&self, credential: &str) -> Arc<dyn ChatModel> {
        Arc::new(GeminiClient::new(self.base_url.clone(), credential))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: SystemInstruction<'a>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    candidates: Option<Vec<Candidate>>,
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<u16>,
    message: Option<String>,
    status: Option<String>,
}

impl<'a> GenerateContentRequest<'a> {
    fn from_request(req: &'a ModelRequest) -> Self {
        let contents = req
            .turns
            .iter()
            .map(|t| Content {
                role: match t.speaker {
                    Speaker::User => "user",
                    Speaker::Model => "model",
                },
                parts: vec![TextPart { text: &t.text }],
            })
            .collect();
        Self {
            contents,
            system_instruction: SystemInstruction { parts: vec![TextPart { text: &req.system_instruction }] },
            generation_config: GenerationConfig {
                temperature: req.params.temperature,
                top_k: req.params.top_k,
                top_p: req.params.top_p,
            },
        }
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn stream_generate(&self, req: ModelRequest) -> Result<ChunkStream, ChatError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/'),
            req.model
        );
        let body = GenerateContentRequest::from_request(&req);
        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(remote_error(status, &text));
        }
        Ok(parse_sse_stream(resp.bytes_stream()))
    }
}

fn remote_error(status: reqwest::StatusCode, body: &str) -> ChatError {
    let default_reason = status.canonical_reason().unwrap_or("error").to_string();
    match serde_json::from_str::<ErrorWrapper>(body) {
        Ok(w) => ChatError::Remote {
            status: w.error.code.unwrap_or(status.as_u16()),
            reason: w.error.status.unwrap_or(default_reason),
            message: w.error.message.unwrap_or_else(|| body.to_string()),
        },
        Err(_) => ChatError::Remote { status: status.as_u16(), reason: default_reason, message: body.trim().to_string() },
    }
}

/// Turns an SSE byte stream into reply text chunks.
///
/// Bytes are buffered until a blank line closes an event, so events and
/// multi-byte characters may be split anywhere by the transport.
pub fn parse_sse_stream<S, B, E>(stream: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ChatError> + Send + 'static,
{
    Box::pin(futures::stream::unfold(
        (stream.boxed(), Vec::<u8>::new(), false),
        |(mut stream, mut buffer, mut finished)| async move {
            loop {
                if let Some(end) = find_event_end(&buffer) {
                    let event: Vec<u8> = buffer.drain(..end + 2).collect();
                    match decode_event(&event[..end]) {
                        Ok(Some(text)) => return Some((Ok(text), (stream, buffer, finished))),
                        Ok(None) => continue,
                        Err(e) => {
                            buffer.clear();
                            return Some((Err(e), (stream, buffer, true)));
                        }
                    }
                }
                if finished {
                    if buffer.is_empty() {
                        return None;
                    }
                    let rest = std::mem::take(&mut buffer);
                    match decode_event(&rest) {
                        Ok(Some(text)) => return Some((Ok(text), (stream, buffer, true))),
                        Ok(None) => return None,
                        Err(e) => return Some((Err(e), (stream, buffer, true))),
                    }
                }
                match stream.next().await {
                    Some(Ok(bytes)) => buffer.extend(bytes.as_ref().iter().copied().filter(|b| *b != b'\r')),
                    Some(Err(e)) => {
                        buffer.clear();
                        return Some((Err(e.into()), (stream, buffer, true)));
                    }
                    None => finished = true,
                }
            }
        },
    ))
}

fn find_event_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn decode_event(raw: &[u8]) -> Result<Option<String>, ChatError> {
    let event = String::from_utf8_lossy(raw);
    let data: Vec<&str> = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|d| d.strip_prefix(' ').unwrap_or(d))
        .collect();
    if data.is_empty() {
        return Ok(None);
    }
    let payload = data.join("\n");
    if payload.trim() == "[DONE]" {
        return Ok(None);
    }
    let parsed: StreamEvent = serde_json::from_str(&payload).map_err(|e| ChatError::Stream(e.to_string()))?;
    if let Some(err) = parsed.error {
        return Err(ChatError::Remote {
            status: err.code.unwrap_or(500),
            reason: err.status.unwrap_or_else(|| "error".into()),
            message: err.message.unwrap_or_default(),
        });
    }
    let text: String = parsed
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    Ok(if text.is_empty() { None } else { Some(text) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::{HeaderMap, StatusCode}, response::IntoResponse, routing::post};
    use futures::stream;

    fn event(text: &str) -> String {
        format!("data: {}\r\n\r\n", serde_json::json!({"candidates": [{"content": {"parts": [{"text": text}], "role": "model"}}]}))
    }

    fn request(turns: Vec<Turn>) -> ModelRequest {
        ModelRequest {
            model: "gemini-test".into(),
            system_instruction: "persona".into(),
            turns,
            params: ModelParams::default(),
        }
    }

    async fn collect_all(s: ChunkStream) -> Vec<Result<String, ChatError>> {
        s.collect().await
    }

    #[tokio::test]
    async fn sse_events_split_across_reads_are_reassembled() {
        let body = format!("{}{}{}", event("[[VUI]] Chào"), event(" tiểu hữu"), "data: {\"candidates\":[{\"finishReason\":\"STOP\"}]}\r\n\r\n");
        // split every 7 bytes, cutting through multi-byte characters
        let pieces: Vec<Result<Vec<u8>, ChatError>> = body.as_bytes().chunks(7).map(|c| Ok(c.to_vec())).collect();
        let out = collect_all(parse_sse_stream(stream::iter(pieces))).await;
        let texts: Vec<String> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, ["[[VUI]] Chào", " tiểu hữu"]);
    }

    #[tokio::test]
    async fn trailing_event_without_blank_line_is_delivered() {
        let body = event("xin chào");
        let body = body.trim_end().to_string();
        let out = collect_all(parse_sse_stream(stream::iter(vec![Ok::<_, ChatError>(body.into_bytes())]))).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), "xin chào");
    }

    #[tokio::test]
    async fn transport_failure_mid_stream_keeps_earlier_chunks() {
        let pieces = vec![
            Ok(event("một").into_bytes()),
            Err(ChatError::Stream("socket closed".into())),
            Ok(event("hai").into_bytes()),
        ];
        let out = collect_all(parse_sse_stream(stream::iter(pieces))).await;
        assert_eq!(out[0].as_ref().unwrap(), "một");
        assert!(matches!(out[1], Err(ChatError::Stream(_))));
    }

    #[tokio::test]
    async fn in_stream_error_event_becomes_remote_error() {
        let body = "data: {\"error\":{\"code\":503,\"message\":\"overloaded\",\"status\":\"UNAVAILABLE\"}}\n\n";
        let out = collect_all(parse_sse_stream(stream::iter(vec![Ok::<_, ChatError>(body.as_bytes().to_vec())]))).await;
        let err = out.into_iter().next().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "HTTP 503 UNAVAILABLE: overloaded");
    }

    #[test]
    fn request_body_uses_gemini_field_names() {
        let req = request(vec![Turn::user("hỏi"), Turn::model("đáp"), Turn::user("nữa")]);
        let v = serde_json::to_value(GenerateContentRequest::from_request(&req)).unwrap();
        assert_eq!(v["contents"][1]["role"], "model");
        assert_eq!(v["contents"][2]["parts"][0]["text"], "nữa");
        assert_eq!(v["systemInstruction"]["parts"][0]["text"], "persona");
        assert_eq!(v["generationConfig"]["topK"], 40);
        assert!((v["generationConfig"]["temperature"].as_f64().unwrap() - 1.2).abs() < 1e-6);
    }

    async fn spawn_fake_gemini(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/v1beta", addr)
    }

    #[tokio::test]
    async fn gemini_client_streams_from_local_server() {
        async fn handler(headers: HeaderMap, Json(body): Json<serde_json::Value>) -> impl IntoResponse {
            assert_eq!(headers.get("x-goog-api-key").unwrap(), "AIzaLocalTestKey123456");
            assert_eq!(body["contents"][0]["parts"][0]["text"], "Xin chào");
            let sse = format!("{}{}", event("[[VUI]] Chào"), event(" tiểu hữu"));
            ([("content-type", "text/event-stream")], sse)
        }
        let base = spawn_fake_gemini(Router::new().route("/v1beta/models/:call", post(handler))).await;
        let client = GeminiConnector { base_url: base }.connect("AIzaLocalTestKey123456");
        let stream = client.stream_generate(request(vec![Turn::user("Xin chào")])).await.unwrap();
        let text: String = collect_all(stream).await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(text, "[[VUI]] Chào tiểu hữu");
    }

    #[tokio::test]
    async fn gemini_client_maps_error_body() {
        async fn handler() -> impl IntoResponse {
            let body = serde_json::json!({"error": {"code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT"}});
            (StatusCode::BAD_REQUEST, Json(body))
        }
        let base = spawn_fake_gemini(Router::new().route("/v1beta/models/:call", post(handler))).await;
        let client = GeminiClient::new(base, "AIzaBadKey");
        let err = match client.stream_generate(request(vec![Turn::user("hi")])).await {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert_eq!(err.to_string(), "HTTP 400 INVALID_ARGUMENT: API key not valid. Please pass a valid API key.");
    }
}
