//! # Gemini Provider
//!
//! Google Gemini through the `gemini-rust` client.

use super::stream::{into_events, until_cancelled, ActiveRequest, ChunkStream, Reply};
use super::{analysis_text, required, AiProvider, ProviderInfo, ResponseStream, SettingDescriptor};
use crate::config::ProviderSettings;
use crate::error::{AppError, Result};
use crate::image_processing::{EncodedImage, ImageProcessor};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use gemini_rust::{
    Blob, Content, Gemini, GenerationConfig, GenerationResponse, Message, Part, Role,
};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::debug;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";

const TEMPERATURE: f32 = 0.5;
const MAX_OUTPUT_TOKENS: i32 = 1000;

pub(crate) static INFO: ProviderInfo = ProviderInfo {
    name: "gemini",
    display_name: "Gemini (Recommended)",
    description: "Gemini has a free tier available. An API key is needed to connect to Gemini on \
                  your behalf. With the free tier, Google may anonymize and store the text and \
                  images you send for Gemini's improvement.",
    key_url: "https://aistudio.google.com/app/apikey",
    settings: &[
        SettingDescriptor {
            name: "api_key",
            display_name: "API Key",
            default_value: "",
            description: "Paste your Gemini API key here",
        },
        SettingDescriptor {
            name: "model",
            display_name: "Model",
            default_value: "gemini-flash-latest",
            description: "Eg. gemini-2.5-pro",
        },
    ],
};

/// Gemini API provider.
pub struct GeminiProvider {
    base_url: String,
    client: RwLock<Option<Arc<Gemini>>>,
    active: ActiveRequest,
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            client: RwLock::new(None),
            active: ActiveRequest::default(),
        }
    }
}

impl GeminiProvider {
    /// Creates an unconfigured provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an unconfigured provider that talks to another API root.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            base_url,
            ..Self::default()
        }
    }

    fn client(&self) -> Result<Arc<Gemini>> {
        self.client
            .read()
            .map_err(|_| AppError::config("Gemini client lock poisoned"))?
            .clone()
            .ok_or(AppError::NotConfigured(INFO.name))
    }

    async fn request(&self, system_instruction: &str, prompt: &str, streaming: bool) -> Result<Reply> {
        let client = self.client()?;
        let message = user_message(vec![text_part(prompt)]);

        let mut request = client
            .generate_content()
            .with_messages(vec![message])
            .with_generation_config(generation_config());
        if !system_instruction.trim().is_empty() {
            request = request.with_system_prompt(system_instruction);
        }

        debug!(streaming, "Gemini text request");
        if !streaming {
            let response = request
                .execute()
                .await
                .map_err(|e| AppError::provider(format!("API request failed: {:?}", e)))?;
            check_blocked(&response)?;
            return Ok(Reply::Text(response_text(&response)));
        }

        let mut upstream = Box::pin(
            request
                .execute_stream()
                .await
                .map_err(|e| AppError::provider(format!("API request failed: {:?}", e)))?,
        );

        // Prompt feedback rides on the first chunk
        let head = match upstream.next().await {
            None => return Ok(Reply::Chunks(stream::empty().boxed())),
            Some(Err(e)) => return Err(AppError::provider(format!("Stream error: {:?}", e))),
            Some(Ok(response)) => {
                check_blocked(&response)?;
                response_text(&response)
            }
        };

        let rest = upstream.map(|item| {
            item.map_err(|e| AppError::provider(format!("Stream error: {:?}", e)))
                .and_then(|response| {
                    check_blocked(&response)?;
                    Ok(response_text(&response))
                })
        });

        let chunks: ChunkStream = stream::once(async move { Ok(head) })
            .chain(rest)
            .filter(|item| futures::future::ready(!matches!(item, Ok(text) if text.is_empty())))
            .boxed();
        Ok(Reply::Chunks(chunks))
    }

    async fn describe_image(&self, image: EncodedImage, prompt: &str) -> Result<String> {
        let client = self.client()?;

        let image_part = Part::InlineData {
            inline_data: Blob {
                mime_type: image.mime_type.to_string(),
                data: image.data,
            },
            media_resolution: None,
        };
        let message = user_message(vec![text_part(prompt), image_part]);

        let response = client
            .generate_content()
            .with_messages(vec![message])
            .with_generation_config(generation_config())
            .execute()
            .await
            .map_err(|e| AppError::provider(format!("API request failed: {:?}", e)))?;

        check_blocked(&response)?;
        let text = response_text(&response);
        if text.is_empty() {
            return Err(AppError::provider("No text response received from Gemini"));
        }
        Ok(text)
    }
}

#[async_trait]
impl AiProvider for GeminiProvider {
    fn info(&self) -> &'static ProviderInfo {
        &INFO
    }

    fn configure(&self, settings: &ProviderSettings) -> Result<()> {
        let mut slot = self
            .client
            .write()
            .map_err(|_| AppError::config("Gemini client lock poisoned"))?;
        *slot = None;

        let settings = INFO.resolve(settings);
        let api_key = required(&settings, &INFO, "api_key")?;

        // Explicit base URL avoids a BadScheme error from the client
        let base_url = url::Url::parse(&self.base_url)
            .map_err(|e| AppError::config(format!("Invalid base URL: {}", e)))?;
        let model_url = format!("{}{}", self.base_url, model_path(&settings["model"]));

        let client = Gemini::with_model_and_base_url(&api_key, model_url, base_url)
            .map_err(|e| AppError::config(format!("Failed to create Gemini client: {}", e)))?;

        *slot = Some(Arc::new(client));
        debug!(model = %settings["model"], "Gemini configured");
        Ok(())
    }

    async fn get_response(
        &self,
        system_instruction: &str,
        prompt: &str,
        streaming: bool,
    ) -> ResponseStream {
        let token = self.active.begin();
        into_events(self.request(system_instruction, prompt, streaming).await, token)
    }

    async fn analyze_image(&self, image_path: &Path, prompt: &str) -> String {
        let token = self.active.begin();
        let result = match ImageProcessor::encode_file(image_path) {
            Ok(image) => until_cancelled(&token, self.describe_image(image, prompt)).await,
            Err(e) => Err(e),
        };
        analysis_text(INFO.name, result)
    }

    fn cancel(&self) {
        self.active.cancel();
    }
}

fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

/// One low-temperature candidate with a bounded answer length.
fn generation_config() -> GenerationConfig {
    GenerationConfig {
        temperature: Some(TEMPERATURE),
        max_output_tokens: Some(MAX_OUTPUT_TOKENS),
        candidate_count: Some(1),
        ..Default::default()
    }
}

fn text_part(text: &str) -> Part {
    Part::Text {
        text: text.to_string(),
        thought: None,
        thought_signature: None,
    }
}

fn user_message(parts: Vec<Part>) -> Message {
    Message {
        role: Role::User,
        content: Content {
            role: Some(Role::User),
            parts: Some(parts),
        },
    }
}

fn check_blocked(response: &GenerationResponse) -> Result<()> {
    match response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_ref())
    {
        Some(reason) => Err(AppError::Blocked(format!("{:?}", reason))),
        None => Ok(()),
    }
}

/// Answer text of the first candidate, skipping thought parts.
fn response_text(response: &GenerationResponse) -> String {
    let Some(parts) = response
        .candidates
        .first()
        .and_then(|candidate| candidate.content.parts.as_ref())
    else {
        return String::new();
    };

    parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { text, thought, .. } if !thought.unwrap_or(false) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ProviderEvent, STREAM_ERROR_MESSAGE};
    use mockito::{Matcher, Server};
    use tempfile::TempDir;

    fn settings(pairs: &[(&str, &str)]) -> ProviderSettings {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn provider_for(server: &Server) -> GeminiProvider {
        let provider = GeminiProvider::with_base_url(server.url());
        provider
            .configure(&settings(&[("api_key", "g-test"), ("model", "test-model")]))
            .unwrap();
        provider
    }

    fn answer(parts: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "candidates": [{
                "content": {"parts": parts, "role": "model"},
                "finishReason": "STOP",
                "index": 0
            }]
        })
    }

    fn blocked() -> serde_json::Value {
        serde_json::json!({
            "candidates": [],
            "promptFeedback": {"blockReason": "SAFETY", "safetyRatings": []}
        })
    }

    fn sse(chunks: &[serde_json::Value]) -> String {
        chunks.iter().map(|chunk| format!("data: {}\r\n\r\n", chunk)).collect()
    }

    fn parse(value: serde_json::Value) -> GenerationResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_with_base_url_adds_trailing_slash() {
        assert_eq!(GeminiProvider::with_base_url("http://localhost:1").base_url, "http://localhost:1/");
        assert_eq!(GeminiProvider::new().base_url, BASE_URL);
    }

    #[test]
    fn test_response_text_skips_thoughts() {
        let response = parse(answer(serde_json::json!([
            {"text": "The sky "},
            {"text": "thinking...", "thought": true},
            {"text": "is blue."}
        ])));
        assert_eq!(response_text(&response), "The sky is blue.");
        assert!(check_blocked(&response).is_ok());
    }

    #[test]
    fn test_response_text_without_candidates_is_empty() {
        assert_eq!(response_text(&parse(serde_json::json!({"candidates": []}))), "");
    }

    #[test]
    fn test_block_reason_is_reported() {
        let err = check_blocked(&parse(blocked())).unwrap_err();
        match err {
            AppError::Blocked(reason) => assert!(reason.to_lowercase().contains("safety")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_generation_config_defaults() {
        let config = generation_config();
        assert_eq!(config.temperature, Some(0.5));
        assert_eq!(config.max_output_tokens, Some(1000));
        assert_eq!(config.candidate_count, Some(1));
    }

    #[tokio::test]
    async fn test_non_streaming_response() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Regex(r"test-model:generateContent".to_string()))
            .match_body(Matcher::PartialJson(serde_json::json!({
                "generationConfig": {"temperature": 0.5, "maxOutputTokens": 1000, "candidateCount": 1}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(answer(serde_json::json!([{"text": "Hello world\n\n"}])).to_string())
            .create_async()
            .await;

        let provider = provider_for(&server);
        let events: Vec<_> = provider.get_response("Be brief", "hi", false).await.collect().await;

        mock.assert_async().await;
        assert_eq!(
            events,
            vec![
                ProviderEvent::Fragment("Hello world".into()),
                ProviderEvent::Complete
            ]
        );
    }

    #[tokio::test]
    async fn test_streaming_response_skips_empty_chunks() {
        let mut server = Server::new_async().await;
        let body = sse(&[
            answer(serde_json::json!([{"text": "Hel"}])),
            answer(serde_json::json!([{"text": "", "thought": false}])),
            answer(serde_json::json!([{"text": "pondering", "thought": true}])),
            answer(serde_json::json!([{"text": "lo"}])),
        ]);
        let mock = server
            .mock("POST", Matcher::Regex(r"test-model:streamGenerateContent".to_string()))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let provider = provider_for(&server);
        let events: Vec<_> = provider.get_response("", "hi", true).await.collect().await;

        mock.assert_async().await;
        assert_eq!(
            events,
            vec![
                ProviderEvent::Fragment("Hel".into()),
                ProviderEvent::Fragment("lo".into()),
                ProviderEvent::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_blocked_prompt() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", Matcher::Regex(r"test-model:generateContent".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(blocked().to_string())
            .create_async()
            .await;

        let provider = provider_for(&server);
        let events: Vec<_> = provider.get_response("", "hi", false).await.collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ProviderEvent::Blocked(_)));
    }

    #[tokio::test]
    async fn test_blocked_stream_head() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", Matcher::Regex(r"test-model:streamGenerateContent".to_string()))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse(&[blocked()]))
            .create_async()
            .await;

        let provider = provider_for(&server);
        let events: Vec<_> = provider.get_response("", "hi", true).await.collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ProviderEvent::Blocked(_)));
    }

    #[tokio::test]
    async fn test_analyze_image_sends_inline_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shot.png");
        image::RgbaImage::new(2, 2).save(&path).unwrap();

        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Regex(r"test-model:generateContent".to_string()))
            .match_body(Matcher::Regex(r#""mimeType":\s*"image/png""#.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(answer(serde_json::json!([{"text": "A tiny square."}])).to_string())
            .create_async()
            .await;

        let provider = provider_for(&server);
        let text = provider.analyze_image(&path, "What is this?").await;

        mock.assert_async().await;
        assert_eq!(text, "A tiny square.");
    }

    #[tokio::test]
    async fn test_cancel_aborts_image_analysis() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shot.png");
        image::RgbaImage::new(2, 2).save(&path).unwrap();

        // Accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let provider = Arc::new(GeminiProvider::with_base_url(format!(
            "http://{}",
            listener.local_addr().unwrap()
        )));
        provider.configure(&settings(&[("api_key", "g-test")])).unwrap();

        let analysis = tokio::spawn({
            let provider = provider.clone();
            async move { provider.analyze_image(&path, "What is this?").await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        provider.cancel();

        let text = tokio::time::timeout(std::time::Duration::from_secs(5), analysis)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(text, "Error analyzing image: Request was cancelled");
        drop(listener);
    }

    #[test]
    fn test_model_path() {
        assert_eq!(model_path("gemini-flash-latest"), "models/gemini-flash-latest");
        assert_eq!(model_path("models/gemini-2.5-pro"), "models/gemini-2.5-pro");
    }

    #[test]
    fn test_configure_requires_key() {
        let provider = GeminiProvider::new();
        let err = provider.configure(&settings(&[("api_key", "  ")])).unwrap_err();
        assert!(err.to_string().contains("API Key"));
        assert!(matches!(provider.client(), Err(AppError::NotConfigured("gemini"))));
    }

    #[test]
    fn test_configure_can_be_repeated() {
        let provider = GeminiProvider::new();
        provider.configure(&settings(&[("api_key", "k1")])).unwrap();
        provider
            .configure(&settings(&[("api_key", "k2"), ("model", "gemini-2.5-pro")]))
            .unwrap();
        assert!(provider.client().is_ok());
    }

    #[test]
    fn test_failed_reconfigure_tears_down_client() {
        let provider = GeminiProvider::new();
        provider.configure(&settings(&[("api_key", "k1")])).unwrap();
        assert!(provider.configure(&settings(&[])).is_err());
        assert!(provider.client().is_err());
    }

    #[tokio::test]
    async fn test_unconfigured_text_request_is_error_fragment() {
        let provider = GeminiProvider::new();
        let events: Vec<_> = provider.get_response("", "hi", true).await.collect().await;
        assert_eq!(
            events,
            vec![
                ProviderEvent::Fragment(STREAM_ERROR_MESSAGE.into()),
                ProviderEvent::Complete
            ]
        );
    }

    #[tokio::test]
    async fn test_analyze_unreadable_file_returns_error_text() {
        let provider = GeminiProvider::new();
        provider.configure(&settings(&[("api_key", "k1")])).unwrap();
        let text = provider
            .analyze_image(Path::new("/definitely/missing.png"), "What is this?")
            .await;
        assert!(text.starts_with("Error analyzing image:"));
    }
}
