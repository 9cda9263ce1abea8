//! # OpenAI-Compatible Provider
//!
//! Any endpoint speaking the OpenAI chat-completions protocol: OpenAI itself,
//! Mistral, locally hosted llama.cpp / vLLM / KoboldCPP servers, and so on.

use super::stream::{into_events, until_cancelled, ActiveRequest, ChunkStream, Reply};
use super::{analysis_text, required, AiProvider, ProviderInfo, ResponseStream, SettingDescriptor};
use crate::config::ProviderSettings;
use crate::error::{AppError, Result};
use crate::image_processing::{EncodedImage, ImageProcessor};
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::debug;

const TEMPERATURE: f32 = 0.5;
const IMAGE_MAX_TOKENS: u32 = 500;
const CONTENT_FILTER: &str = "content_filter";

pub(crate) static INFO: ProviderInfo = ProviderInfo {
    name: "openai",
    display_name: "OpenAI Compatible (For Experts)",
    description: "Connect to any OpenAI-compatible API, such as OpenAI, Mistral AI, or locally \
                  hosted models via llama.cpp, KoboldCPP, TabbyAPI, vLLM, etc. You must adhere to \
                  the connected service's terms, and your data is processed per its privacy policy.",
    key_url: "https://platform.openai.com/account/api-keys",
    settings: &[
        SettingDescriptor {
            name: "api_key",
            display_name: "API Key",
            default_value: "",
            description: "API key for the OpenAI-compatible API.",
        },
        SettingDescriptor {
            name: "api_base",
            display_name: "API Base URL",
            default_value: "https://api.openai.com/v1",
            description: "Eg. https://api.openai.com/v1",
        },
        SettingDescriptor {
            name: "api_organisation",
            display_name: "API Organisation",
            default_value: "",
            description: "Leave blank if not applicable.",
        },
        SettingDescriptor {
            name: "api_project",
            display_name: "API Project",
            default_value: "",
            description: "Leave blank if not applicable.",
        },
        SettingDescriptor {
            name: "api_model",
            display_name: "API Model",
            default_value: "gpt-4o-mini",
            description: "Eg. gpt-4o-mini",
        },
    ],
};

/// A configured connection to one endpoint.
#[derive(Debug)]
struct Endpoint {
    http: Client,
    base_url: String,
    api_key: String,
    organisation: Option<String>,
    project: Option<String>,
    model: String,
}

impl Endpoint {
    async fn post(&self, body: &ChatRequest) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, model = %body.model, stream = body.stream, "OpenAI chat request");

        let mut request = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body);
        if let Some(org) = &self.organisation {
            request = request.header("OpenAI-Organization", org);
        }
        if let Some(project) = &self.project {
            request = request.header("OpenAI-Project", project);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status.as_u16() == 429 {
            return Err(AppError::RateLimited);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AppError::provider(format!("{}: {}", status, body)))
    }
}

/// OpenAI-compatible API provider.
#[derive(Default)]
pub struct OpenAiProvider {
    endpoint: RwLock<Option<Arc<Endpoint>>>,
    active: ActiveRequest,
}

impl OpenAiProvider {
    /// Creates an unconfigured provider.
    pub fn new() -> Self {
        Self::default()
    }

    fn endpoint(&self) -> Result<Arc<Endpoint>> {
        self.endpoint
            .read()
            .map_err(|_| AppError::config("OpenAI client lock poisoned"))?
            .clone()
            .ok_or(AppError::NotConfigured(INFO.name))
    }

    async fn request(&self, system_instruction: &str, prompt: &str, streaming: bool) -> Result<Reply> {
        let endpoint = self.endpoint()?;
        let body = ChatRequest {
            model: endpoint.model.clone(),
            messages: vec![
                ChatMessage::text("system", system_instruction),
                ChatMessage::text("user", prompt),
            ],
            temperature: Some(TEMPERATURE),
            max_tokens: None,
            stream: streaming,
        };

        let response = endpoint.post(&body).await?;
        if streaming {
            Ok(Reply::Chunks(sse_chunks(response.bytes_stream())))
        } else {
            let completion: ChatResponse = response.json().await?;
            Ok(Reply::Text(completion.into_text()?))
        }
    }

    async fn describe_image(&self, image: EncodedImage, prompt: &str) -> Result<String> {
        let endpoint = self.endpoint()?;
        let body = ChatRequest {
            model: endpoint.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: MessageContent::Parts(vec![
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image.data_url(),
                        },
                    },
                ]),
            }],
            temperature: None,
            max_tokens: Some(IMAGE_MAX_TOKENS),
            stream: false,
        };

        let completion: ChatResponse = endpoint.post(&body).await?.json().await?;
        completion.into_text()
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn info(&self) -> &'static ProviderInfo {
        &INFO
    }

    fn configure(&self, settings: &ProviderSettings) -> Result<()> {
        let mut slot = self
            .endpoint
            .write()
            .map_err(|_| AppError::config("OpenAI client lock poisoned"))?;
        *slot = None;

        let settings = INFO.resolve(settings);
        let api_key = required(&settings, &INFO, "api_key")?;
        let base_url = settings["api_base"].trim_end_matches('/').to_string();
        url::Url::parse(&base_url)
            .map_err(|e| AppError::config(format!("Invalid API Base URL '{}': {}", base_url, e)))?;

        let optional = |name: &str| Some(settings[name].clone()).filter(|v| !v.is_empty());

        *slot = Some(Arc::new(Endpoint {
            http: Client::new(),
            base_url,
            api_key,
            organisation: optional("api_organisation"),
            project: optional("api_project"),
            model: settings["api_model"].clone(),
        }));
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

// Server-sent events

/// One complete `data:` line of an event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SseEvent {
    Data(String),
    Done,
}

/// Splits a byte stream into SSE data lines, across arbitrary chunk borders.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim_start();
            if data == "[DONE]" {
                events.push(SseEvent::Done);
            } else if !data.is_empty() {
                events.push(SseEvent::Data(data.to_string()));
            }
        }
        events
    }
}

/// Text carried by one streamed completion chunk, if any.
fn parse_delta(data: &str) -> Option<Result<String>> {
    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => return Some(Err(e.into())),
    };
    let choice = chunk.choices.into_iter().next()?;
    if choice.finish_reason.as_deref() == Some(CONTENT_FILTER) {
        return Some(Err(AppError::Blocked(CONTENT_FILTER.to_string())));
    }
    choice
        .delta
        .content
        .filter(|text| !text.is_empty())
        .map(Ok)
}

struct SseState<S> {
    bytes: S,
    decoder: SseDecoder,
    pending: VecDeque<Result<String>>,
    finished: bool,
}

fn sse_chunks<S, B>(bytes: S) -> ChunkStream
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = SseState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    for event in st.decoder.push(chunk.as_ref()) {
                        match event {
                            SseEvent::Data(data) => st.pending.extend(parse_delta(&data)),
                            SseEvent::Done => {
                                st.finished = true;
                                break;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    st.pending.push_back(Err(e.into()));
                }
                None => st.finished = true,
            }
        }
    })
    .boxed()
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

impl ChatMessage {
    fn text(role: &'static str, text: &str) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl ChatResponse {
    fn into_text(self) -> Result<String> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::provider("No choices in response"))?;
        if choice.finish_reason.as_deref() == Some(CONTENT_FILTER) {
            return Err(AppError::Blocked(CONTENT_FILTER.to_string()));
        }
        Ok(choice.message.content.unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}
