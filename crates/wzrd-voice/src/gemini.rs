//! Gemini REST backend.

use crate::config::GeminiConfig;
use crate::error::VoiceError;
use crate::frame::AudioChunk;
use crate::llm::{LlmBackend, LlmReply, LlmRequest};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use wzrd_types::{Role, Tools};

const API_KEY_HEADER: &str = "x-goog-api-key";

const TRANSCRIBE_INSTRUCTION: &str =
    "Transcribe the speech in this audio exactly. Reply with the transcript only.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDeclarations>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

fn text_part(text: impl Into<String>) -> Part {
    Part {
        text: Some(text.into()),
        ..Default::default()
    }
}

/// Client for the `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: GeminiConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<String, VoiceError> {
        if self.config.api_key.is_empty() {
            return Err(VoiceError::Config("gemini api_key is not set".to_string()));
        }

        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| VoiceError::Llm(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "gemini request rejected");
            return Err(VoiceError::Llm(format!(
                "gemini returned {}: {body}",
                status.as_u16()
            )));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::Llm(format!("invalid response body: {e}")))?;
        Ok(response_text(body))
    }
}

fn build_request(request: &LlmRequest) -> GenerateContentRequest {
    let mut system = Vec::new();
    let mut contents = Vec::new();

    for message in &request.messages {
        let role = match message.role {
            Role::System => {
                system.push(text_part(message.content.clone()));
                continue;
            }
            Role::User => "user",
            Role::Assistant => "model",
        };
        contents.push(Content {
            role: Some(role.to_string()),
            parts: vec![text_part(message.content.clone())],
        });
    }

    let tools = match &request.tools {
        Tools::List(declarations) if !declarations.is_empty() => vec![ToolDeclarations {
            function_declarations: declarations.clone(),
        }],
        _ => Vec::new(),
    };

    GenerateContentRequest {
        system_instruction: (!system.is_empty()).then(|| Content {
            role: None,
            parts: system,
        }),
        contents,
        tools,
    }
}

fn response_text(response: GenerateContentResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Wraps 16-bit mono PCM in a WAV container.
fn wav_bytes(audio: &AudioChunk) -> Vec<u8> {
    let data_len = audio.pcm.len() as u32;
    let byte_rate = audio.sample_rate * 2;

    let mut out = Vec::with_capacity(44 + audio.pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&audio.sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(&audio.pcm);
    out
}

#[async_trait]
impl LlmBackend for GeminiClient {
    async fn generate(&self, request: LlmRequest) -> Result<LlmReply, VoiceError> {
        let body = build_request(&request);
        debug!(
            model = %self.config.model,
            contents = body.contents.len(),
            "gemini generateContent"
        );
        let text = self.generate_content(&body).await?;
        Ok(LlmReply { text, audio: None })
    }

    async fn transcribe(&self, audio: &AudioChunk) -> Result<Option<String>, VoiceError> {
        let data = base64::engine::general_purpose::STANDARD.encode(wav_bytes(audio));
        let body = GenerateContentRequest {
            system_instruction: None,
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    text_part(TRANSCRIBE_INSTRUCTION),
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: "audio/wav".to_string(),
                            data,
                        }),
                    },
                ],
            }],
            tools: Vec::new(),
        };

        let text = self.generate_content(&body).await?;
        Ok((!text.trim().is_empty()).then_some(text))
    }
}
