use serde::{Deserialize, Serialize};
use std::fmt;
use wzrd_types::voice::GeminiVoice;

fn default_token_ttl_seconds() -> u64 {
    3600
}

/// LiveKit server credentials. An empty `url` disables room management.
#[derive(Clone, Serialize, Deserialize)]
pub struct LiveKitConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing)]
    pub api_secret: String,
    /// Lifetime of minted join tokens. Default: 3600 (1 hour).
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
}

impl Default for LiveKitConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            token_ttl_seconds: default_token_ttl_seconds(),
        }
    }
}

impl fmt::Debug for LiveKitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveKitConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .finish()
    }
}

impl LiveKitConfig {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            token_ttl_seconds: default_token_ttl_seconds(),
        }
    }
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_true() -> bool {
    true
}

/// Multimodal live model settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub voice_id: GeminiVoice,
    /// Ask the model to transcribe what the user says.
    #[serde(default = "default_true")]
    pub transcribe_user_audio: bool,
    /// Emit text transcripts of what the bot says.
    #[serde(default = "default_true")]
    pub transcribe_model_audio: bool,
    /// Respond as soon as the context is set, before the user speaks.
    #[serde(default)]
    pub inference_on_context_initialization: bool,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_gemini_model(),
            base_url: default_gemini_base_url(),
            voice_id: GeminiVoice::Aoede,
            transcribe_user_audio: true,
            transcribe_model_audio: true,
            inference_on_context_initialization: false,
        }
    }
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("voice_id", &self.voice_id)
            .field("transcribe_user_audio", &self.transcribe_user_audio)
            .field("transcribe_model_audio", &self.transcribe_model_audio)
            .field(
                "inference_on_context_initialization",
                &self.inference_on_context_initialization,
            )
            .finish()
    }
}
