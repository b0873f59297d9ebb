//! Wire types for the Treehole backend
//!
//! Field names follow the backend's JSON. Aliases cover the older spellings
//! some endpoints still return.

use crate::transcript::ChatTurn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Body of `POST /chat_stream`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatStreamRequest {
    /// Sender identity
    pub user_id: String,

    /// Trimmed user utterance
    pub user_input: String,

    /// Round identifier shared with emotion analysis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_id: Option<String>,

    /// Character the conversation is scoped to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_id: Option<String>,
}

/// Response of `GET /load_history`
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryResponse {
    /// Success flag
    #[serde(default)]
    pub ok: bool,

    /// Stored turns, oldest first
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

/// Profile record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Identity, when the backend nests it in the profile
    #[serde(default, alias = "user_id", skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    /// Name shown in the transcript
    #[serde(default, alias = "username")]
    pub display_name: String,

    /// Avatar location
    #[serde(default)]
    pub avatar_url: String,
}

/// Response of `GET /profile` and `POST /profile`
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileEnvelope {
    /// Success flag
    #[serde(default)]
    pub ok: bool,

    /// Identity, when the backend returns it beside the profile
    #[serde(default)]
    pub user_id: Option<String>,

    /// Profile record
    #[serde(default)]
    pub profile: Option<Profile>,
}

/// Body of `POST /profile`
#[derive(Debug, Clone, Serialize)]
pub struct ProfileUpdate {
    /// New display name
    pub display_name: String,
}

/// Response of `POST /avatar_upload`
#[derive(Debug, Clone, Deserialize)]
pub struct AvatarUploadResponse {
    /// Cache-busted avatar location
    #[serde(default)]
    pub avatar_url: String,
}

/// Body of `POST /api/emotion`
#[derive(Debug, Clone, Serialize)]
pub struct EmotionRequest {
    /// Sender identity
    pub user_id: String,

    /// Prior turns for context
    pub history: Vec<ChatTurn>,

    /// Latest user utterance
    pub current_input: String,

    /// Round the analysis belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_id: Option<String>,
}

/// Response of `POST /api/emotion`
#[derive(Debug, Clone, Deserialize)]
pub struct EmotionResponse {
    /// Success flag
    #[serde(default)]
    pub ok: bool,

    /// Analyzer output, shape owned by the backend
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Body of `POST /api/voice_clone/tts/create`
#[derive(Debug, Clone, Serialize)]
pub struct TtsCreateRequest {
    /// Owner of the cloned voice
    pub user_id: String,

    /// Text to speak
    pub text: String,

    /// Provider-specific extras
    pub ext: HashMap<String, serde_json::Value>,

    /// Playback speed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

/// Response of `POST /api/voice_clone/tts/create`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsCreateResponse {
    /// Success flag
    #[serde(default)]
    pub ok: bool,

    /// Task to poll
    #[serde(default, alias = "task_id")]
    pub task_id: Option<String>,

    /// Error message
    #[serde(default)]
    pub msg: Option<String>,
}

/// Synthesis task status codes
pub mod tts_status {
    /// Still generating
    pub const PENDING: i64 = 1;
    /// Audio ready
    pub const DONE: i64 = 2;
    /// Generation failed
    pub const FAILED: i64 = 3;
}

/// Response of `GET /api/voice_clone/tts/result`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsResultResponse {
    /// Success flag
    #[serde(default)]
    pub ok: bool,

    /// One of [`tts_status`]
    #[serde(default)]
    pub status: Option<i64>,

    /// Audio location once done
    #[serde(default, alias = "voice_url")]
    pub voice_url: Option<String>,

    /// Error message
    #[serde(default)]
    pub msg: Option<String>,
}

/// Stored reference voice
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceVoice {
    /// Provider-side audio id used for later synthesis
    #[serde(alias = "audio_id")]
    pub audio_id: String,

    /// Name given at upload
    #[serde(default)]
    pub name: String,

    /// Free-form description
    #[serde(default)]
    pub describe: String,
}

/// Response of `POST /api/voice_clone/reference/upload`
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceUploadResponse {
    /// Success flag
    #[serde(default)]
    pub ok: bool,

    /// Stored reference
    pub data: Option<ReferenceVoice>,
}

/// One record for `POST /api/client_log`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientLogRecord {
    /// `debug`, `info`, `warn` or `error`
    pub level: String,

    /// Sanitized message
    pub message: String,

    /// Where the record came from
    pub page: String,

    /// Current identity, if any
    pub user_id: Option<String>,

    /// Current character, if any
    pub character_id: Option<String>,

    /// Extra structured context
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}
