//! Voice clone: reference upload and text-to-speech
//!
//! Synthesis is asynchronous on the backend: create a task, poll it under a
//! [`RetryPolicy`] until audio is ready, then download the audio.

use crate::api::{
    content_type_of, error_message, tts_status, ApiClient, ReferenceUploadResponse,
    ReferenceVoice, TtsCreateRequest, TtsCreateResponse, TtsResultResponse,
};
use crate::config::ClientConfig;
use crate::resilience::{poll_until, PollStatus, RetryPolicy};
use crate::session::SessionContext;
use crate::{Result, TreeholeError};
use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Path for reference voice uploads
pub const REFERENCE_UPLOAD_PATH: &str = "/api/voice_clone/reference/upload";
/// Path to create a synthesis task
pub const TTS_CREATE_PATH: &str = "/api/voice_clone/tts/create";
/// Path to query a synthesis task
pub const TTS_RESULT_PATH: &str = "/api/voice_clone/tts/result";
/// Path to download synthesized audio
pub const TTS_AUDIO_PATH: &str = "/api/voice_clone/tts/audio";

/// Reported when synthesis does not finish within the poll timeout
pub const SLOW_GENERATION: &str = "generation is slow, please try again later";

const SYNTHESIS_FAILED: &str = "voice synthesis failed";

/// Options for one synthesis request
#[derive(Debug, Clone, Default)]
pub struct TtsOptions {
    /// Playback speed, sent only when finite
    pub speed: Option<f64>,
    /// Provider-specific extras
    pub ext: HashMap<String, serde_json::Value>,
    /// Polling schedule; the default matches the backend's pacing
    pub policy: RetryPolicy,
}

impl TtsOptions {
    /// Default options with the configured polling deadline
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            policy: RetryPolicy::default().with_timeout(config.tts_poll_timeout),
            ..Self::default()
        }
    }
}

/// Downloaded audio
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    /// Where the backend stored the audio
    pub voice_url: String,
    /// Declared content type
    pub content_type: String,
    /// Audio bytes
    pub data: Bytes,
}

/// Whether a content type is acceptable as audio
pub fn is_audio_content_type(content_type: &str) -> bool {
    let ct = content_type.trim().to_ascii_lowercase();
    ct.starts_with("audio/") || ct == "application/octet-stream"
}

/// Interpret one poll of a synthesis task
pub fn classify_result(result: &TtsResultResponse) -> Result<PollStatus<String>> {
    match (result.status, result.voice_url.as_deref()) {
        (Some(tts_status::DONE), Some(url)) if !url.is_empty() => {
            Ok(PollStatus::Ready(url.to_string()))
        }
        (Some(tts_status::FAILED), _) => Err(TreeholeError::voice(SYNTHESIS_FAILED)),
        _ => Ok(PollStatus::Pending),
    }
}

/// Error envelopes from the synthesis endpoints are voice errors
fn voice_failure(err: TreeholeError) -> TreeholeError {
    match err {
        TreeholeError::RequestFailed(msg) => TreeholeError::Voice(msg),
        other => other,
    }
}

/// Upload a reference recording the cloned voice will be based on
pub async fn upload_reference(
    api: &ApiClient,
    ctx: &SessionContext,
    path: &Path,
    name: &str,
    describe: &str,
) -> Result<ReferenceVoice> {
    let identity = ctx.identity()?;
    let bytes = tokio::fs::read(path).await?;
    if bytes.is_empty() {
        return Err(TreeholeError::validation("reference audio file is empty"));
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("reference_audio")
        .to_string();

    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name(file_name)
        .mime_str("application/octet-stream")?;
    let form = reqwest::multipart::Form::new()
        .part("file", part)
        .text("name", name.to_string())
        .text("describe", describe.to_string())
        .text("user_id", identity.as_str().to_string());

    let response: ReferenceUploadResponse = api.post_multipart(REFERENCE_UPLOAD_PATH, form).await?;
    let voice = response
        .data
        .ok_or_else(|| TreeholeError::voice("upload returned no audio id"))?;
    info!(audio_id = %voice.audio_id, "Reference voice stored");
    Ok(voice)
}

/// Synthesize `text` in the user's cloned voice
pub async fn synthesize(
    api: &ApiClient,
    ctx: &SessionContext,
    text: &str,
    options: &TtsOptions,
) -> Result<SynthesizedAudio> {
    let identity = ctx.identity()?;
    let text = text.trim();
    if text.is_empty() {
        return Err(TreeholeError::validation("nothing to synthesize"));
    }

    let create = TtsCreateRequest {
        user_id: identity.as_str().to_string(),
        text: text.to_string(),
        ext: options.ext.clone(),
        speed: options.speed.filter(|s| s.is_finite()),
    };
    let created: TtsCreateResponse = api
        .post_json(TTS_CREATE_PATH, &create)
        .await
        .map_err(voice_failure)?;
    let task_id = match created.task_id.filter(|t| !t.is_empty()) {
        Some(id) if created.ok => id,
        _ => {
            return Err(TreeholeError::voice(
                created.msg.unwrap_or_else(|| SYNTHESIS_FAILED.to_string()),
            ))
        }
    };
    debug!(%task_id, "Synthesis task created");

    let voice_url = poll_until(&options.policy, SLOW_GENERATION, |attempt| {
        let query = [("user_id", identity.as_str()), ("taskId", task_id.as_str())];
        async move {
            let result: TtsResultResponse = api
                .get_json(TTS_RESULT_PATH, &query)
                .await
                .map_err(voice_failure)?;
            debug!(attempt, status = ?result.status, "Synthesis poll");
            classify_result(&result)
        }
    })
    .await?;

    fetch_audio(api, &voice_url).await
}

/// Download synthesized audio, rejecting non-audio payloads
pub async fn fetch_audio(api: &ApiClient, voice_url: &str) -> Result<SynthesizedAudio> {
    let resp = api
        .get_raw(TTS_AUDIO_PATH, &[("voiceUrl", voice_url)])
        .await?;
    let status = resp.status();
    let content_type = content_type_of(&resp);
    let body = resp.bytes().await?;

    if !status.is_success() {
        return Err(TreeholeError::voice(error_message(&content_type, &body)));
    }
    if !is_audio_content_type(&content_type) {
        return Err(TreeholeError::voice(error_message(&content_type, &body)));
    }

    info!(bytes = body.len(), %content_type, "Synthesized audio downloaded");
    Ok(SynthesizedAudio {
        voice_url: voice_url.to_string(),
        content_type,
        data: body,
    })
}
