//! Emotion analysis for a chat round

use crate::api::{ApiClient, EmotionRequest, EmotionResponse};
use crate::session::SessionContext;
use crate::transcript::ChatTurn;
use crate::{Result, TreeholeError};
use tracing::debug;

/// Path of the emotion endpoint
pub const EMOTION_PATH: &str = "/api/emotion";

/// The backend keeps at most this many turns of context
pub const MAX_HISTORY_TURNS: usize = 20;

/// Ask the backend to analyze the user's latest utterance
///
/// Every failure after the identity check collapses into
/// [`TreeholeError::EmotionUnavailable`]; callers treat the analysis as optional.
pub async fn analyze_emotion(
    api: &ApiClient,
    ctx: &SessionContext,
    history: &[ChatTurn],
    current_input: &str,
    round_id: Option<&str>,
) -> Result<serde_json::Value> {
    let identity = ctx.identity()?;
    let start = history.len().saturating_sub(MAX_HISTORY_TURNS);
    let request = EmotionRequest {
        user_id: identity.as_str().to_string(),
        history: history[start..].to_vec(),
        current_input: current_input.trim().to_string(),
        round_id: round_id.map(str::to_string),
    };

    let response: EmotionResponse = match api.post_json(EMOTION_PATH, &request).await {
        Ok(r) => r,
        Err(e) => {
            debug!(error = %e, "Emotion analysis failed");
            return Err(TreeholeError::EmotionUnavailable);
        }
    };

    match response.data {
        Some(data) if response.ok && !data.is_null() => Ok(data),
        _ => Err(TreeholeError::EmotionUnavailable),
    }
}
