//! Conversation history restore

use crate::api::{ApiClient, HistoryResponse};
use crate::session::SessionContext;
use crate::transcript::ChatTurn;
use crate::Result;
use tracing::debug;

/// Path of the history endpoint
pub const HISTORY_PATH: &str = "/load_history";

/// Fetch stored turns for the session's identity and character
///
/// The identity is validated before any request is made.
pub async fn load_history(api: &ApiClient, ctx: &SessionContext) -> Result<Vec<ChatTurn>> {
    let identity = ctx.identity()?;
    let mut query = vec![("user_id", identity.as_str())];
    if let Some(character) = ctx.character_id.as_deref() {
        query.push(("character_id", character));
    }

    let response: HistoryResponse = api.get_json(HISTORY_PATH, &query).await?;
    debug!(turns = response.history.len(), "History loaded");
    Ok(response.history)
}
