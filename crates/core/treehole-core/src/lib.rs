//! Treehole Chat Client Core
//!
//! Client-side runtime for the Treehole companion chat backend:
//!
//! - Streaming chat turns with an optimistic user turn and typed failure modes
//! - Centralised identity validation
//! - Session context, history restore, profile and avatar management
//! - Emotion analysis and voice clone synthesis over the REST API
//! - Retry policies for polling long-running backend jobs
//! - Structured logging with an optional client log relay
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use treehole_core::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ClientConfig::from_env()?;
//!     let api = ApiClient::new(&config)?;
//!     let ctx = start_session(&api, config.character_id.clone()).await?;
//!
//!     let mut chat = ChatSession::new(Arc::new(api));
//!     let outcome = chat.send_turn(&ctx, "hi", &CancellationToken::new()).await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod api;
pub mod chat;
pub mod config;
pub mod emotion;
pub mod error;
pub mod favorability;
pub mod history;
pub mod identity;
pub mod profile;
pub mod resilience;
pub mod session;
pub mod streaming;
pub mod testing;
pub mod transcript;
pub mod utils;
pub mod voice;

// Re-export main types
pub use api::{ApiClient, ChatTransport, StreamResponse};
pub use chat::{ChatSession, TurnEvent, TurnOutcome, TurnState};
pub use config::{
    get_env_bool, get_env_int, get_env_opt, get_env_or, load_env, load_env_from_path,
    ClientConfig,
};
pub use emotion::analyze_emotion;
pub use error::{Result, TreeholeError, NETWORK_UNAVAILABLE, SERVICE_UNAVAILABLE};
pub use favorability::{Favorability, FavorabilityBand, FavorabilityStore};
pub use history::load_history;
pub use identity::{is_valid_identity, Identity};
pub use profile::{fetch_profile, start_session, update_display_name, upload_avatar};
pub use resilience::{poll_until, Growth, PollStatus, RetryPolicy};
pub use session::SessionContext;
pub use streaming::{FragmentStream, Utf8StreamDecoder};
pub use transcript::{ChatTurn, Role, Transcript};
pub use utils::logger::{init_logging, Logger};
pub use voice::{synthesize, upload_reference, SynthesizedAudio, TtsOptions};
