//! Explicit per-user session context

use crate::api::Profile;
use crate::favorability::Favorability;
use crate::identity::Identity;
use crate::Result;

/// Avatar shown when a profile has none
pub const DEFAULT_AVATAR_URL: &str = "/static/avatars/default.svg";

/// Who is chatting, and with which character
///
/// Passed to every operation that needs the current user instead of living in
/// global state. The identity is kept as received so that an invalid one is
/// rejected at the point of use, before any request goes out.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    /// Identity as issued by the backend
    pub user_id: String,
    /// Name shown in the transcript
    pub display_name: String,
    /// Avatar location
    pub avatar_url: String,
    /// Character scope for chat and history
    pub character_id: Option<String>,
    /// Relationship score with the character
    pub favorability: Favorability,
}

impl SessionContext {
    /// Context for a raw identity with default presentation
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into().trim().to_string(),
            display_name: String::new(),
            avatar_url: DEFAULT_AVATAR_URL.to_string(),
            character_id: None,
            favorability: Favorability::default(),
        }
    }

    /// Build from a validated identity and its profile
    pub fn from_profile(identity: &Identity, profile: &Profile) -> Self {
        let mut ctx = Self::new(identity.as_str());
        ctx.apply_profile(profile);
        ctx
    }

    /// Scope the session to a character
    pub fn with_character(mut self, character_id: Option<String>) -> Self {
        self.character_id = character_id.filter(|c| !c.trim().is_empty());
        self
    }

    /// Take display name and avatar from a profile, keeping defaults for blanks
    pub fn apply_profile(&mut self, profile: &Profile) {
        self.display_name = profile.display_name.trim().to_string();
        self.avatar_url = if profile.avatar_url.trim().is_empty() {
            DEFAULT_AVATAR_URL.to_string()
        } else {
            profile.avatar_url.clone()
        };
    }

    /// Validated identity
    pub fn identity(&self) -> Result<Identity> {
        Identity::parse(&self.user_id)
    }

    /// Name to show: display name, else the identity's short label
    pub fn display_label(&self) -> String {
        if !self.display_name.is_empty() {
            return self.display_name.clone();
        }
        match self.identity() {
            Ok(id) => id.short_label().to_string(),
            Err(_) => "user".to_string(),
        }
    }
}
