//! Profile fetch, update and avatar upload

use crate::api::{ApiClient, AvatarUploadResponse, Profile, ProfileEnvelope, ProfileUpdate};
use crate::identity::Identity;
use crate::session::SessionContext;
use crate::{Result, TreeholeError};
use std::path::Path;
use tracing::{info, warn};

/// Path of the profile endpoint
pub const PROFILE_PATH: &str = "/profile";

/// Path of the avatar upload endpoint
pub const AVATAR_UPLOAD_PATH: &str = "/avatar_upload";

/// Fetch the signed-in user's profile and resolve their identity
///
/// The identity may be nested in the profile or sit beside it; either way it
/// must validate.
pub async fn fetch_profile(api: &ApiClient) -> Result<(Identity, Profile)> {
    let envelope: ProfileEnvelope = api.get_json(PROFILE_PATH, &[]).await?;
    let profile = envelope.profile.unwrap_or_default();
    let raw = profile
        .identity
        .clone()
        .or(envelope.user_id)
        .unwrap_or_default();

    let identity = Identity::parse(&raw).map_err(|e| {
        warn!(user_id = %raw, "Profile returned an invalid identity");
        e
    })?;
    Ok((identity, profile))
}

/// Fetch the profile and build a session scoped to `character_id`
pub async fn start_session(api: &ApiClient, character_id: Option<String>) -> Result<SessionContext> {
    let (identity, profile) = fetch_profile(api).await?;
    let ctx = SessionContext::from_profile(&identity, &profile).with_character(character_id);
    info!(user = %ctx.display_label(), "Session started");
    Ok(ctx)
}

/// Change the display name and apply the stored result to `ctx`
pub async fn update_display_name(
    api: &ApiClient,
    ctx: &mut SessionContext,
    display_name: &str,
) -> Result<Profile> {
    ctx.identity()?;
    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err(TreeholeError::validation("display name is required"));
    }

    let envelope: ProfileEnvelope = api
        .post_json(
            PROFILE_PATH,
            &ProfileUpdate {
                display_name: display_name.to_string(),
            },
        )
        .await?;

    let mut profile = envelope.profile.unwrap_or_default();
    if profile.display_name.is_empty() {
        profile.display_name = display_name.to_string();
    }
    if profile.avatar_url.is_empty() {
        profile.avatar_url = ctx.avatar_url.clone();
    }
    ctx.apply_profile(&profile);
    Ok(profile)
}

/// Upload an image as the user's avatar and return its new location
pub async fn upload_avatar(api: &ApiClient, ctx: &mut SessionContext, path: &Path) -> Result<String> {
    let identity = ctx.identity()?;
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("avatar.png")
        .to_string();
    let mime = image_mime(&file_name)
        .ok_or_else(|| TreeholeError::validation("avatar must be a png, jpeg, gif or webp image"))?;

    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(mime)?;
    let form = reqwest::multipart::Form::new()
        .part("file", part)
        .text("user_id", identity.as_str().to_string());

    let response: AvatarUploadResponse = api.post_multipart(AVATAR_UPLOAD_PATH, form).await?;
    if response.avatar_url.is_empty() {
        return Err(TreeholeError::request_failed("avatar upload returned no location"));
    }
    ctx.avatar_url = response.avatar_url.clone();
    Ok(response.avatar_url)
}

fn image_mime(file_name: &str) -> Option<&'static str> {
    let ext = file_name.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_mime() {
        assert_eq!(image_mime("me.PNG"), Some("image/png"));
        assert_eq!(image_mime("me.jpeg"), Some("image/jpeg"));
        assert_eq!(image_mime("notes.txt"), None);
    }
}
