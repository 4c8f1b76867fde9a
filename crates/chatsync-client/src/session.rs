//! The signed-in session: who we are, how we authenticate, how we render.
//!
//! One [`Session`] exists per signed-in user and is handed to the
//! synchronizer at startup. Nothing else holds identity state.

use chatsync_shared::models::SelfProfile;
use chatsync_shared::types::UserId;

use crate::config::ClientConfig;

#[derive(Debug, Clone)]
pub struct Session {
    profile: SelfProfile,
    credential: String,
    config: ClientConfig,
}

impl Session {
    pub fn new(profile: SelfProfile, credential: impl Into<String>, config: ClientConfig) -> Self {
        Self {
            profile,
            credential: credential.into(),
            config,
        }
    }

    pub fn self_id(&self) -> &UserId {
        &self.profile.identity
    }

    pub fn profile(&self) -> &SelfProfile {
        &self.profile
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Current self avatar, if one is set.
    pub fn avatar(&self) -> Option<&str> {
        self.profile.avatar_ref.as_deref()
    }

    /// Replace the self avatar. Empty strings clear it.
    pub fn set_avatar(&mut self, avatar: Option<String>) {
        self.profile.avatar_ref = avatar.filter(|a| !a.trim().is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_avatar() {
        let mut session = Session::new(
            SelfProfile {
                identity: UserId::from("7"),
                display_name: "me".into(),
                avatar_ref: None,
            },
            "token",
            ClientConfig::default(),
        );
        assert_eq!(session.self_id().as_str(), "7");
        assert_eq!(session.avatar(), None);

        session.set_avatar(Some("/static/upload/me.png".into()));
        assert_eq!(session.avatar(), Some("/static/upload/me.png"));

        session.set_avatar(Some("  ".into()));
        assert_eq!(session.avatar(), None);
    }
}
