use md5::{Digest, Md5};

/// Deterministic email-to-avatar-URL derivation. Injected into payload
/// normalization so the image service is a capability, not a constant.
pub trait AvatarResolver: Send + Sync {
    fn avatar_url(&self, email: &str) -> String;
}

/// The gravatar scheme: md5 of the trimmed, lowercased email address.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gravatar;

impl AvatarResolver for Gravatar {
    fn avatar_url(&self, email: &str) -> String {
        let digest = Md5::digest(email.trim().to_lowercase().as_bytes());
        format!("https://s.gravatar.com/avatar/{}", hex::encode(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avatar_url_matches_known_gravatar_hash() {
        assert_eq!(
            Gravatar.avatar_url("jabapyth+bitbucket@gmail.com"),
            "https://s.gravatar.com/avatar/33e65cf5aff804dbc595c8e250e36c3f"
        );
    }

    #[test]
    fn avatar_url_normalizes_case_and_whitespace() {
        assert_eq!(
            Gravatar.avatar_url("  Jabapyth+Bitbucket@Gmail.com "),
            Gravatar.avatar_url("jabapyth+bitbucket@gmail.com")
        );
    }
}
