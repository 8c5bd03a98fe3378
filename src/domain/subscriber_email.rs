use std::fmt::Display;

use validator::ValidateEmail;

/// A syntactically valid, normalized (trimmed, lower-cased) email address.
/// This is the key of a subscription, and is also used for senders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberEmail(String);

impl SubscriberEmail {
    pub fn parse(email: String) -> Result<Self, String> {
        let normalized = email.trim().to_lowercase();
        if normalized.is_empty() {
            return Err("Email address cannot be empty".to_string());
        }
        ValidateEmail::validate_email(&normalized)
            .then_some(Self(normalized))
            .ok_or(format!("Invalid email: {email:?}"))
    }
}

impl AsRef<str> for SubscriberEmail {
    fn as_ref(&self) -> &str { &self.0 }
}

impl Display for SubscriberEmail {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
