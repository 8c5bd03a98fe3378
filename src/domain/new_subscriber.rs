use super::SubscriberEmail;
use super::SubscriberLocation;

/// A registration request that has passed parsing; the only way into the
/// store.
#[derive(Debug, Clone)]
pub struct NewSubscriber {
    pub email: SubscriberEmail,
    pub location: SubscriberLocation,
}

impl NewSubscriber {
    /// Parse raw user input. `location` may be absent, in which case the
    /// subscriber gets `DEFAULT_LOCATION`.
    pub fn parse(
        email: String,
        location: Option<String>,
    ) -> Result<Self, String> {
        let email = SubscriberEmail::parse(email)?;
        let location = SubscriberLocation::parse(location)?;
        Ok(Self { email, location })
    }
}
