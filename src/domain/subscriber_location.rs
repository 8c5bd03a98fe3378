use std::fmt::Display;

use unicode_segmentation::UnicodeSegmentation;

/// Stored verbatim when the subscriber gives no location. The weather
/// provider will most likely reject it; see DESIGN.md.
pub const DEFAULT_LOCATION: &str = "your location";

const MAX_GRAPHEMES: usize = 256;

/// Free-text location, passed as-is to the weather provider (`q=`).
///
/// Must be instantiated with `SubscriberLocation::parse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberLocation(String);

impl SubscriberLocation {
    /// Blank or missing input becomes `DEFAULT_LOCATION`. Overlong input and
    /// control characters (which would end up in URLs and email subjects) are
    /// rejected.
    pub fn parse(location: Option<String>) -> Result<Self, String> {
        let location = match location {
            Some(l) if !l.trim().is_empty() => l.trim().to_string(),
            _ => return Ok(Self::default()),
        };
        let too_long = location.graphemes(true).count() > MAX_GRAPHEMES;
        let bad = location.chars().any(char::is_control);
        match !too_long && !bad {
            true => Ok(Self(location)),
            false => Err(format!("Invalid location: {location:?}")),
        }
    }

    /// Rebuild from a stored value, which was parsed on the way in
    pub fn from_stored(location: String) -> Self {
        match location.trim().is_empty() {
            true => Self::default(),
            false => Self(location),
        }
    }

    pub fn is_default(&self) -> bool { self.0 == DEFAULT_LOCATION }
}

impl Default for SubscriberLocation {
    fn default() -> Self { Self(DEFAULT_LOCATION.to_string()) }
}

impl AsRef<str> for SubscriberLocation {
    fn as_ref(&self) -> &str { &self.0 }
}

impl Display for SubscriberLocation {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
