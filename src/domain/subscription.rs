use chrono::DateTime;
use chrono::Utc;

/// A stored subscription, keyed by `email`.
///
/// `confirmed_at` is `Some` iff `confirmed`; stores keep this invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub email: String,
    pub location: String,
    pub confirmed: bool,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// The slice of a confirmed `Subscription` the dispatcher needs.
///
/// Fields are left unparsed: stored rows are re-validated per subscriber
/// during dispatch, so one bad row can't fail the whole query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedSubscriber {
    pub email: String,
    pub location: String,
}

impl From<Subscription> for ConfirmedSubscriber {
    fn from(value: Subscription) -> Self {
        Self {
            email: value.email,
            location: value.location,
        }
    }
}
