mod new_subscriber;
mod subscriber_email;
mod subscriber_location;
mod subscription;
// allow external `use` statements to skip `new_subscriber` etc
pub use new_subscriber::NewSubscriber;
pub use subscriber_email::SubscriberEmail;
pub use subscriber_location::SubscriberLocation;
pub use subscriber_location::DEFAULT_LOCATION;
pub use subscription::ConfirmedSubscriber;
pub use subscription::Subscription;
