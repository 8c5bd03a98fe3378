// one test binary: tests/api/*.rs are modules, helpers.rs is shared
mod dispatch;
mod health_check;
mod helpers;
mod subscriptions;
mod unsubscribe;
