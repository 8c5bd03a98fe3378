pub mod configuration;
pub mod dispatch;
pub mod domain;
pub mod email_client;
pub mod routes;
pub mod startup;
pub mod store;
pub mod subscriptions;
pub mod telemetry;
pub mod templates;
pub mod utils;
pub mod weather_client;
