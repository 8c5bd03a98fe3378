use std::env;
use std::env::current_dir;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use config::Config;
use config::ConfigError;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::Deserialize;
use serde::Serialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use sqlx::postgres::PgConnectOptions;

use crate::dispatch::DailySchedule;
use crate::dispatch::DispatchOptions;
use crate::domain::SubscriberEmail;
use crate::email_client::EmailClient;
use crate::email_client::MailTransport;
use crate::email_client::SmtpEmailClient;
use crate::weather_client::WeatherClient;

/// Global configuration, loaded from `configuration/*.yaml`. See
/// `get_configuration`.
#[derive(Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub email_client: EmailClientSettings,
    pub weather_client: WeatherClientSettings,
    pub dispatch: DispatchSettings,
    pub branding: Branding,
}

/// Server configuration
#[derive(Deserialize, Clone)]
pub struct ApplicationSettings {
    /// Should be localhost on dev machine, 0.0.0.0 on prod
    pub host: String,

    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,

    /// Public address of the API, used to build confirmation links
    pub base_url: String,

    /// Bearer token required by `POST /admin/dispatch`
    pub admin_token: Secret<String>,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    /// Process-local store; subscriptions are lost on restart
    Memory,
}

/// Database configuration
#[derive(Deserialize, Clone)]
pub struct DatabaseSettings {
    pub backend: StoreBackend,

    pub username: String,
    pub password: Secret<String>,
    pub host: String,

    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub database_name: String,

    /// Should be `true` in production.
    pub require_ssl: bool,
}

impl DatabaseSettings {
    /// Connection to the named database. The password stays concealed.
    pub fn connection(&self) -> PgConnectOptions {
        self.connection_without_db().database(&self.database_name)
    }

    /// Connection to the Postgres instance, without selecting a database.
    /// Used to create throwaway databases in tests.
    pub fn connection_without_db(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .username(&self.username)
            .password(self.password.expose_secret())
            .host(&self.host)
            .port(self.port)
            .ssl_mode(match self.require_ssl {
                true => sqlx::postgres::PgSslMode::Require,
                false => sqlx::postgres::PgSslMode::Prefer,
            })
    }
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// SMTP relay (e.g. Gmail, Mailpit)
    Smtp,
    /// JSON email REST API (Postmark-style)
    Api,
}

#[derive(Deserialize, Clone)]
pub struct SmtpSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub username: String,
    pub password: Secret<String>,
    /// `false` for local catchers that speak plain SMTP
    pub starttls: bool,
}

#[derive(Deserialize, Clone)]
pub struct EmailApiSettings {
    pub base_url: String,
    pub authorization_token: Secret<String>,
}

#[derive(Deserialize, Clone)]
pub struct EmailClientSettings {
    pub transport: TransportKind,
    pub sender: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
    pub smtp: SmtpSettings,
    pub api: EmailApiSettings,
}

impl EmailClientSettings {
    pub fn sender(&self) -> Result<SubscriberEmail, String> {
        SubscriberEmail::parse(self.sender.clone())
    }

    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_milliseconds) }

    /// Build whichever transport is configured. The returned handle is meant to
    /// be built once and shared by the API and the dispatch worker.
    pub fn client(&self) -> Result<Arc<dyn MailTransport>, anyhow::Error> {
        let sender = self.sender().map_err(|e| anyhow::anyhow!(e))?;
        let client: Arc<dyn MailTransport> = match self.transport {
            TransportKind::Smtp => Arc::new(SmtpEmailClient::new(
                &self.smtp,
                sender,
                self.timeout(),
            )?),
            TransportKind::Api => Arc::new(EmailClient::new(
                self.api.base_url.clone(),
                sender,
                self.api.authorization_token.clone(),
                self.timeout(),
            )?),
        };
        Ok(client)
    }
}

#[derive(Deserialize, Clone)]
pub struct WeatherClientSettings {
    pub base_url: String,
    pub api_key: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub forecast_days: u8,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
}

impl WeatherClientSettings {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_milliseconds) }

    pub fn client(&self) -> Result<WeatherClient, anyhow::Error> {
        WeatherClient::new(
            self.base_url.clone(),
            self.api_key.clone(),
            self.forecast_days,
            self.timeout(),
        )
    }
}

/// Daily dispatch job configuration
#[derive(Deserialize, Clone)]
pub struct DispatchSettings {
    /// When `false`, only the manual trigger runs the job
    pub enabled: bool,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub batch_size: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub batch_delay_milliseconds: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub hour: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub minute: u32,
    /// Timezone of `hour`/`minute`, e.g. 7 for Asia/Ho_Chi_Minh
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub utc_offset_hours: i32,
}

impl DispatchSettings {
    pub fn options(&self) -> Result<DispatchOptions, String> {
        DispatchOptions::new(
            self.batch_size,
            Duration::from_millis(self.batch_delay_milliseconds),
            self.timezone()?,
        )
    }

    pub fn timezone(&self) -> Result<FixedOffset, String> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .ok_or(format!("Invalid UTC offset: {}", self.utc_offset_hours))
    }

    pub fn schedule(&self) -> Result<DailySchedule, String> {
        DailySchedule::new(self.hour, self.minute, self.timezone()?)
    }
}

/// Names and addresses printed in every email
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Branding {
    pub company_name: String,
    /// Salutation used in place of a subscriber name, which we don't collect
    pub recipient_name: String,
    pub support_email: String,
    pub company_address: String,
}

#[derive(Debug)]
pub enum Environment {
    Local,
    Production,
}

impl Display for Environment {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Environment::Local => "local",
                Environment::Production => "production",
            }
        )
    }
}

impl TryFrom<String> for Environment {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            e => Err(format!("Invalid environment: {e}")),
        }
    }
}

/// Load yaml configuration files at `<project_root>/configuration`.
///
/// `base.yaml` is read first, then `{local,production}.yaml` depending on
/// `APP_ENVIRONMENT` (default: local), then env vars of the form
/// `APP_<SECTION>__<KEY>`.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let cfg_dir = current_dir()
        .map_err(|e| ConfigError::Message(format!("could not get current dir: {e}")))?
        .join("configuration");

    let env: Environment = env::var("APP_ENVIRONMENT")
        .unwrap_or("local".to_string())
        .try_into()
        .map_err(ConfigError::Message)?;

    let settings = Config::builder()
        .add_source(config::File::from(cfg_dir.join("base.yaml")))
        .add_source(config::File::from(cfg_dir.join(format!("{env}.yaml"))))
        .add_source(
            // env vars are always strings; numeric fields go through `serde-aux`.
            //
            // `APP_APPLICATION__PORT=5001` -> `Settings.application.port`
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
