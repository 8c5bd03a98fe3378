use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::Deserialize;

use crate::utils::error_chain_fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub text: String,
    /// Absolute (`https:`) icon URL
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentConditions {
    pub temp_c: f64,
    pub feelslike_c: f64,
    pub humidity: f64,
    pub wind_kph: f64,
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub max_temp_c: f64,
    pub min_temp_c: f64,
    pub chance_of_rain: f64,
    pub condition: Condition,
}

/// Current conditions plus at least one forecast day. `Forecast::from_body`
/// fails closed on any missing field.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    /// e.g. "Hanoi, Vietnam", when the provider resolved the query
    pub resolved_location: Option<String>,
    pub current: CurrentConditions,
    pub days: Vec<ForecastDay>,
}

#[derive(thiserror::Error)]
pub enum WeatherError {
    #[error("Weather API rejected the request (code {code}): {message}")]
    Api { code: i64, message: String },
    #[error("Weather API returned HTTP {0}")]
    Status(StatusCode),
    #[error("Malformed weather API response")]
    MalformedResponse(#[source] serde_json::Error),
    #[error("Weather API response has no forecast days")]
    EmptyForecast,
    #[error("Could not reach weather API")]
    Request(#[from] reqwest::Error),
}

impl Debug for WeatherError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Source of forecasts for a free-text location.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn forecast(
        &self,
        location: &str,
    ) -> Result<Forecast, WeatherError>;
}

/// Client for a WeatherAPI-style `forecast.json` endpoint.
///
/// Reuses a single `reqwest::Client` (and its connection pool); share it
/// behind an `Arc` rather than building one per request.
#[derive(Debug)]
pub struct WeatherClient {
    http_client: Client,
    base_url: String,
    api_key: Secret<String>,
    forecast_days: u8,
}

impl WeatherClient {
    pub fn new(
        base_url: String,
        api_key: Secret<String>,
        forecast_days: u8,
        timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        anyhow::ensure!(forecast_days > 0, "forecast_days must be at least 1");
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url,
            api_key,
            forecast_days,
        })
    }
}

#[async_trait]
impl WeatherProvider for WeatherClient {
    #[tracing::instrument(name = "Fetching weather forecast", skip(self))]
    async fn forecast(
        &self,
        location: &str,
    ) -> Result<Forecast, WeatherError> {
        let url = format!("{}/forecast.json", self.base_url.trim_end_matches('/'));
        let days = self.forecast_days.to_string();
        let resp = self
            .http_client
            .get(&url)
            .query(&[
                ("key", self.api_key.expose_secret().as_str()),
                ("q", location),
                ("days", days.as_str()),
                ("aqi", "no"),
                ("alerts", "no"),
            ])
            .send()
            .await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        Forecast::from_body(status, &body)
    }
}

impl Forecast {
    /// An `error` object in the body always wins, whatever the status: the
    /// provider reports unknown locations as 400 + `error`, but we don't rely on
    /// that.
    pub fn from_body(
        status: StatusCode,
        body: &[u8],
    ) -> Result<Self, WeatherError> {
        let value: serde_json::Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(_) if !status.is_success() => return Err(WeatherError::Status(status)),
            Err(e) => return Err(WeatherError::MalformedResponse(e)),
        };

        if let Some(error) = value.get("error") {
            let error = ApiErrorBody::deserialize(error).unwrap_or_default();
            return Err(WeatherError::Api {
                code: error.code,
                message: error.message,
            });
        }
        if !status.is_success() {
            return Err(WeatherError::Status(status));
        }

        let raw = RawResponse::deserialize(value).map_err(WeatherError::MalformedResponse)?;
        if raw.forecast.forecastday.is_empty() {
            return Err(WeatherError::EmptyForecast);
        }
        Ok(raw.into())
    }
}

// wire format; see https://www.weatherapi.com/docs/

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct RawResponse {
    location: Option<RawLocation>,
    current: RawCurrent,
    forecast: RawForecast,
}

#[derive(Deserialize)]
struct RawLocation {
    name: String,
    country: String,
}

#[derive(Deserialize)]
struct RawCondition {
    text: String,
    icon: String,
}

#[derive(Deserialize)]
struct RawCurrent {
    temp_c: f64,
    feelslike_c: f64,
    humidity: f64,
    wind_kph: f64,
    condition: RawCondition,
}

#[derive(Deserialize)]
struct RawForecast {
    forecastday: Vec<RawForecastDay>,
}

#[derive(Deserialize)]
struct RawForecastDay {
    date: NaiveDate,
    day: RawDay,
}

#[derive(Deserialize)]
#[serde(try_from = "RawDayFields")]
struct RawDay {
    maxtemp_c: f64,
    mintemp_c: f64,
    chance_of_rain: f64,
    condition: RawCondition,
}

// Some provider versions send `chance_of_rain`, some `daily_chance_of_rain`,
// some both.
#[derive(Deserialize)]
struct RawDayFields {
    maxtemp_c: f64,
    mintemp_c: f64,
    daily_chance_of_rain: Option<f64>,
    chance_of_rain: Option<f64>,
    condition: RawCondition,
}

impl TryFrom<RawDayFields> for RawDay {
    type Error = &'static str;

    fn try_from(f: RawDayFields) -> Result<Self, Self::Error> {
        let chance_of_rain = f
            .daily_chance_of_rain
            .or(f.chance_of_rain)
            .ok_or("missing field `daily_chance_of_rain`")?;
        Ok(Self {
            maxtemp_c: f.maxtemp_c,
            mintemp_c: f.mintemp_c,
            chance_of_rain,
            condition: f.condition,
        })
    }
}

impl From<RawCondition> for Condition {
    fn from(c: RawCondition) -> Self {
        // the provider sends protocol-relative urls, which mail clients mangle
        let icon = match c.icon.strip_prefix("//") {
            Some(rest) => format!("https://{rest}"),
            None => c.icon,
        };
        Self { text: c.text, icon }
    }
}

impl From<RawResponse> for Forecast {
    fn from(raw: RawResponse) -> Self {
        Self {
            resolved_location: raw.location.map(|l| format!("{}, {}", l.name, l.country)),
            current: CurrentConditions {
                temp_c: raw.current.temp_c,
                feelslike_c: raw.current.feelslike_c,
                humidity: raw.current.humidity,
                wind_kph: raw.current.wind_kph,
                condition: raw.current.condition.into(),
            },
            days: raw
                .forecast
                .forecastday
                .into_iter()
                .map(|d| ForecastDay {
                    date: d.date,
                    max_temp_c: d.day.maxtemp_c,
                    min_temp_c: d.day.mintemp_c,
                    chance_of_rain: d.day.chance_of_rain,
                    condition: d.day.condition.into(),
                })
                .collect(),
        }
    }
}
