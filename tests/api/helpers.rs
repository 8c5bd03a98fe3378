use once_cell::sync::Lazy;
use reqwest::Url;
use secrecy::Secret;
use serde_json::json;
use uuid::Uuid;
use weather_digest::configuration::get_configuration;
use weather_digest::configuration::StoreBackend;
use weather_digest::configuration::TransportKind;
use weather_digest::startup::Application;
use weather_digest::telemetry::get_subscriber;
use weather_digest::telemetry::init_subscriber;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::matchers::query_param;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::Request;
use wiremock::ResponseTemplate;

/// Init the tracing subscriber once for the whole test binary.
///
/// To opt in to verbose logging, use the env var `TEST_LOG`:
///
/// ```sh
///      TEST_LOG=true cargo test [test_name] | bunyan
/// ```
static TRACING: Lazy<()> = Lazy::new(|| {
    // the two sinks have different types, hence the duplicated arms
    match std::env::var("TEST_LOG") {
        Ok(_) => {
            let subscriber = get_subscriber("test", "debug", std::io::stdout);
            init_subscriber(subscriber).unwrap();
        }
        Err(_) => {
            let subscriber = get_subscriber("test", "debug", std::io::sink);
            init_subscriber(subscriber).unwrap();
        }
    };
});

pub struct TestApp {
    pub addr: String,
    pub port: u16,
    pub admin_token: String,
    /// Stands in for the email REST API
    pub email_server: MockServer,
    /// Stands in for the weather provider
    pub weather_server: MockServer,
    pub api_client: reqwest::Client,
}

/// An email captured by `email_server`
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl SentEmail {
    pub fn from_request(req: &Request) -> Self {
        let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
        let field = |k: &str| body[k].as_str().unwrap().to_string();
        Self {
            to: field("To"),
            subject: field("Subject"),
            html: field("HtmlBody"),
            text: field("TextBody"),
        }
    }
}

impl TestApp {
    pub async fn post_subscriptions(
        &self,
        body: String,
    ) -> reqwest::Response {
        self.api_client
            .post(format!("{}/subscriptions", self.addr))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .expect("execute request")
    }

    pub async fn post_subscriptions_json(
        &self,
        body: &serde_json::Value,
    ) -> reqwest::Response {
        self.api_client
            .post(format!("{}/subscriptions", self.addr))
            .json(body)
            .send()
            .await
            .expect("execute request")
    }

    pub async fn post_unsubscribe(
        &self,
        body: String,
    ) -> reqwest::Response {
        self.api_client
            .post(format!("{}/subscriptions/unsubscribe", self.addr))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .expect("execute request")
    }

    pub async fn get_confirm(
        &self,
        query: &str,
    ) -> reqwest::Response {
        self.api_client
            .get(format!("{}/subscriptions/confirm{query}", self.addr))
            .send()
            .await
            .expect("execute request")
    }

    pub async fn post_dispatch(
        &self,
        token: Option<&str>,
    ) -> reqwest::Response {
        let mut req = self
            .api_client
            .post(format!("{}/admin/dispatch", self.addr));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.expect("execute request")
    }

    /// Every email the app has sent so far, oldest first
    pub async fn sent_emails(&self) -> Vec<SentEmail> {
        self.email_server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(SentEmail::from_request)
            .collect()
    }

    /// Extract the confirmation link from a confirmation email, pointed at
    /// the test server's random port
    pub fn get_confirmation_link(
        &self,
        email: &SentEmail,
    ) -> Url {
        let links: Vec<_> = linkify::LinkFinder::new()
            .links(&email.text)
            .filter(|l| *l.kind() == linkify::LinkKind::Url)
            .collect();
        assert_eq!(links.len(), 1);

        let mut link = Url::parse(links[0].as_str()).unwrap();
        // don't call random apis on the web
        assert_eq!(link.host_str().unwrap(), "127.0.0.1");
        link.set_port(Some(self.port)).unwrap();
        link
    }

    /// Register `email`, then follow the link from the confirmation email
    pub async fn create_confirmed_subscriber(
        &self,
        email: &str,
        location: &str,
    ) {
        let n_sent = self.sent_emails().await.len();
        let body = format!(
            "email={}&location={}",
            urlencoding::encode(email),
            urlencoding::encode(location)
        );
        self.post_subscriptions(body).await.error_for_status().unwrap();

        let sent = self.sent_emails().await;
        let link = self.get_confirmation_link(&sent[n_sent]);
        reqwest::get(link).await.unwrap().error_for_status().unwrap();
    }
}

/// Minimal well-formed `forecast.json` body
pub fn forecast_body() -> serde_json::Value {
    let forecastday: Vec<_> = (0..5)
        .map(|i| {
            json!({
                "date": format!("2026-10-{:02}", 19 + i),
                "day": {
                    "maxtemp_c": 31.4,
                    "mintemp_c": 24.6,
                    "daily_chance_of_rain": 80,
                    "condition": {
                        "text": "Patchy rain nearby",
                        "icon": "//cdn.weatherapi.com/weather/64x64/day/176.png"
                    }
                }
            })
        })
        .collect();
    json!({
        "location": { "name": "Hanoi", "country": "Vietnam" },
        "current": {
            "temp_c": 28.2,
            "feelslike_c": 32.5,
            "humidity": 79,
            "wind_kph": 11.2,
            "condition": {
                "text": "Partly cloudy",
                "icon": "//cdn.weatherapi.com/weather/64x64/day/116.png"
            }
        },
        "forecast": { "forecastday": forecastday }
    })
}

/// Weather server answers `location` with a forecast
pub async fn mock_forecast(
    app: &TestApp,
    location: &str,
) {
    Mock::given(method("GET"))
        .and(path("/forecast.json"))
        .and(query_param("q", location))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
        .mount(&app.weather_server)
        .await;
}

/// Weather server rejects `location` the way the real provider does
pub async fn mock_unknown_location(
    app: &TestApp,
    location: &str,
) {
    Mock::given(method("GET"))
        .and(path("/forecast.json"))
        .and(query_param("q", location))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 1006, "message": "No matching location found." }
        })))
        .mount(&app.weather_server)
        .await;
}

/// Email API accepts everything
pub async fn mock_email_ok(app: &TestApp) {
    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&app.email_server)
        .await;
}

/// Spawn the app on a random port, with the in-memory store and both external
/// APIs replaced by mock servers.
pub async fn spawn_app() -> TestApp {
    Lazy::force(&TRACING);

    let email_server = MockServer::start().await;
    let weather_server = MockServer::start().await;
    let admin_token = Uuid::new_v4().to_string();

    let cfg = {
        let mut c = get_configuration().expect("Failed to read configuration");
        c.application.host = "127.0.0.1".to_string();
        // random port; links get the real one via `get_confirmation_link`
        c.application.port = 0;
        c.application.base_url = "http://127.0.0.1".to_string();
        c.application.admin_token = Secret::new(admin_token.clone());
        c.database.backend = StoreBackend::Memory;
        c.email_client.transport = TransportKind::Api;
        c.email_client.api.base_url = email_server.uri();
        c.weather_client.base_url = weather_server.uri();
        c
    };

    let app = Application::build(cfg).await.expect("Failed to build app");
    let port = app.get_port();
    tokio::spawn(app.run_until_stopped());

    TestApp {
        addr: format!("http://127.0.0.1:{port}"),
        port,
        admin_token,
        email_server,
        weather_server,
        api_client: reqwest::Client::new(),
    }
}
