use std::fmt::Debug;

use chrono::NaiveDate;
use serde::Serialize;
use tera::Context;
use tera::Tera;

use crate::configuration::Branding;
use crate::domain::SubscriberEmail;
use crate::domain::SubscriberLocation;
use crate::email_client::EmailMessage;
use crate::utils::error_chain_fmt;
use crate::weather_client::Forecast;

/// How many forecast days the daily digest shows, "Today" included
pub const DIGEST_DAYS: usize = 4;

#[derive(thiserror::Error)]
#[error("Failed to render template")]
pub struct RenderError(#[from] tera::Error);

impl Debug for RenderError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Outcome shown by `GET /subscriptions/confirm`
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmationPage {
    Confirmed(SubscriberEmail),
    AlreadyConfirmed(SubscriberEmail),
    NotFound(SubscriberEmail),
    InvalidLink,
    Failed,
}

#[derive(Serialize)]
struct PageView<'a> {
    icon: &'a str,
    title: &'a str,
    message: String,
    detail: Option<&'a str>,
}

#[derive(Serialize)]
struct DayView {
    label: String,
    month_day: String,
    max_c: i64,
    min_c: i64,
    chance_of_rain: i64,
    condition: String,
    icon: String,
}

#[derive(Serialize)]
struct DigestView {
    today: String,
    temp_c: i64,
    feelslike_c: i64,
    humidity: i64,
    wind_kph: i64,
    condition: String,
    icon: String,
    resolved_location: Option<String>,
    days: Vec<DayView>,
}

/// Turns subscriptions and forecasts into emails (HTML + plaintext) and
/// confirmation pages. Templates live in `templates/` and are embedded at
/// compile time.
pub struct EmailRenderer {
    engine: Tera,
    branding: Branding,
    base_url: String,
}

impl EmailRenderer {
    pub fn new(
        branding: Branding,
        base_url: String,
    ) -> Result<Self, RenderError> {
        let mut engine = Tera::default();
        engine.add_raw_templates(vec![
            ("base.html", include_str!("../templates/base.html")),
            (
                "confirmation.html",
                include_str!("../templates/confirmation.html"),
            ),
            (
                "confirmation.txt",
                include_str!("../templates/confirmation.txt"),
            ),
            (
                "unsubscribed.html",
                include_str!("../templates/unsubscribed.html"),
            ),
            (
                "unsubscribed.txt",
                include_str!("../templates/unsubscribed.txt"),
            ),
            (
                "daily_digest.html",
                include_str!("../templates/daily_digest.html"),
            ),
            (
                "daily_digest.txt",
                include_str!("../templates/daily_digest.txt"),
            ),
            (
                "confirmation_page.html",
                include_str!("../templates/confirmation_page.html"),
            ),
        ])?;
        Ok(Self {
            engine,
            branding,
            base_url,
        })
    }

    pub fn confirmation_link(
        &self,
        email: &SubscriberEmail,
    ) -> String {
        format!(
            "{}/subscriptions/confirm?email={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(email.as_ref())
        )
    }

    fn context(
        &self,
        email: &SubscriberEmail,
        location: &SubscriberLocation,
    ) -> Context {
        let mut context = Context::new();
        context.insert("branding", &self.branding);
        context.insert("email", email.as_ref());
        context.insert("location", location.as_ref());
        context.insert(
            "unsubscribe_mailto",
            &format!(
                "mailto:{}?subject={}&body={}",
                self.branding.support_email,
                urlencoding::encode("Unsubscribe Weather Updates"),
                urlencoding::encode(&format!(
                    "Please unsubscribe {email} from daily weather updates."
                )),
            ),
        );
        context
    }

    fn render(
        &self,
        template: &str,
        to: &SubscriberEmail,
        subject: String,
        context: &Context,
    ) -> Result<EmailMessage, RenderError> {
        Ok(EmailMessage {
            to: to.clone(),
            subject,
            html_body: self.engine.render(&format!("{template}.html"), context)?,
            text_body: self.engine.render(&format!("{template}.txt"), context)?,
        })
    }

    pub fn confirmation(
        &self,
        email: &SubscriberEmail,
        location: &SubscriberLocation,
    ) -> Result<EmailMessage, RenderError> {
        let mut context = self.context(email, location);
        context.insert("confirm_link", &self.confirmation_link(email));
        self.render(
            "confirmation",
            email,
            format!("Daily weather updates for {location}"),
            &context,
        )
    }

    pub fn unsubscribed(
        &self,
        email: &SubscriberEmail,
        location: &SubscriberLocation,
    ) -> Result<EmailMessage, RenderError> {
        self.render(
            "unsubscribed",
            email,
            "Unsubscribed from daily weather".to_string(),
            &self.context(email, location),
        )
    }

    /// `today` is the subscriber-facing date (the dispatch timezone), used in
    /// the subject and to label the first forecast day.
    pub fn daily_digest(
        &self,
        email: &SubscriberEmail,
        location: &SubscriberLocation,
        forecast: &Forecast,
        today: NaiveDate,
    ) -> Result<EmailMessage, RenderError> {
        let current = &forecast.current;
        let view = DigestView {
            today: today.format("%A, %B %-d, %Y").to_string(),
            temp_c: current.temp_c.round() as i64,
            feelslike_c: current.feelslike_c.round() as i64,
            humidity: current.humidity.round() as i64,
            wind_kph: current.wind_kph.round() as i64,
            condition: current.condition.text.clone(),
            icon: current.condition.icon.clone(),
            resolved_location: forecast.resolved_location.clone(),
            days: forecast
                .days
                .iter()
                .take(DIGEST_DAYS)
                .enumerate()
                .map(|(i, day)| DayView {
                    label: match i {
                        0 => "Today".to_string(),
                        _ => day.date.format("%a").to_string(),
                    },
                    month_day: day.date.format("%b %-d").to_string(),
                    max_c: day.max_temp_c.round() as i64,
                    min_c: day.min_temp_c.round() as i64,
                    chance_of_rain: day.chance_of_rain.round() as i64,
                    condition: day.condition.text.clone(),
                    icon: day.condition.icon.clone(),
                })
                .collect(),
        };
        let mut context = self.context(email, location);
        context.insert("weather", &view);
        self.render(
            "daily_digest",
            email,
            format!(
                "🌤️ Daily Weather for {location} - {}",
                today.format("%-m/%-d/%Y")
            ),
            &context,
        )
    }

    pub fn confirmation_page(
        &self,
        page: &ConfirmationPage,
    ) -> Result<String, RenderError> {
        let view = match page {
            ConfirmationPage::Confirmed(email) => PageView {
                icon: "✅",
                title: "Subscription Confirmed!",
                message: format!(
                    "You will now receive daily weather updates at {email} every morning."
                ),
                detail: Some("🌤️ Your first weather update will arrive tomorrow morning!"),
            },
            ConfirmationPage::AlreadyConfirmed(email) => PageView {
                icon: "✅",
                title: "Already Confirmed",
                message: format!("{email} is already subscribed to daily weather updates."),
                detail: None,
            },
            ConfirmationPage::NotFound(email) => PageView {
                icon: "❌",
                title: "Subscription Not Found",
                message: format!("We could not find a pending subscription for {email}."),
                detail: Some("Please subscribe again to receive a new confirmation link."),
            },
            ConfirmationPage::InvalidLink => PageView {
                icon: "❌",
                title: "Invalid Confirmation Link",
                message: "The confirmation link is missing required information.".to_string(),
                detail: None,
            },
            ConfirmationPage::Failed => PageView {
                icon: "❌",
                title: "Confirmation Failed",
                message: "There was an error confirming your subscription. Please try again or contact support.".to_string(),
                detail: None,
            },
        };
        let mut context = Context::new();
        context.insert("branding", &self.branding);
        context.insert("page", &view);
        Ok(self.engine.render("confirmation_page.html", &context)?)
    }
}
