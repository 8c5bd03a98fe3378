use std::fmt::Debug;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::FixedOffset;
use chrono::NaiveDate;
use chrono::NaiveTime;
use chrono::Offset;
use chrono::TimeZone;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::ConfirmedSubscriber;
use crate::domain::SubscriberEmail;
use crate::domain::SubscriberLocation;
use crate::email_client::MailTransport;
use crate::store::StoreError;
use crate::store::SubscriptionStore;
use crate::templates::EmailRenderer;
use crate::utils::error_chain_fmt;
use crate::weather_client::WeatherProvider;

/// Batching parameters of a dispatch run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    batch_size: usize,
    batch_delay: Duration,
    timezone: FixedOffset,
}

impl DispatchOptions {
    /// `timezone` decides what "today" means in digest subjects.
    pub fn new(
        batch_size: usize,
        batch_delay: Duration,
        timezone: FixedOffset,
    ) -> Result<Self, String> {
        if batch_size == 0 {
            return Err("Batch size must be at least 1".to_string());
        }
        Ok(Self {
            batch_size,
            batch_delay,
            timezone,
        })
    }

    pub fn batch_size(&self) -> usize { self.batch_size }

    pub fn batch_delay(&self) -> Duration { self.batch_delay }

    pub fn timezone(&self) -> FixedOffset { self.timezone }
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_delay: Duration::from_secs(1),
            timezone: Utc.fix(),
        }
    }
}

/// Where a single subscriber's pipeline broke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    /// The stored email no longer parses
    Recipient,
    Weather,
    Render,
    Send,
    /// The pipeline task panicked
    Task,
}

impl Display for FailureStage {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let s = match self {
            Self::Recipient => "recipient",
            Self::Weather => "weather",
            Self::Render => "render",
            Self::Send => "send",
            Self::Task => "task",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryFailure {
    pub email: String,
    pub stage: FailureStage,
    pub error: String,
}

/// Outcome of one dispatch run. `attempted == succeeded + failed` always
/// holds, and `failures` has one entry per failed subscriber.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub recipients: usize,
    pub batches: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<DeliveryFailure>,
}

impl DispatchSummary {
    pub(crate) fn start(run_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            started_at: now,
            finished_at: now,
            recipients: 0,
            batches: 0,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            failures: vec![],
        }
    }

    fn record(
        &mut self,
        outcome: Result<(), DeliveryFailure>,
    ) {
        self.attempted += 1;
        match outcome {
            Ok(()) => self.succeeded += 1,
            Err(failure) => {
                self.failed += 1;
                self.failures.push(failure);
            }
        }
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        let span = tracing::Span::current();
        span.record("recipients", self.recipients);
        span.record("attempted", self.attempted);
        span.record("succeeded", self.succeeded);
        span.record("failed", self.failed);
        self
    }
}

/// Only the initial query (or an overlapping run) can fail a run;
/// per-subscriber failures end up in the summary instead.
#[derive(thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to query confirmed subscribers")]
    StoreQuery {
        #[source]
        source: StoreError,
        summary: Box<DispatchSummary>,
    },
    #[error("A dispatch run is already in progress")]
    AlreadyRunning,
}

impl DispatchError {
    /// Summary of the aborted run, if it got far enough to start one
    pub fn summary(&self) -> Option<&DispatchSummary> {
        match self {
            Self::StoreQuery { summary, .. } => Some(summary.as_ref()),
            Self::AlreadyRunning => None,
        }
    }
}

impl Debug for DispatchError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Sends the daily digest to every confirmed subscriber.
///
/// Subscribers are processed in groups of `batch_size`. Pipelines within a
/// group (fetch weather, render, send) run concurrently as separate tasks and
/// the group is fully settled before the next one starts, with
/// `batch_delay` in between. A failing (or panicking) pipeline only affects
/// its own subscriber.
///
/// At most one run is in progress at a time, across all clones; the scheduled
/// run and the manual trigger share the same `Dispatcher`.
///
/// Cloning is cheap; all collaborators are shared.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn SubscriptionStore>,
    weather: Arc<dyn WeatherProvider>,
    mail: Arc<dyn MailTransport>,
    renderer: Arc<EmailRenderer>,
    options: DispatchOptions,
    running: Arc<Mutex<()>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        weather: Arc<dyn WeatherProvider>,
        mail: Arc<dyn MailTransport>,
        renderer: Arc<EmailRenderer>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            store,
            weather,
            mail,
            renderer,
            options,
            running: Arc::default(),
        }
    }

    #[tracing::instrument(
        name = "Dispatching daily weather",
        skip_all,
        fields(
            run_id = tracing::field::Empty,
            recipients = tracing::field::Empty,
            attempted = tracing::field::Empty,
            succeeded = tracing::field::Empty,
            failed = tracing::field::Empty,
        )
    )]
    pub async fn run(&self) -> Result<DispatchSummary, DispatchError> {
        let _running = self
            .running
            .try_lock()
            .map_err(|_| DispatchError::AlreadyRunning)?;
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let mut summary = DispatchSummary::start(run_id);

        let subscribers = match self.store.confirmed_subscribers().await {
            Ok(s) => s,
            Err(e) => {
                return Err(DispatchError::StoreQuery {
                    source: e,
                    summary: Box::new(summary.finish()),
                })
            }
        };
        summary.recipients = subscribers.len();
        if subscribers.is_empty() {
            tracing::info!("No confirmed subscribers");
            return Ok(summary.finish());
        }

        let today = Utc::now()
            .with_timezone(&self.options.timezone())
            .date_naive();
        let batches: Vec<_> = subscribers.chunks(self.options.batch_size()).collect();
        let n_batches = batches.len();

        for (i, batch) in batches.into_iter().enumerate() {
            summary.batches += 1;
            tracing::info!(batch = i + 1, of = n_batches, size = batch.len(), "Sending batch");

            let handles: Vec<(String, JoinHandle<Result<(), DeliveryFailure>>)> = batch
                .iter()
                .cloned()
                .map(|subscriber| {
                    let email = subscriber.email.clone();
                    let this = self.clone();
                    (email, tokio::spawn(async move { this.deliver(subscriber, today).await }))
                })
                .collect();

            // every task is already running; this only waits for them to settle
            for (email, handle) in handles {
                let outcome = handle.await.unwrap_or_else(|e| {
                    tracing::error!(
                        subscriber_email = %email,
                        error.message = %e,
                        "Delivery task failed"
                    );
                    Err(DeliveryFailure {
                        email,
                        stage: FailureStage::Task,
                        error: e.to_string(),
                    })
                });
                summary.record(outcome);
            }

            if i + 1 < n_batches {
                tokio::time::sleep(self.options.batch_delay()).await;
            }
        }

        let summary = summary.finish();
        tracing::info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Dispatch finished"
        );
        Ok(summary)
    }

    /// Weather -> render -> send, for one subscriber
    #[tracing::instrument(
        name = "Delivering daily weather",
        skip_all,
        fields(subscriber_email = %subscriber.email, location = %subscriber.location)
    )]
    async fn deliver(
        &self,
        subscriber: ConfirmedSubscriber,
        today: NaiveDate,
    ) -> Result<(), DeliveryFailure> {
        let fail = |stage: FailureStage, e: &dyn std::error::Error| {
            tracing::error!(%stage, error.message = %e, "Delivery failed");
            DeliveryFailure {
                email: subscriber.email.clone(),
                stage,
                error: e.to_string(),
            }
        };

        let email = SubscriberEmail::parse(subscriber.email.clone()).map_err(|e| {
            tracing::error!(stage = %FailureStage::Recipient, error.message = %e, "Delivery failed");
            DeliveryFailure {
                email: subscriber.email.clone(),
                stage: FailureStage::Recipient,
                error: e,
            }
        })?;
        let location = SubscriberLocation::from_stored(subscriber.location.clone());

        let forecast = self
            .weather
            .forecast(location.as_ref())
            .await
            .map_err(|e| fail(FailureStage::Weather, &e))?;
        let message = self
            .renderer
            .daily_digest(&email, &location, &forecast, today)
            .map_err(|e| fail(FailureStage::Render, &e))?;
        self.mail
            .send_email(&message)
            .await
            .map_err(|e| fail(FailureStage::Send, &e))?;
        Ok(())
    }
}

/// Time of day at which the scheduled run fires, in a fixed UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    time: NaiveTime,
    timezone: FixedOffset,
}

impl DailySchedule {
    pub fn new(
        hour: u32,
        minute: u32,
        timezone: FixedOffset,
    ) -> Result<Self, String> {
        let time = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or(format!("Invalid schedule time: {hour:02}:{minute:02}"))?;
        Ok(Self { time, timezone })
    }

    /// First scheduled instant strictly after `now`
    pub fn next_run_after(
        &self,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let local_date = now.with_timezone(&self.timezone).date_naive();
        let offset = chrono::Duration::seconds(self.timezone.local_minus_utc() as i64);
        let at = |date: NaiveDate| Utc.from_utc_datetime(&(date.and_time(self.time) - offset));

        let today = at(local_date);
        match today > now {
            true => today,
            false => today + chrono::Duration::days(1),
        }
    }

    pub fn until_next_run(
        &self,
        now: DateTime<Utc>,
    ) -> Duration {
        (self.next_run_after(now) - now)
            .to_std()
            .unwrap_or_default()
    }
}

/// Runs the dispatcher every day at `schedule`, until the process exits.
///
/// To be run as a separate worker, outside the main API.
pub async fn init_dispatch_worker(
    dispatcher: Dispatcher,
    schedule: DailySchedule,
) -> Result<(), anyhow::Error> {
    loop {
        let now = Utc::now();
        tracing::info!(next_run = %schedule.next_run_after(now), "Dispatch scheduled");
        tokio::time::sleep(schedule.until_next_run(now)).await;
        run_once(&dispatcher).await;
    }
}

async fn run_once(dispatcher: &Dispatcher) {
    match dispatcher.run().await {
        Ok(summary) if summary.failed > 0 => tracing::warn!(
            run_id = %summary.run_id,
            failed = summary.failed,
            "Scheduled dispatch finished with failures"
        ),
        Ok(summary) => tracing::info!(run_id = %summary.run_id, "Scheduled dispatch finished"),
        Err(e) => tracing::error!(
            run_id = ?e.summary().map(|s| s.run_id),
            error.cause_chain = ?e,
            error.message = %e,
            "Scheduled dispatch failed"
        ),
    }
}
