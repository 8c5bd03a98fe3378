use std::net::TcpListener;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::web;
use actix_web::web::Data;
use actix_web::App;
use actix_web::HttpServer;
use secrecy::Secret;
use tracing_actix_web::TracingLogger;

use crate::configuration::DatabaseSettings;
use crate::configuration::Settings;
use crate::configuration::StoreBackend;
use crate::dispatch::Dispatcher;
use crate::email_client::MailTransport;
use crate::routes::confirm_preflight;
use crate::routes::confirm_subscriber;
use crate::routes::health_check;
use crate::routes::subscribe;
use crate::routes::trigger_dispatch;
use crate::routes::unsubscribe_subscriber;
use crate::store::get_connection_pool;
use crate::store::InMemorySubscriptionStore;
use crate::store::PostgresSubscriptionStore;
use crate::store::SubscriptionStore;
use crate::templates::EmailRenderer;
use crate::weather_client::WeatherProvider;

/// Wrapper for actix's `Server` with access to the bound port, plus the
/// dispatcher sharing the server's store and clients.
pub struct Application {
    /// Left private; use `get_port` to access
    port: u16,
    server: Server,
    dispatcher: Dispatcher,
}

impl Application {
    /// Bind the listener and build every shared dependency once: store, mail
    /// transport, weather client and renderer.
    pub async fn build(cfg: Settings) -> Result<Self, anyhow::Error> {
        let addr = format!("{}:{}", cfg.application.host, cfg.application.port);
        let listener = TcpListener::bind(addr)?;
        // port 0 means the OS picked one
        let port = listener.local_addr()?.port();

        let store = get_store(&cfg.database);
        let mail = cfg.email_client.client()?;
        let weather: Arc<dyn WeatherProvider> = Arc::new(cfg.weather_client.client()?);
        let renderer = Arc::new(EmailRenderer::new(
            cfg.branding.clone(),
            cfg.application.base_url.clone(),
        )?);
        let options = cfg.dispatch.options().map_err(anyhow::Error::msg)?;

        let dispatcher = Dispatcher::new(
            store.clone(),
            weather,
            mail.clone(),
            renderer.clone(),
            options,
        );

        let server = run(
            listener,
            store,
            mail,
            renderer,
            dispatcher.clone(),
            cfg.application.admin_token,
        )?;

        Ok(Self {
            port,
            server,
            dispatcher,
        })
    }

    pub fn get_port(&self) -> u16 { self.port }

    /// For the scheduled worker; runs against the same store as the API.
    pub fn dispatcher(&self) -> Dispatcher { self.dispatcher.clone() }

    /// Because this consumes `self`, this should be the final function call (or
    /// passed to `tokio::spawn`)
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> { self.server.await }
}

/// `database.backend` decides between Postgres and the in-memory store.
pub fn get_store(db_cfg: &DatabaseSettings) -> Arc<dyn SubscriptionStore> {
    match db_cfg.backend {
        StoreBackend::Postgres => Arc::new(PostgresSubscriptionStore::new(get_connection_pool(
            db_cfg,
        ))),
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; subscriptions will not survive a restart");
            Arc::new(InMemorySubscriptionStore::new())
        }
    }
}

/// Bearer token guarding `/admin/*`
#[derive(Clone)]
pub struct AdminToken(pub Secret<String>);

/// The server only listens to an already bound address.
///
/// Declares all API endpoints.
pub fn run(
    listener: TcpListener,
    store: Arc<dyn SubscriptionStore>,
    mail: Arc<dyn MailTransport>,
    renderer: Arc<EmailRenderer>,
    dispatcher: Dispatcher,
    admin_token: Secret<String>,
) -> Result<Server, anyhow::Error> {
    // `Data` is an `Arc` internally; `From<Arc<dyn T>>` keeps the trait object
    let store: Data<dyn SubscriptionStore> = Data::from(store);
    let mail: Data<dyn MailTransport> = Data::from(mail);
    let renderer = Data::from(renderer);
    let dispatcher = Data::new(dispatcher);
    let admin_token = Data::new(AdminToken(admin_token));

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .route("/subscriptions", web::post().to(subscribe))
            .route("/subscriptions/confirm", web::get().to(confirm_subscriber))
            .route(
                "/subscriptions/confirm",
                web::method(actix_web::http::Method::OPTIONS).to(confirm_preflight),
            )
            .route(
                "/subscriptions/unsubscribe",
                web::post().to(unsubscribe_subscriber),
            )
            .service(web::scope("/admin").route("/dispatch", web::post().to(trigger_dispatch)))
            .app_data(store.clone())
            .app_data(mail.clone())
            .app_data(renderer.clone())
            .app_data(dispatcher.clone())
            .app_data(admin_token.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
