//! Lead Router
//!
//! Routes leads extracted from incoming documents to paying regional
//! subscribers:
//! - Document ingestion into leads
//! - Immediate or deferred distribution per region
//! - Hourly sweep of due distributions
//! - Daily payment reconciliation and billing webhooks

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};

use api::{router, AppState};
use integrations::{
    BillingConfig, DocumentSourceConfig, HttpBillingProvider, HttpDocumentSource, HttpMailer,
    MailConfig,
};
use jobq::{MemoryQueueStore, PgQueueStore, QueueRuntime, QueueStore};
use lead_store::{DatabaseConfig, MemoryStore, PgStore, Store};
use telemetry::{health, init_tracing_from_env};
use worker::{
    register_workers, schedule_recurring, AccountService, AdminAlertReporter, ScheduleConfig,
    Schedules, Services, WorkerConfig,
};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    #[serde(default)]
    database: DatabaseConfig,

    #[serde(default)]
    queue: WorkerConfig,

    #[serde(default)]
    schedules: ScheduleConfig,

    #[serde(default)]
    document_source: DocumentSourceConfig,

    #[serde(default)]
    billing: BillingConfig,

    #[serde(default)]
    mail: MailConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: DatabaseConfig::default(),
            queue: WorkerConfig::default(),
            schedules: ScheduleConfig::default(),
            document_source: DocumentSourceConfig::default(),
            billing: BillingConfig::default(),
            mail: MailConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting Lead Router v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;

    // Parse schedules before touching any external system
    let schedules = Schedules::try_from(&config.schedules).context("Invalid job schedule")?;

    let (store, queue_store) = open_stores(&config.database).await?;

    let services = Services {
        store: store.clone(),
        billing: Arc::new(
            HttpBillingProvider::new(&config.billing).context("Failed to create billing client")?,
        ),
        mailer: Arc::new(HttpMailer::new(&config.mail).context("Failed to create mail client")?),
        documents: Arc::new(
            HttpDocumentSource::new(&config.document_source)
                .context("Failed to create document source client")?,
        ),
    };

    let mut runtime = QueueRuntime::new(queue_store, config.queue.runtime_config());
    match config.mail.admin_email.as_deref().filter(|e| !e.trim().is_empty()) {
        Some(admin) => {
            runtime = runtime.with_failure_reporter(Arc::new(AdminAlertReporter::new(
                services.mailer.clone(),
                admin,
            )));
            info!(admin_email = %admin, "Admin alerts enabled");
        }
        None => warn!("No admin email configured, permanently failed jobs are only logged"),
    }
    let runtime = Arc::new(runtime);

    register_workers(&runtime, &services, &config.queue).context("Failed to register workers")?;
    schedule_recurring(&runtime, &schedules)
        .await
        .context("Failed to register recurring jobs")?;
    runtime.start();

    let accounts = Arc::new(AccountService::new(
        store.clone(),
        services.billing.clone(),
        services.mailer.clone(),
    ));
    let app = router(AppState::new(store, runtime.clone(), accounts));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");

    // Let in-flight jobs finish; unstarted ones stay queued
    runtime.shutdown().await;

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("LEADROUTER")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Conventional variable used by sqlx tooling and most hosts
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.database.url = url;
    }

    Ok(config)
}

/// Open the lead store and the job store, creating tables when configured.
async fn open_stores(
    config: &DatabaseConfig,
) -> Result<(Arc<dyn Store>, Arc<dyn QueueStore>)> {
    if config.is_memory() {
        warn!("Using the in-memory store, nothing survives a restart");
        health().database.set_healthy();
        return Ok((
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryQueueStore::new()),
        ));
    }

    let pool = lead_store::connect(config)
        .await
        .context("Failed to connect to Postgres")?;

    let queue = PgQueueStore::new(pool.clone());
    if config.run_migrations {
        lead_store::health::init_schema(&pool)
            .await
            .context("Failed to initialize lead schema")?;
        queue
            .init_schema()
            .await
            .context("Failed to initialize job schema")?;
    }

    if lead_store::health::check_connection(&pool).await {
        info!("Postgres connection: healthy");
    } else {
        error!("Postgres connection: unhealthy");
    }

    Ok((Arc::new(PgStore::new(pool)), Arc::new(queue)))
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
