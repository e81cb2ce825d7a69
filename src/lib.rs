#[macro_use]
extern crate rocket;

use std::time::Duration;

use error::BackendError;
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedHeaders, AllowedOrigins};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::config::{Config, StorageBackend};
use crate::error::ConfigurationError;
use crate::feed::ChangeFeed;
use crate::payment::{PaymentGateway, SimulatedGateway};
use crate::route::mount_api;
use crate::security::Security;
use crate::store::{MemoryStore, MongoStore, StoreHandle};

pub mod config;
pub mod data;
pub mod error;
pub mod feed;
pub mod middleware;
pub mod payment;
pub mod resp;
pub mod role;
pub mod route;
pub mod security;
pub mod store;
pub mod util;

pub fn init_logging(log_level: Level) {
    if let Err(err) = tracing_log::LogTracer::init() {
        eprintln!("Unable to forward log records: {}", err);
    }

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Unable to set global logger: {}", err);
    };
}

pub async fn create(log_level: Option<Level>) -> Result<Rocket<Build>, BackendError> {
    if let Some(l) = log_level {
        init_logging(l);
    }

    tracing::info!("Reading .env file...");
    if dotenv::dotenv().is_err() {
        tracing::warn!("Unable to load .env file.");
    }

    tracing::info!("Loading configuration...");
    let c = match Config::load() {
        Ok(c) => {
            tracing::info!("Configuration loaded.");
            c
        }
        Err(ConfigurationError::NotFound(_)) => {
            let c = Config::default();
            if c.save().is_err() {
                tracing::warn!("Unable to save generated configuration.");
            }
            c
        }
        Err(other) => {
            tracing::error!("Configuration error: {}", other);
            return Err(other.into());
        }
    };

    tracing::info!("Initializing security information...");
    let security = Security::load(&c)?;

    create_with(c, security).await
}

/// Builds the server from already loaded configuration and security information.
pub async fn create_with(c: Config, security: Security) -> Result<Rocket<Build>, BackendError> {
    let store = match c.storage {
        StorageBackend::MongoDb => StoreHandle::new(MongoStore::connect(&c).await?),
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage. Data won't survive a restart.");
            StoreHandle::new(MemoryStore::new())
        }
    };

    if c.seed_sample_data && store.list_courses().await?.is_empty() {
        tracing::info!("Catalog is empty, seeding sample courses...");
        data::sample::seed_samples(&*store).await?;
    }

    let feed = ChangeFeed::new(c.feed_capacity);
    let payments: Box<dyn PaymentGateway> = Box::new(SimulatedGateway::new(
        Duration::from_millis(c.payment_delay_ms),
    ));

    tracing::info!("Starting HTTP server...");
    let mut r = rocket::build()
        .manage(c)
        .manage(security)
        .manage(store)
        .manage(feed)
        .manage(payments);

    tracing::info!("Setting up CORS...");
    let cors = rocket_cors::CorsOptions {
        allowed_origins: AllowedOrigins::All,
        allowed_methods: vec![Method::Get, Method::Put, Method::Post, Method::Delete]
            .into_iter()
            .map(From::from)
            .collect(),
        allowed_headers: AllowedHeaders::All,
        allow_credentials: true,
        ..Default::default()
    }
    .to_cors()?;

    r = r.attach(cors);
    r = mount_api(r);

    Ok(r)
}
