use serde::Deserialize;
use server::{ServerState, media::MediaStore};
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use thiserror::Error;
use time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yatube_common::{
    cache::PageCache,
    clock::{Clock, SystemClock},
};
use yatube_db::client::{DbClient, DbError};

mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Error setting up database: {0}")]
    Database(#[from] DbError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    #[serde(default = "default_database_url")]
    database_url: String,
    #[serde(default = "default_media_root")]
    media_root: PathBuf,
    #[serde(default = "default_page_cache_prefix")]
    page_cache_prefix: String,
    #[serde(default = "default_page_cache_seconds")]
    page_cache_seconds: u32,
    #[serde(default = "default_session_days")]
    session_days: u16,
    #[serde(default)]
    secure_cookies: bool,
}

fn default_database_url() -> String {
    "sqlite://yatube.db?mode=rwc".to_owned()
}

fn default_media_root() -> PathBuf {
    PathBuf::from("media")
}

fn default_page_cache_prefix() -> String {
    "index_page".to_owned()
}

fn default_page_cache_seconds() -> u32 {
    20
}

fn default_session_days() -> u16 {
    14
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "yatube_api=debug,yatube_db=debug,yatube_common=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

fn spawn_shutdown_listener() -> CancellationToken {
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(err) => error!(%err, "Listening for shutdown signal failed"),
        }
        trigger.cancel();
    });

    shutdown
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let db_client = DbClient::connect(&env.database_url, clock.clone()).await?;
    db_client.migrate().await?;
    let db_client = Arc::new(db_client);

    let state = ServerState {
        db_client: db_client.clone(),
        page_cache: Arc::new(PageCache::new(
            env.page_cache_prefix,
            Duration::seconds(env.page_cache_seconds.into()),
            clock,
        )),
        media: Arc::new(MediaStore::new(env.media_root)),
        sessions: Arc::new(server::SessionSettings {
            lifetime: Duration::days(env.session_days.into()),
            secure_cookies: env.secure_cookies,
        }),
    };
    let app = server::app(state);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    let shutdown = spawn_shutdown_listener();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(InitError::TcpServe)?;

    db_client.close().await;
    Ok(())
}
