use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware, Extension, Router};
use axum_server::tls_rustls::RustlsConfig;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod address;
mod config;
mod enrich;
mod error;
mod lookup;
mod render;
mod response;
mod routes;

use enrich::Lookups;
use lookup::dns::HickoryReverseDns;
use lookup::location::{HttpLocator, MaxMindLocator, UnconfiguredLocator};
use lookup::useragent::{RegexUserAgentParser, UapUserAgentParser};
use lookup::whois::TcpWhoisClient;
use lookup::{GeoLocator, UserAgentParser};
use routes::TlsConnection;

#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub lookups: Lookups,
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

fn build_router(state: AppState, tls: bool) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/json", get(routes::myip::json))
        .fallback_service(ServeDir::new(&state.config.static_dir))
        // Wraps every route and the static fallback, so script clients get text on any path
        .layer(middleware::from_fn_with_state(
            state.clone(),
            routes::myip::script_clients,
        ));

    let router = if tls {
        router.layer(Extension(TlsConnection))
    } else {
        router
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

fn build_lookups(config: &config::AppConfig) -> Lookups {
    let location: Arc<dyn GeoLocator> = if let Some(path) = &config.geoip_db {
        Arc::new(MaxMindLocator::open(Path::new(path)).expect("Failed to open GeoIP database"))
    } else if let Some(url) = &config.geo_api_url {
        Arc::new(HttpLocator::new(url.clone()))
    } else {
        tracing::warn!("No geolocation source configured");
        Arc::new(UnconfiguredLocator)
    };

    let user_agent: Arc<dyn UserAgentParser> = match &config.ua_regexes {
        Some(path) => Arc::new(
            UapUserAgentParser::from_yaml(Path::new(path))
                .expect("Failed to load user agent database"),
        ),
        None => Arc::new(RegexUserAgentParser::new()),
    };

    Lookups {
        dns: Arc::new(
            HickoryReverseDns::from_system_conf().expect("Failed to create DNS resolver"),
        ),
        whois: Arc::new(TcpWhoisClient::new(config.whois_server.clone())),
        location,
        user_agent,
        timeout: config.lookup_timeout(),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("myip=info,tower_http=info")),
        )
        .init();

    dotenvy::dotenv().ok();

    let config = config::AppConfig::from_env().expect("Failed to load config");

    let state = AppState {
        config: config.clone(),
        lookups: build_lookups(&config),
    };

    let tls_handle = axum_server::Handle::new();
    if let Some((cert, key)) = config.tls_paths() {
        let tls_config = RustlsConfig::from_pem_file(cert, key)
            .await
            .expect("Failed to load TLS certificate");
        let tls_addr: SocketAddr = format!("{}:{}", config.host, config.tls_port)
            .parse()
            .expect("Invalid TLS listen address");
        let app = build_router(state.clone(), true);
        let handle = tls_handle.clone();

        tracing::info!("Starting TLS server on {tls_addr}");
        tokio::spawn(async move {
            if let Err(e) = axum_server::bind_rustls(tls_addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await
            {
                tracing::error!("TLS server error: {e}");
            }
        });
    }

    let app = build_router(state, false);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    tls_handle.graceful_shutdown(Some(Duration::from_secs(10)));
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install signal handler");
    tracing::info!("Shutting down...");
}
