use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use clap::Parser;
use serde::Deserialize;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toplist_gateway::config::Config;
use toplist_gateway::fanout::Coordinator;
use toplist_gateway::format::OutputFormat;
use toplist_gateway::Error;
use toplist_middleware::{BackendKind, MiddlewareFactory};

struct AppState {
    coordinator: Coordinator,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::parse();
    tracing::info!(
        backend = %config.backend,
        redis_url = %config.redis_url,
        services = %config.services,
        "Starting toplist-gateway"
    );

    let backend: BackendKind = config.backend.parse().map_err(anyhow::Error::msg)?;
    let transport = MiddlewareFactory::create_transport(backend, &config.redis_url).await?;
    let cache = MiddlewareFactory::create_cache(backend, &config.redis_url).await?;
    let coordinator = Coordinator::new(transport, cache, config.pipeline()?);

    let state = Arc::new(AppState { coordinator });
    let app = Router::new().route("/", get(top_list)).with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct TopListQuery {
    limit: i64,
    timestamp: Option<i64>,
    format: Option<String>,
}

/// GET /: the thin front door over the pipeline. Validates parameters and
/// maps errors to status codes; everything else happens in the coordinator.
async fn top_list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TopListQuery>,
) -> Response {
    if query.limit < 1 {
        return error_response(StatusCode::BAD_REQUEST, "limit must be >= 1");
    }
    let format = match query.format.as_deref().map(str::parse::<OutputFormat>) {
        None => OutputFormat::Json,
        Some(Ok(format)) => format,
        Some(Err(message)) => return error_response(StatusCode::BAD_REQUEST, &message),
    };

    match state
        .coordinator
        .handle_request(query.limit as usize, query.timestamp, format)
        .await
    {
        Ok(body) => {
            let content_type = match format {
                OutputFormat::Json => "application/json",
                OutputFormat::Csv => "text/csv",
            };
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(e @ (Error::Transport(_) | Error::CorrelationTimeout { .. })) => {
            tracing::error!(error = %e, "upstream failure");
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "upstream data services unavailable",
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "request failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
