//! Axum server bootstrap: wraps the route tree in tracing/CORS middleware
//! and serves it over a bound TCP listener.
//!
//! Grounded on `orchestrator::api::routes::create_router`'s
//! `.layer(cors_layer()).layer(logging_layer())` wrapping.

use crate::api::{create_router, AppState};
use crate::error::CliError;
use crate::middleware::{cors_layer, logging_layer};
use tracing::info;

pub async fn serve(state: AppState) -> Result<(), CliError> {
    let bind_address = state.config.bind_address.clone();

    let router = create_router(state).layer(cors_layer()).layer(logging_layer());

    let listener = tokio::net::TcpListener::bind(&bind_address).await.map_err(CliError::Server)?;
    info!(address = %bind_address, "diagram pipeline server listening");

    axum::serve(listener, router).await.map_err(CliError::Server)
}
