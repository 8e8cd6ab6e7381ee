//! API HTTP de statut, en lecture seule

use crate::models::{BannedIp, Problem};
use crate::store::Store;
use crate::workers::wait_for_shutdown;
use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use log::{error, info};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::watch;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub cursor: i64,
    pub active_bans: usize,
    pub active_rules: usize,
    pub problems: usize,
}

/// Erreur de la base locale, renvoyée en 500
pub struct ApiError(crate::error::WatchdogError);

impl From<crate::error::WatchdogError> for ApiError {
    fn from(e: crate::error::WatchdogError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Erreur lors du traitement d'une requête de statut: {}", self.0);
        let body = Json(ApiResponse {
            success: false,
            message: self.0.to_string(),
        });
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

pub fn create_router(store: Store) -> Router {
    Router::new()
        .route("/api/v1/status", get(status))
        .route("/api/v1/bans", get(list_bans))
        .route("/api/v1/problems", get(list_problems))
        .with_state(store)
}

async fn status(State(store): State<Store>) -> Result<Json<StatusResponse>, ApiError> {
    Ok(Json(StatusResponse {
        cursor: store.cursor()?,
        active_bans: store.active_bans(Utc::now())?.len(),
        active_rules: store.active_rules()?.len(),
        problems: store.problems()?.len(),
    }))
}

async fn list_bans(State(store): State<Store>) -> Result<Json<Vec<BannedIp>>, ApiError> {
    Ok(Json(store.active_bans(Utc::now())?))
}

async fn list_problems(State(store): State<Store>) -> Result<Json<Vec<Problem>>, ApiError> {
    Ok(Json(store.problems()?))
}

/// Sert l'API sur `addr` jusqu'au signal d'arrêt
pub async fn serve(addr: &str, store: Store, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Impossible d'écouter sur {}", addr))?;
    serve_listener(listener, store, async move { wait_for_shutdown(&mut shutdown).await }).await
}

/// Sert l'API sur un socket déjà ouvert
pub async fn serve_listener<F>(listener: TcpListener, store: Store, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let local = listener.local_addr()?;
    info!("API de statut disponible sur http://{}", local);

    axum::serve(listener, create_router(store))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Erreur du serveur de statut")?;

    info!("API de statut arrêtée");
    Ok(())
}
