use serde::Serialize;
use warp::http::StatusCode;
use warp::reply::Response;

use super::success_response;
use crate::server::AppContext;

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    connections: usize,
    tables: usize,
    games: usize,
}

/// Liveness plus hub and store counts. Reports `degraded` when the hub task is gone.
pub async fn health(ctx: AppContext) -> Response {
    let stats = ctx.hub().stats().await;
    let games = ctx.store().game_count().unwrap_or(0);
    let body = HealthBody {
        status: if stats.is_some() { "ok" } else { "degraded" },
        connections: stats.map(|s| s.connections).unwrap_or(0),
        tables: stats.map(|s| s.tables).unwrap_or(0),
        games,
    };
    let status = if stats.is_some() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    success_response(status, body)
}
