use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::reply::Response;

use super::respond;
use crate::errors::ApiError;
use crate::persistence::PlayerRecord;
use crate::server::AppContext;

#[derive(Debug, Deserialize)]
pub struct RegisterPlayerRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct RegisteredPlayer {
    pub id: String,
    pub name: String,
    pub balance: u32,
}

/// Creates a player account with the configured starting bankroll.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/player/register`
///
/// # Request Format
/// ```json
/// { "name": "alice" }
/// ```
///
/// # Response Format
/// - **201 Created**: `{ "id": "...", "name": "alice", "balance": 1000 }`
/// - **400 Bad Request**: empty name
pub async fn register_player(ctx: AppContext, request: RegisterPlayerRequest) -> Response {
    let result = register(&ctx, &request);
    respond(StatusCode::CREATED, result)
}

fn register(
    ctx: &AppContext,
    request: &RegisterPlayerRequest,
) -> Result<RegisteredPlayer, ApiError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name is required".into()));
    }
    let id = uuid::Uuid::new_v4().to_string();
    let record = ctx
        .persistence()
        .create_player(&id, name, ctx.config().starting_balance)?;
    tracing::info!(player_id = %record.id, name = %record.name, "player registered");
    Ok(RegisteredPlayer {
        id: record.id,
        name: record.name,
        balance: record.balance,
    })
}

/// Account record, refreshing its last login.
///
/// # HTTP Method and Path
/// - **Method**: GET
/// - **Path**: `/api/player/{id}`
pub async fn get_player(ctx: AppContext, player_id: String) -> Response {
    respond(StatusCode::OK, lookup(&ctx, &player_id))
}

fn lookup(ctx: &AppContext, player_id: &str) -> Result<PlayerRecord, ApiError> {
    let record = ctx
        .persistence()
        .get_player(player_id)?
        .ok_or_else(|| ApiError::PlayerNotFound(player_id.to_string()))?;
    if let Err(err) = ctx.persistence().touch_last_login(player_id) {
        tracing::warn!(player_id = %player_id, error = %err, "failed to record login");
    }
    Ok(record)
}

/// Lifetime totals over every settled round.
///
/// # HTTP Method and Path
/// - **Method**: GET
/// - **Path**: `/api/player/{id}/stats`
pub async fn get_player_stats(ctx: AppContext, player_id: String) -> Response {
    let result = ctx
        .persistence()
        .player_stats(&player_id)
        .map_err(ApiError::from)
        .and_then(|stats| stats.ok_or_else(|| ApiError::PlayerNotFound(player_id.clone())));
    respond(StatusCode::OK, result)
}
