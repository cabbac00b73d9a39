use cardroom_engine::game::Game;
use cardroom_engine::view::{GameView, PlayerView};
use serde::{Deserialize, Serialize};
use serde_json::json;
use warp::http::StatusCode;
use warp::reply::Response;

use super::{apply, persist_balance, persist_game, respond, PlayerRequest};
use crate::errors::ApiError;
use crate::protocol::{Envelope, MessageType};
use crate::server::AppContext;
use crate::store::{GameId, StoreError};

/// Creating a game can race another join on the same table; after this many
/// lost races the request gives up with `table_busy`.
const JOIN_ATTEMPTS: usize = 3;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTableRequest {
    pub player_id: String,
    #[serde(default)]
    pub player_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTableResponse {
    pub success: bool,
    pub player: PlayerView,
    pub game: GameView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveTableResponse {
    pub success: bool,
    pub message: &'static str,
}

/// Every table with its current (or most recent) game.
///
/// # HTTP Method and Path
/// - **Method**: GET
/// - **Path**: `/api/table/list`
pub async fn list_tables(ctx: AppContext) -> Response {
    respond(
        StatusCode::OK,
        ctx.store().list_tables().map_err(ApiError::from),
    )
}

/// Seats a player at the table's open game, creating one if the table has none.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/table/{id}/join`
///
/// # Request Format
/// ```json
/// { "playerId": "p1", "playerName": "alice" }
/// ```
/// `playerName` defaults to the id. Registered players bring their stored balance.
///
/// # Response Format
/// - **200 OK**: `{ "success": true, "player": {...}, "game": {...} }`
/// - **400** `invalid_state`: the table's game is already past seating
pub async fn join_table(ctx: AppContext, table_id: String, request: JoinTableRequest) -> Response {
    respond(StatusCode::OK, join(&ctx, &table_id, &request))
}

fn join(
    ctx: &AppContext,
    table_id: &str,
    request: &JoinTableRequest,
) -> Result<JoinTableResponse, ApiError> {
    let player_id = request.player_id.trim();
    if player_id.is_empty() {
        return Err(ApiError::BadRequest("playerId is required".into()));
    }
    if table_id.trim().is_empty() {
        return Err(ApiError::BadRequest("table id is required".into()));
    }
    let name = request
        .player_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(player_id);

    let game_id = open_game(ctx, table_id)?;
    let balance = stored_balance(ctx, player_id);

    let applied = apply(ctx, &game_id, |game, hub| {
        let already_seated = game.player(player_id).is_some();
        let seat = game.add_player(player_id, name, balance)?;
        if !already_seated {
            if let Some(public) = seat_view(game, player_id, None) {
                hub.broadcast_to_table(
                    game.table_id(),
                    &Envelope::new(MessageType::PlayerJoined)
                        .game(game.id())
                        .table(game.table_id())
                        .player(player_id)
                        .with_data(&public),
                );
            }
        }
        Ok(seat)
    })?;

    tracing::info!(
        table_id = %table_id,
        game_id = %game_id,
        player_id = %player_id,
        balance = applied.value.balance,
        "player joined table"
    );
    let player = seat_view(&applied.game, player_id, Some(player_id))
        .ok_or_else(|| ApiError::PlayerNotFound(player_id.to_string()))?;
    Ok(JoinTableResponse {
        success: true,
        player,
        game: applied.game.view_for(Some(player_id)),
    })
}

/// Id of the table's unfinished game, creating a `Waiting` one if there is none.
fn open_game(ctx: &AppContext, table_id: &str) -> Result<GameId, ApiError> {
    let config = ctx.config();
    for _ in 0..JOIN_ATTEMPTS {
        if let Some(id) = ctx.store().active_game_for_table(table_id)? {
            return Ok(id);
        }
        match ctx
            .store()
            .create_game(table_id, config.default_min_bet, config.default_max_bet)
        {
            Ok(game) => {
                persist_game(ctx, &game);
                return Ok(game.id().to_string());
            }
            Err(StoreError::TableBusy(_)) => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Err(StoreError::TableBusy(table_id.to_string()).into())
}

fn stored_balance(ctx: &AppContext, player_id: &str) -> u32 {
    match ctx.persistence().get_player(player_id) {
        Ok(Some(record)) => record.balance,
        Ok(None) => ctx.config().starting_balance,
        Err(err) => {
            tracing::warn!(player_id = %player_id, error = %err, "balance lookup failed");
            ctx.config().starting_balance
        }
    }
}

fn seat_view(game: &Game, player_id: &str, viewer: Option<&str>) -> Option<PlayerView> {
    game.view_for(viewer)
        .players
        .into_iter()
        .find(|p| p.id == player_id)
}

/// Unseats a player from the table's unfinished game.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/table/{id}/leave`
///
/// # Request Format
/// ```json
/// { "playerId": "p1" }
/// ```
///
/// # Response Format
/// - **200 OK**: `{ "success": true, "message": "Successfully left table" }`
/// - **404** `table_not_found`: no unfinished game on the table
/// - **400** `player_not_seated`
pub async fn leave_table(ctx: AppContext, table_id: String, request: PlayerRequest) -> Response {
    respond(StatusCode::OK, leave(&ctx, &table_id, &request.player_id))
}

fn leave(
    ctx: &AppContext,
    table_id: &str,
    player_id: &str,
) -> Result<LeaveTableResponse, ApiError> {
    if player_id.trim().is_empty() {
        return Err(ApiError::BadRequest("playerId is required".into()));
    }
    let game_id = ctx
        .store()
        .active_game_for_table(table_id)?
        .ok_or_else(|| StoreError::TableNotFound(table_id.to_string()))?;

    let applied = apply(ctx, &game_id, |game, hub| {
        let removed = game.remove_player(player_id)?;
        hub.broadcast_to_table(
            game.table_id(),
            &Envelope::new(MessageType::PlayerLeft)
                .game(game.id())
                .table(game.table_id())
                .player(player_id)
                .with_data(&json!({ "playerId": removed.id, "name": removed.name })),
        );
        Ok(removed)
    })?;

    persist_balance(ctx, &applied.value.id, applied.value.balance);
    tracing::info!(
        table_id = %table_id,
        game_id = %game_id,
        player_id = %player_id,
        forfeited = applied.value.bet,
        "player left table"
    );
    Ok(LeaveTableResponse {
        success: true,
        message: "Successfully left table",
    })
}
