use cardroom_engine::cards::Card;
use cardroom_engine::view::GameView;
use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::reply::Response;

use super::{api_error, apply, apply_reopening, persist_game, respond};
use crate::config::DEFAULT_BET_SPREAD;
use crate::errors::ApiError;
use crate::protocol::{Envelope, MessageType};
use crate::server::AppContext;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGameRequest {
    #[serde(default)]
    pub table_id: Option<String>,
    #[serde(default)]
    pub min_bet: Option<i64>,
    #[serde(default)]
    pub max_bet: Option<i64>,
}

impl NewGameRequest {
    /// Missing or non-positive minimum falls back to the default; a missing,
    /// non-positive or inverted maximum becomes `min × 100`.
    fn limits(&self, default_min: u32) -> (u32, u32) {
        let min = self
            .min_bet
            .filter(|v| *v > 0)
            .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
            .unwrap_or(default_min);
        let max = self
            .max_bet
            .filter(|v| *v > 0)
            .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
            .filter(|v| *v >= min)
            .unwrap_or_else(|| min.saturating_mul(DEFAULT_BET_SPREAD));
        (min, max)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRequest {
    pub player_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBetRequest {
    pub player_id: String,
    pub amount: u32,
}

/// `?playerId=` selecting whose balance the returned view carries.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerQuery {
    #[serde(default)]
    pub player_id: Option<String>,
}

impl ViewerQuery {
    fn viewer(&self) -> Option<&str> {
        self.player_id.as_deref().filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<Card>,
    pub game: GameView,
}

impl ActionResponse {
    fn new(game: GameView) -> Self {
        Self {
            success: true,
            card: None,
            game,
        }
    }
}

fn require_player(player_id: &str) -> Result<(), ApiError> {
    if player_id.trim().is_empty() {
        return Err(ApiError::BadRequest("playerId is required".into()));
    }
    Ok(())
}

/// Creates a game on a table.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/game/new`
///
/// # Request Format
/// ```json
/// { "tableId": "felt-1", "minBet": 10, "maxBet": 500 }
/// ```
/// Every field is optional. A missing `tableId` gets a fresh UUID.
///
/// # Response Format
/// - **201 Created**: spectator view of the new game
/// - **409 Conflict** (`table_busy`): the table already has a game that is not completed
///
/// Connections on the table receive a `gameCreated` envelope.
pub async fn create_game(ctx: AppContext, request: NewGameRequest) -> Response {
    let table_id = request
        .table_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let (min_bet, max_bet) = request.limits(ctx.config().default_min_bet);

    let created = match ctx.store().create_game(&table_id, min_bet, max_bet) {
        Ok(game) => game,
        Err(err) => return api_error(err.into()),
    };
    persist_game(&ctx, &created);

    let hub = ctx.hub();
    let view = ctx.store().update(created.id(), |game| {
        let view = game.view_for(None);
        hub.broadcast_to_table(
            game.table_id(),
            &Envelope::new(MessageType::GameCreated)
                .game(game.id())
                .table(game.table_id())
                .with_data(&view),
        );
        Ok(view)
    });
    respond(StatusCode::CREATED, view.map_err(ApiError::from))
}

/// Current state of a game as seen by `?playerId=` (spectator when absent).
///
/// # HTTP Method and Path
/// - **Method**: GET
/// - **Path**: `/api/game/{id}`
pub async fn get_game(ctx: AppContext, game_id: String, query: ViewerQuery) -> Response {
    respond(
        StatusCode::OK,
        ctx.store()
            .view(&game_id, query.viewer())
            .map_err(ApiError::from),
    )
}

/// Closes seating and opens betting (`Waiting → Betting`).
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/game/{id}/betting`
pub async fn open_betting(ctx: AppContext, game_id: String, query: ViewerQuery) -> Response {
    let result = apply(&ctx, &game_id, |game, _| game.open_betting())
        .map(|applied| ActionResponse::new(applied.game.view_for(query.viewer())));
    respond(StatusCode::OK, result)
}

/// Places or replaces a bet for the current round.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/game/{id}/bet`
///
/// # Request Format
/// ```json
/// { "playerId": "p1", "amount": 50 }
/// ```
///
/// # Error Cases
/// - `bet_out_of_range`: amount outside the table limits (details carry the limits)
/// - `insufficient_balance`: amount exceeds the player's bankroll
/// - `invalid_state`: the game is not taking bets
pub async fn place_bet(ctx: AppContext, game_id: String, request: PlaceBetRequest) -> Response {
    let result = require_player(&request.player_id).and_then(|_| {
        apply(&ctx, &game_id, |game, _| {
            game.place_bet(&request.player_id, request.amount)
        })
        .map(|applied| {
            ActionResponse::new(applied.game.view_for(Some(request.player_id.as_str())))
        })
    });
    respond(StatusCode::OK, result)
}

/// Deals the round once every seat has a bet.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/game/{id}/start`
pub async fn start_round(ctx: AppContext, game_id: String, query: ViewerQuery) -> Response {
    let result = apply(&ctx, &game_id, |game, _| game.start())
        .map(|applied| ActionResponse::new(applied.game.view_for(query.viewer())));
    respond(StatusCode::OK, result)
}

/// Draws a card for the acting player.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/game/{id}/hit`
///
/// # Request Format
/// ```json
/// { "playerId": "p1" }
/// ```
///
/// # Response Format
/// - **200 OK**: `{ "success": true, "card": {...}, "game": {...} }`
/// - **400** `not_players_turn`, `player_not_active`, `deck_empty`, `invalid_state`
pub async fn hit(ctx: AppContext, game_id: String, request: PlayerRequest) -> Response {
    let result = require_player(&request.player_id).and_then(|_| {
        apply(&ctx, &game_id, |game, _| game.hit(&request.player_id)).map(|applied| {
            ActionResponse {
                success: true,
                card: Some(applied.value),
                game: applied.game.view_for(Some(request.player_id.as_str())),
            }
        })
    });
    respond(StatusCode::OK, result)
}

/// Ends the acting player's turn. The last stand plays the dealer and settles.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/game/{id}/stand`
pub async fn stand(ctx: AppContext, game_id: String, request: PlayerRequest) -> Response {
    let result = require_player(&request.player_id).and_then(|_| {
        apply(&ctx, &game_id, |game, _| game.stand(&request.player_id)).map(|applied| {
            ActionResponse::new(applied.game.view_for(Some(request.player_id.as_str())))
        })
    });
    respond(StatusCode::OK, result)
}

/// Resets a completed game for another round (`Completed → Betting`). Refused with
/// `table_busy` once a newer game on the same table is open.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/game/{id}/next-round`
pub async fn next_round(ctx: AppContext, game_id: String, query: ViewerQuery) -> Response {
    let result = apply_reopening(&ctx, &game_id, |game, _| game.prepare_for_next_round())
        .map(|applied| ActionResponse::new(applied.game.view_for(query.viewer())));
    respond(StatusCode::OK, result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(min: Option<i64>, max: Option<i64>) -> NewGameRequest {
        NewGameRequest {
            table_id: None,
            min_bet: min,
            max_bet: max,
        }
    }

    #[test]
    fn bet_limits_fall_back_like_the_lobby_expects() {
        assert_eq!(request(None, None).limits(10), (10, 1_000));
        assert_eq!(request(Some(25), None).limits(10), (25, 2_500));
        assert_eq!(request(Some(-5), Some(0)).limits(10), (10, 1_000));
        assert_eq!(request(Some(50), Some(20)).limits(10), (50, 5_000));
        assert_eq!(request(Some(5), Some(40)).limits(10), (5, 40));
    }
}
