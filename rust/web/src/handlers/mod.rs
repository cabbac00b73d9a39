pub mod game;
pub mod health;
pub mod player;
pub mod table;
pub mod ws;

pub use game::{
    create_game, get_game, hit, next_round, open_betting, place_bet, stand, start_round,
    ActionResponse, NewGameRequest, PlaceBetRequest, PlayerRequest, ViewerQuery,
};
pub use health::health;
pub use player::{get_player, get_player_stats, register_player, RegisterPlayerRequest};
pub use table::{join_table, leave_table, list_tables, JoinTableRequest};
pub use ws::{upgrade, WsQuery};

use cardroom_engine::errors::GameError;
use cardroom_engine::game::{Game, GameStatus};
use serde::Serialize;
use warp::http::StatusCode;
use warp::reply::{self, Response};
use warp::Reply;

use crate::errors::{ApiError, IntoErrorResponse};
use crate::hub::Hub;
use crate::server::AppContext;

pub(crate) fn success_response<T>(status: StatusCode, body: T) -> Response
where
    T: Serialize,
{
    reply::with_status(reply::json(&body), status).into_response()
}

pub(crate) fn api_error(err: ApiError) -> Response {
    err.into_http_response()
}

pub(crate) fn respond<T: Serialize>(status: StatusCode, result: Result<T, ApiError>) -> Response {
    match result {
        Ok(body) => success_response(status, body),
        Err(err) => api_error(err),
    }
}

/// Outcome of one mutation, with the game as it was when the lock was released.
pub(crate) struct Applied<T> {
    pub value: T,
    pub game: Game,
    pub completed_round: bool,
}

/// Mutates a game under its lock and publishes a `gameUpdate` before unlocking.
///
/// `op` may broadcast further envelopes through the hub it is handed; they are
/// enqueued ahead of the game update. Durable writes happen after the lock is
/// released and never fail the request.
pub(crate) fn apply<T, F>(ctx: &AppContext, game_id: &str, op: F) -> Result<Applied<T>, ApiError>
where
    F: FnOnce(&mut Game, &Hub) -> Result<T, GameError>,
{
    let hub = ctx.hub();
    let applied = ctx
        .store()
        .update(game_id, |game| publish(game, hub, op))?;
    Ok(persist(ctx, applied))
}

/// [`apply`] for operations that leave `Completed`; refused with `table_busy` while
/// another game on the same table is open.
pub(crate) fn apply_reopening<T, F>(
    ctx: &AppContext,
    game_id: &str,
    op: F,
) -> Result<Applied<T>, ApiError>
where
    F: FnOnce(&mut Game, &Hub) -> Result<T, GameError>,
{
    let hub = ctx.hub();
    let applied = ctx
        .store()
        .reopen(game_id, |game| publish(game, hub, op))?;
    Ok(persist(ctx, applied))
}

fn publish<T, F>(game: &mut Game, hub: &Hub, op: F) -> Result<Applied<T>, GameError>
where
    F: FnOnce(&mut Game, &Hub) -> Result<T, GameError>,
{
    let before = game.status();
    let value = op(game, hub)?;
    hub.broadcast_game_update(game);
    let completed_round = before != GameStatus::Completed
        && game.status() == GameStatus::Completed
        && !game.settlements().is_empty();
    Ok(Applied {
        value,
        game: game.clone(),
        completed_round,
    })
}

fn persist<T>(ctx: &AppContext, applied: Applied<T>) -> Applied<T> {
    persist_game(ctx, &applied.game);
    if applied.completed_round {
        persist_settlements(ctx, &applied.game);
    }
    applied
}

pub(crate) fn persist_game(ctx: &AppContext, game: &Game) {
    if let Err(err) = ctx.persistence().save_game(game) {
        tracing::warn!(game_id = %game.id(), error = %err, "failed to persist game snapshot");
    }
}

fn persist_settlements(ctx: &AppContext, game: &Game) {
    let persistence = ctx.persistence();
    for settlement in game.settlements() {
        if let Err(err) = persistence.save_result(game.id(), settlement) {
            tracing::warn!(
                game_id = %game.id(),
                player_id = %settlement.player_id,
                error = %err,
                "failed to persist round result"
            );
        }
    }
    for player in game.players() {
        persist_balance(ctx, &player.id, player.balance);
    }
    tracing::info!(
        game_id = %game.id(),
        table_id = %game.table_id(),
        dealer_score = game.dealer().score,
        settled = game.settlements().len(),
        "round settled"
    );
}

pub(crate) fn persist_balance(ctx: &AppContext, player_id: &str, balance: u32) {
    if let Err(err) = ctx.persistence().update_player_balance(player_id, balance) {
        tracing::warn!(player_id = %player_id, error = %err, "failed to persist balance");
    }
}
