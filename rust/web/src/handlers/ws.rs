use serde::Deserialize;
use warp::ws::Ws;
use warp::Reply;

use crate::client;
use crate::server::AppContext;

/// `?playerId=&tableId=` identifying the connection. An empty `playerId` joins
/// as a spectator.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    #[serde(default)]
    pub player_id: String,
    #[serde(default)]
    pub table_id: String,
}

/// Upgrades to a websocket subscribed to one table.
///
/// # HTTP Method and Path
/// - **Method**: GET
/// - **Path**: `/ws?playerId={player}&tableId={table}`
///
/// The first frame is a `welcome` envelope; afterwards the connection receives
/// every envelope broadcast to its table and any sent to its player.
pub fn upgrade(ws: Ws, query: WsQuery, ctx: AppContext) -> impl Reply {
    let cfg = ctx.config().ws;
    let hub = ctx.hub().clone();
    tracing::info!(
        table_id = %query.table_id,
        player_id = %query.player_id,
        "websocket upgrade"
    );
    ws.max_message_size(cfg.max_message_size)
        .on_upgrade(move |socket| {
            client::serve(socket, hub, query.table_id, query.player_id, cfg)
        })
}
