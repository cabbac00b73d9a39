use crate::cards::Card;
use crate::game::GameStatus;
use crate::player::{Dealer, PlayerStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-viewer projection of a game, safe to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    pub id: String,
    pub table_id: String,
    pub status: GameStatus,
    pub dealer: Dealer,
    pub min_bet: u32,
    pub max_bet: u32,
    pub players: Vec<PlayerView>,
}

/// Public seat summary. `balance` is only present on the viewer's own seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    pub hand: Vec<Card>,
    pub score: u32,
    pub status: PlayerStatus,
    pub bet: u32,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<u32>,
}

/// Row of the table listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSummary {
    pub id: String,
    pub player_count: usize,
    pub status: GameStatus,
    pub min_bet: u32,
    pub max_bet: u32,
    pub current_game: String,
    pub last_updated: DateTime<Utc>,
}
