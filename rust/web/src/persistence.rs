//! Durable records: player accounts, game snapshots and per-round results.
//!
//! The in-memory game store stays authoritative. Callers treat every write here as
//! best effort and log failures instead of undoing the game change.
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, RwLock};

use cardroom_engine::game::Game;
use cardroom_engine::rules::{Outcome, Settlement};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to encode game snapshot: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),
    #[error("player already exists: {0}")]
    DuplicatePlayer(String),
    #[error("persistence lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub id: String,
    pub name: String,
    pub balance: u32,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub player_id: String,
    pub player_name: String,
    pub games_played: u32,
    /// Rounds settled as `win` or `blackjack`.
    pub games_won: u32,
    pub total_bets: u64,
    pub total_winnings: u64,
    pub last_played: Option<DateTime<Utc>>,
}

pub trait Persistence: Send + Sync + std::fmt::Debug {
    fn create_player(
        &self,
        id: &str,
        name: &str,
        balance: u32,
    ) -> Result<PlayerRecord, PersistenceError>;

    fn get_player(&self, id: &str) -> Result<Option<PlayerRecord>, PersistenceError>;

    /// Unknown ids are ignored; players may sit down without registering.
    fn update_player_balance(&self, id: &str, balance: u32) -> Result<(), PersistenceError>;

    fn touch_last_login(&self, id: &str) -> Result<(), PersistenceError>;

    /// Upserts the JSON snapshot and status of `game`.
    fn save_game(&self, game: &Game) -> Result<(), PersistenceError>;

    fn save_result(&self, game_id: &str, settlement: &Settlement)
        -> Result<(), PersistenceError>;

    /// `None` when the player was never registered.
    fn player_stats(&self, id: &str) -> Result<Option<PlayerStats>, PersistenceError>;
}

fn is_win(outcome: Outcome) -> bool {
    matches!(outcome, Outcome::Win | Outcome::Blackjack)
}

#[derive(Debug, Clone)]
struct ResultRow {
    game_id: String,
    player_id: String,
    bet: u32,
    outcome: Outcome,
    payout: u32,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct GameRow {
    status: &'static str,
    snapshot: String,
}

/// Process-local backend used when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    players: RwLock<HashMap<String, PlayerRecord>>,
    games: Mutex<HashMap<String, GameRow>>,
    results: Mutex<Vec<ResultRow>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status last written for `game_id`.
    pub fn game_status(&self, game_id: &str) -> Option<&'static str> {
        self.games
            .lock()
            .ok()
            .and_then(|games| games.get(game_id).map(|row| row.status))
    }

    pub fn game_snapshot(&self, game_id: &str) -> Option<String> {
        self.games
            .lock()
            .ok()
            .and_then(|games| games.get(game_id).map(|row| row.snapshot.clone()))
    }

    pub fn result_count(&self) -> usize {
        self.results.lock().map(|rows| rows.len()).unwrap_or(0)
    }
}

impl Persistence for MemoryPersistence {
    fn create_player(
        &self,
        id: &str,
        name: &str,
        balance: u32,
    ) -> Result<PlayerRecord, PersistenceError> {
        let mut players = self.players.write().map_err(|_| PersistenceError::Poisoned)?;
        if players.contains_key(id) {
            return Err(PersistenceError::DuplicatePlayer(id.to_string()));
        }
        let now = Utc::now();
        let record = PlayerRecord {
            id: id.to_string(),
            name: name.to_string(),
            balance,
            created_at: now,
            last_login: now,
        };
        players.insert(id.to_string(), record.clone());
        Ok(record)
    }

    fn get_player(&self, id: &str) -> Result<Option<PlayerRecord>, PersistenceError> {
        let players = self.players.read().map_err(|_| PersistenceError::Poisoned)?;
        Ok(players.get(id).cloned())
    }

    fn update_player_balance(&self, id: &str, balance: u32) -> Result<(), PersistenceError> {
        let mut players = self.players.write().map_err(|_| PersistenceError::Poisoned)?;
        if let Some(record) = players.get_mut(id) {
            record.balance = balance;
            record.last_login = Utc::now();
        }
        Ok(())
    }

    fn touch_last_login(&self, id: &str) -> Result<(), PersistenceError> {
        let mut players = self.players.write().map_err(|_| PersistenceError::Poisoned)?;
        if let Some(record) = players.get_mut(id) {
            record.last_login = Utc::now();
        }
        Ok(())
    }

    fn save_game(&self, game: &Game) -> Result<(), PersistenceError> {
        let snapshot = serde_json::to_string(game)?;
        self.games
            .lock()
            .map_err(|_| PersistenceError::Poisoned)?
            .insert(
                game.id().to_string(),
                GameRow {
                    status: game.status().as_str(),
                    snapshot,
                },
            );
        Ok(())
    }

    fn save_result(
        &self,
        game_id: &str,
        settlement: &Settlement,
    ) -> Result<(), PersistenceError> {
        self.results
            .lock()
            .map_err(|_| PersistenceError::Poisoned)?
            .push(ResultRow {
                game_id: game_id.to_string(),
                player_id: settlement.player_id.clone(),
                bet: settlement.bet,
                outcome: settlement.outcome,
                payout: settlement.payout,
                created_at: Utc::now(),
            });
        Ok(())
    }

    fn player_stats(&self, id: &str) -> Result<Option<PlayerStats>, PersistenceError> {
        let Some(player) = self.get_player(id)? else {
            return Ok(None);
        };
        let results = self.results.lock().map_err(|_| PersistenceError::Poisoned)?;
        let mine: Vec<&ResultRow> = results.iter().filter(|r| r.player_id == id).collect();

        let mut played: Vec<&str> = mine.iter().map(|r| r.game_id.as_str()).collect();
        played.sort_unstable();
        played.dedup();
        let mut won: Vec<&str> = mine
            .iter()
            .filter(|r| is_win(r.outcome))
            .map(|r| r.game_id.as_str())
            .collect();
        won.sort_unstable();
        won.dedup();

        Ok(Some(PlayerStats {
            player_id: player.id,
            player_name: player.name,
            games_played: played.len() as u32,
            games_won: won.len() as u32,
            total_bets: mine.iter().map(|r| u64::from(r.bet)).sum(),
            total_winnings: mine.iter().map(|r| u64::from(r.payout)).sum(),
            last_played: mine.iter().map(|r| r.created_at).max(),
        }))
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS players (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    balance INTEGER NOT NULL DEFAULT 1000,
    created_at TEXT NOT NULL,
    last_login TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS games (
    id TEXT PRIMARY KEY,
    table_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    status TEXT NOT NULL,
    min_bet INTEGER NOT NULL,
    max_bet INTEGER NOT NULL,
    game_state TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS game_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id TEXT NOT NULL,
    player_id TEXT NOT NULL,
    bet INTEGER NOT NULL,
    result TEXT NOT NULL,
    winnings INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_game_results_player ON game_results (player_id);
CREATE INDEX IF NOT EXISTS idx_games_table ON games (table_id);
";

/// SQLite backend. One connection, serialized behind a mutex.
#[derive(Debug)]
pub struct SqlitePersistence {
    conn: Mutex<Connection>,
}

impl SqlitePersistence {
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened sqlite database");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, PersistenceError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, PersistenceError> {
        self.conn.lock().map_err(|_| PersistenceError::Poisoned)
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(info, _)
            if info.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl Persistence for SqlitePersistence {
    fn create_player(
        &self,
        id: &str,
        name: &str,
        balance: u32,
    ) -> Result<PlayerRecord, PersistenceError> {
        let now = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO players (id, name, balance, created_at, last_login)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, name, balance, now, now],
        )
        .map_err(|err| {
            if is_unique_violation(&err) {
                PersistenceError::DuplicatePlayer(id.to_string())
            } else {
                PersistenceError::Sqlite(err)
            }
        })?;
        Ok(PlayerRecord {
            id: id.to_string(),
            name: name.to_string(),
            balance,
            created_at: now,
            last_login: now,
        })
    }

    fn get_player(&self, id: &str) -> Result<Option<PlayerRecord>, PersistenceError> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT id, name, balance, created_at, last_login FROM players WHERE id = ?1",
                params![id],
                |row| {
                    Ok(PlayerRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        balance: row.get(2)?,
                        created_at: row.get(3)?,
                        last_login: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn update_player_balance(&self, id: &str, balance: u32) -> Result<(), PersistenceError> {
        self.conn()?.execute(
            "UPDATE players SET balance = ?1, last_login = ?2 WHERE id = ?3",
            params![balance, Utc::now(), id],
        )?;
        Ok(())
    }

    fn touch_last_login(&self, id: &str) -> Result<(), PersistenceError> {
        self.conn()?.execute(
            "UPDATE players SET last_login = ?1 WHERE id = ?2",
            params![Utc::now(), id],
        )?;
        Ok(())
    }

    fn save_game(&self, game: &Game) -> Result<(), PersistenceError> {
        let snapshot = serde_json::to_string(game)?;
        self.conn()?.execute(
            "INSERT INTO games
                (id, table_id, created_at, updated_at, status, min_bet, max_bet, game_state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (id) DO UPDATE SET
                updated_at = excluded.updated_at,
                status = excluded.status,
                min_bet = excluded.min_bet,
                max_bet = excluded.max_bet,
                game_state = excluded.game_state",
            params![
                game.id(),
                game.table_id(),
                game.created_at(),
                game.updated_at(),
                game.status().as_str(),
                game.min_bet(),
                game.max_bet(),
                snapshot
            ],
        )?;
        Ok(())
    }

    fn save_result(
        &self,
        game_id: &str,
        settlement: &Settlement,
    ) -> Result<(), PersistenceError> {
        self.conn()?.execute(
            "INSERT INTO game_results (game_id, player_id, bet, result, winnings, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                game_id,
                settlement.player_id,
                settlement.bet,
                settlement.outcome.as_str(),
                settlement.payout,
                Utc::now()
            ],
        )?;
        Ok(())
    }

    fn player_stats(&self, id: &str) -> Result<Option<PlayerStats>, PersistenceError> {
        let conn = self.conn()?;
        let name: Option<String> = conn
            .query_row(
                "SELECT name FROM players WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(player_name) = name else {
            return Ok(None);
        };

        let (played, won, bets, winnings, last): (i64, i64, i64, i64, Option<DateTime<Utc>>) =
            conn.query_row(
                "SELECT
                    COUNT(DISTINCT game_id),
                    COUNT(DISTINCT CASE WHEN result IN ('win', 'blackjack') THEN game_id END),
                    COALESCE(SUM(bet), 0),
                    COALESCE(SUM(winnings), 0),
                    MAX(created_at)
                 FROM game_results WHERE player_id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )?;

        Ok(Some(PlayerStats {
            player_id: id.to_string(),
            player_name,
            games_played: u32::try_from(played).unwrap_or(u32::MAX),
            games_won: u32::try_from(won).unwrap_or(u32::MAX),
            total_bets: u64::try_from(bets).unwrap_or(0),
            total_winnings: u64::try_from(winnings).unwrap_or(0),
            last_played: last,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settlement(player: &str, bet: u32, outcome: Outcome, payout: u32) -> Settlement {
        Settlement {
            player_id: player.to_string(),
            bet,
            outcome,
            payout,
        }
    }

    fn exercise(backend: &dyn Persistence) {
        let created = backend.create_player("p1", "Alice", 1_000).unwrap();
        assert_eq!(created.balance, 1_000);
        assert!(matches!(
            backend.create_player("p1", "Again", 5),
            Err(PersistenceError::DuplicatePlayer(_))
        ));
        assert_eq!(backend.get_player("nobody").unwrap(), None);

        backend.update_player_balance("p1", 1_150).unwrap();
        backend.update_player_balance("ghost", 10).unwrap();
        backend.touch_last_login("p1").unwrap();
        let loaded = backend.get_player("p1").unwrap().unwrap();
        assert_eq!(loaded.name, "Alice");
        assert_eq!(loaded.balance, 1_150);
        assert!(loaded.last_login >= loaded.created_at);

        let game = Game::new("t1", 10, 1_000);
        backend.save_game(&game).unwrap();
        backend.save_game(&game).unwrap();

        backend
            .save_result("g1", &settlement("p1", 100, Outcome::Blackjack, 250))
            .unwrap();
        backend
            .save_result("g2", &settlement("p1", 50, Outcome::Lose, 0))
            .unwrap();
        backend
            .save_result("g3", &settlement("p1", 40, Outcome::Win, 80))
            .unwrap();
        backend
            .save_result("g3", &settlement("p2", 40, Outcome::Win, 80))
            .unwrap();

        let stats = backend.player_stats("p1").unwrap().unwrap();
        assert_eq!(stats.player_name, "Alice");
        assert_eq!(stats.games_played, 3);
        assert_eq!(stats.games_won, 2);
        assert_eq!(stats.total_bets, 190);
        assert_eq!(stats.total_winnings, 330);
        assert!(stats.last_played.is_some());

        assert_eq!(backend.player_stats("p2").unwrap(), None);
    }

    #[test]
    fn memory_backend_round_trip() {
        let backend = MemoryPersistence::new();
        exercise(&backend);
        assert_eq!(backend.result_count(), 4);

        let game = Game::new("t9", 10, 100);
        backend.save_game(&game).unwrap();
        assert_eq!(backend.game_status(game.id()), Some("waiting"));
        let snapshot: serde_json::Value =
            serde_json::from_str(&backend.game_snapshot(game.id()).unwrap()).unwrap();
        assert_eq!(snapshot["tableId"], "t9");
        assert!(snapshot.get("deck").is_none());
    }

    #[test]
    fn sqlite_backend_round_trip() {
        let backend = SqlitePersistence::open_in_memory().unwrap();
        exercise(&backend);
    }

    #[test]
    fn sqlite_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cardroom.db");
        {
            let backend = SqlitePersistence::open(&path).unwrap();
            backend.create_player("p1", "Alice", 700).unwrap();
        }
        let reopened = SqlitePersistence::open(&path).unwrap();
        assert_eq!(reopened.get_player("p1").unwrap().unwrap().balance, 700);
    }

    #[test]
    fn stats_for_player_without_results() {
        let backend = SqlitePersistence::open_in_memory().unwrap();
        backend.create_player("p1", "Alice", 1_000).unwrap();
        let stats = backend.player_stats("p1").unwrap().unwrap();
        assert_eq!(stats.games_played, 0);
        assert_eq!(stats.total_bets, 0);
        assert_eq!(stats.last_played, None);
    }
}
