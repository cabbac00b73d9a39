//! Authoritative in-memory game state.
//!
//! Each game sits behind its own mutex so unrelated tables never contend, while two
//! requests against the same game are applied one after the other. Locks are always
//! taken in the order `tables`, `games`, then a single game.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use cardroom_engine::errors::GameError;
use cardroom_engine::game::{Game, GameStatus};
use cardroom_engine::view::{GameView, TableSummary};
use thiserror::Error;

pub type GameId = String;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("game not found: {0}")]
    GameNotFound(GameId),
    #[error("table not found: {0}")]
    TableNotFound(String),
    #[error("table {0} already has a game that is not completed")]
    TableBusy(String),
    #[error(transparent)]
    Rule(#[from] GameError),
    #[error("game storage lock poisoned")]
    StoragePoisoned,
}

type SharedGame = Arc<Mutex<Game>>;

#[derive(Debug, Default)]
pub struct GameStore {
    games: RwLock<HashMap<GameId, SharedGame>>,
    /// Game ids per table, oldest first.
    tables: RwLock<HashMap<String, Vec<GameId>>>,
}

impl GameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// New `Waiting` game with a freshly shuffled deck.
    pub fn create_game(
        &self,
        table_id: &str,
        min_bet: u32,
        max_bet: u32,
    ) -> Result<Game, StoreError> {
        self.insert(Game::new(table_id, min_bet, max_bet))
    }

    /// Adds a prepared game, refusing if its table still has one that is not completed.
    pub fn insert(&self, game: Game) -> Result<Game, StoreError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StoreError::StoragePoisoned)?;
        let table_id = game.table_id().to_string();

        if let Some(ids) = tables.get(&table_id) {
            if self.first_active(ids)?.is_some() {
                return Err(StoreError::TableBusy(table_id));
            }
        }

        let game_id = game.id().to_string();
        let snapshot = game.clone();
        self.games
            .write()
            .map_err(|_| StoreError::StoragePoisoned)?
            .insert(game_id.clone(), Arc::new(Mutex::new(game)));
        tables.entry(table_id.clone()).or_default().push(game_id.clone());

        tracing::info!(
            game_id = %game_id,
            table_id = %table_id,
            min_bet = snapshot.min_bet(),
            max_bet = snapshot.max_bet(),
            "game created"
        );
        Ok(snapshot)
    }

    fn shared(&self, game_id: &str) -> Result<SharedGame, StoreError> {
        let guard = self
            .games
            .read()
            .map_err(|_| StoreError::StoragePoisoned)?;
        guard
            .get(game_id)
            .cloned()
            .ok_or_else(|| StoreError::GameNotFound(game_id.to_string()))
    }

    pub fn get(&self, game_id: &str) -> Result<Game, StoreError> {
        let shared = self.shared(game_id)?;
        let game = shared.lock().map_err(|_| StoreError::StoragePoisoned)?;
        Ok(game.clone())
    }

    pub fn view(&self, game_id: &str, viewer: Option<&str>) -> Result<GameView, StoreError> {
        let shared = self.shared(game_id)?;
        let game = shared.lock().map_err(|_| StoreError::StoragePoisoned)?;
        Ok(game.view_for(viewer))
    }

    /// Runs `op` with exclusive access to the game.
    ///
    /// Nothing else can observe or change the game until `op` returns, so anything
    /// `op` publishes (such as a hub broadcast) is ordered with the mutation itself.
    pub fn update<T, F>(&self, game_id: &str, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Game) -> Result<T, GameError>,
    {
        let shared = self.shared(game_id)?;
        let mut game = shared.lock().map_err(|_| StoreError::StoragePoisoned)?;
        let before = game.status();
        let result = op(&mut game);
        match &result {
            Ok(_) if game.status() != before => tracing::debug!(
                game_id = %game_id,
                from = before.as_str(),
                to = game.status().as_str(),
                "game status changed"
            ),
            Ok(_) => {}
            Err(err) => tracing::debug!(game_id = %game_id, error = %err, "game update rejected"),
        }
        Ok(result?)
    }

    /// [`update`](Self::update) for operations that take a game out of `Completed`.
    ///
    /// The table index stays write-locked for the whole call, and the game is only
    /// handed to `op` while no other game on its table is open.
    pub fn reopen<T, F>(&self, game_id: &str, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Game) -> Result<T, GameError>,
    {
        let tables = self
            .tables
            .write()
            .map_err(|_| StoreError::StoragePoisoned)?;
        let table_id = self
            .shared(game_id)?
            .lock()
            .map_err(|_| StoreError::StoragePoisoned)?
            .table_id()
            .to_string();

        if let Some(ids) = tables.get(&table_id) {
            let others: Vec<GameId> = ids.iter().filter(|id| *id != game_id).cloned().collect();
            if self.first_active(&others)?.is_some() {
                tracing::debug!(game_id = %game_id, table_id = %table_id, "reopen refused");
                return Err(StoreError::TableBusy(table_id));
            }
        }
        self.update(game_id, op)
    }

    fn first_active(&self, ids: &[GameId]) -> Result<Option<SharedGame>, StoreError> {
        let games = self
            .games
            .read()
            .map_err(|_| StoreError::StoragePoisoned)?;
        for id in ids {
            if let Some(shared) = games.get(id) {
                let status = shared
                    .lock()
                    .map_err(|_| StoreError::StoragePoisoned)?
                    .status();
                if status != GameStatus::Completed {
                    return Ok(Some(Arc::clone(shared)));
                }
            }
        }
        Ok(None)
    }

    /// Id of the table's game that is not completed, if any.
    pub fn active_game_for_table(&self, table_id: &str) -> Result<Option<GameId>, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::StoragePoisoned)?;
        let Some(ids) = tables.get(table_id) else {
            return Ok(None);
        };
        match self.first_active(ids)? {
            Some(shared) => {
                let game = shared.lock().map_err(|_| StoreError::StoragePoisoned)?;
                Ok(Some(game.id().to_string()))
            }
            None => Ok(None),
        }
    }

    pub fn table_games(&self, table_id: &str) -> Result<Vec<GameId>, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::StoragePoisoned)?;
        tables
            .get(table_id)
            .cloned()
            .ok_or_else(|| StoreError::TableNotFound(table_id.to_string()))
    }

    /// One row per table: its active game, else its most recent one. Sorted by table id.
    pub fn list_tables(&self) -> Result<Vec<TableSummary>, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::StoragePoisoned)?;
        let mut rows = Vec::with_capacity(tables.len());
        for ids in tables.values() {
            let chosen = match self.first_active(ids)? {
                Some(shared) => Some(shared),
                None => match ids.last() {
                    Some(last) => Some(self.shared(last)?),
                    None => None,
                },
            };
            if let Some(shared) = chosen {
                let game = shared.lock().map_err(|_| StoreError::StoragePoisoned)?;
                rows.push(game.summary());
            }
        }
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    pub fn remove_game(&self, game_id: &str) -> Result<Game, StoreError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StoreError::StoragePoisoned)?;
        let shared = self
            .games
            .write()
            .map_err(|_| StoreError::StoragePoisoned)?
            .remove(game_id)
            .ok_or_else(|| StoreError::GameNotFound(game_id.to_string()))?;
        let game = shared
            .lock()
            .map_err(|_| StoreError::StoragePoisoned)?
            .clone();

        if let Some(ids) = tables.get_mut(game.table_id()) {
            ids.retain(|id| id != game_id);
            if ids.is_empty() {
                tables.remove(game.table_id());
            }
        }
        tracing::info!(game_id = %game_id, table_id = %game.table_id(), "game removed");
        Ok(game)
    }

    pub fn game_count(&self) -> Result<usize, StoreError> {
        Ok(self
            .games
            .read()
            .map_err(|_| StoreError::StoragePoisoned)?
            .len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn seated(store: &GameStore, table: &str) -> String {
        let game = store.create_game(table, 10, 1_000).unwrap();
        store
            .update(game.id(), |g| {
                g.add_player("p1", "One", 1_000)?;
                g.open_betting()
            })
            .unwrap();
        game.id().to_string()
    }

    #[test]
    fn create_and_get_snapshot() {
        let store = GameStore::new();
        let game = store.create_game("t1", 10, 1_000).unwrap();
        let fetched = store.get(game.id()).unwrap();
        assert_eq!(fetched.id(), game.id());
        assert_eq!(fetched.status(), GameStatus::Waiting);
        assert!(matches!(
            store.get("missing"),
            Err(StoreError::GameNotFound(_))
        ));
    }

    #[test]
    fn table_holds_one_unfinished_game() {
        let store = GameStore::new();
        let first = store.create_game("t1", 10, 1_000).unwrap();
        assert!(matches!(
            store.create_game("t1", 10, 1_000),
            Err(StoreError::TableBusy(_))
        ));
        assert_eq!(
            store.active_game_for_table("t1").unwrap().as_deref(),
            Some(first.id())
        );

        // Seating and removing the only player completes the game.
        store
            .update(first.id(), |g| {
                g.add_player("p", "P", 100)?;
                g.remove_player("p").map(|_| ())
            })
            .unwrap();
        assert_eq!(store.active_game_for_table("t1").unwrap(), None);

        let second = store.create_game("t1", 10, 1_000).unwrap();
        assert_eq!(
            store.table_games("t1").unwrap(),
            vec![first.id().to_string(), second.id().to_string()]
        );
    }

    #[test]
    fn completed_game_cannot_reopen_beside_an_open_one() {
        let store = GameStore::new();
        let first = store.create_game("t1", 10, 1_000).unwrap();
        store
            .update(first.id(), |g| {
                g.add_player("p", "P", 100)?;
                g.remove_player("p").map(|_| ())
            })
            .unwrap();
        let second = store.create_game("t1", 10, 1_000).unwrap();

        let err = store
            .reopen(first.id(), |g| g.prepare_for_next_round())
            .unwrap_err();
        assert!(matches!(err, StoreError::TableBusy(ref t) if t == "t1"));
        assert_eq!(store.get(first.id()).unwrap().status(), GameStatus::Completed);
        assert_eq!(
            store.active_game_for_table("t1").unwrap().as_deref(),
            Some(second.id())
        );

        store.remove_game(second.id()).unwrap();
        store
            .reopen(first.id(), |g| g.prepare_for_next_round())
            .unwrap();
        assert_eq!(store.get(first.id()).unwrap().status(), GameStatus::Betting);
    }

    #[test]
    fn rejected_updates_surface_rule_errors() {
        let store = GameStore::new();
        let id = seated(&store, "t1");
        let err = store.update(&id, |g| g.place_bet("p1", 5)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Rule(GameError::BetOutOfRange { .. })
        ));
        assert_eq!(store.get(&id).unwrap().player("p1").unwrap().balance, 1_000);
    }

    #[test]
    fn list_tables_prefers_active_game() {
        let store = GameStore::new();
        let done = store.create_game("b", 10, 1_000).unwrap();
        store
            .update(done.id(), |g| {
                g.add_player("x", "X", 100)?;
                g.remove_player("x").map(|_| ())
            })
            .unwrap();
        let active = store.create_game("b", 25, 500).unwrap();
        store.create_game("a", 10, 1_000).unwrap();

        let rows = store.list_tables().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "a");
        assert_eq!(rows[1].current_game, active.id());
        assert_eq!(rows[1].min_bet, 25);
    }

    #[test]
    fn remove_game_prunes_table_index() {
        let store = GameStore::new();
        let game = store.create_game("t1", 10, 1_000).unwrap();
        store.remove_game(game.id()).unwrap();
        assert_eq!(store.game_count().unwrap(), 0);
        assert!(matches!(
            store.table_games("t1"),
            Err(StoreError::TableNotFound(_))
        ));
        assert!(store.list_tables().unwrap().is_empty());
    }

    #[test]
    fn concurrent_bets_on_one_game_are_serialized() {
        let store = Arc::new(GameStore::new());
        let game = store.create_game("t1", 1, 1_000).unwrap();
        let id = game.id().to_string();
        store
            .update(&id, |g| {
                for i in 0..8 {
                    g.add_player(&format!("p{i}"), "P", 1_000)?;
                }
                g.open_betting()
            })
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let id = id.clone();
                thread::spawn(move || {
                    for amount in 1..=50u32 {
                        store
                            .update(&id, |g| g.place_bet(&format!("p{i}"), amount))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let game = store.get(&id).unwrap();
        for player in game.players() {
            assert_eq!(player.bet, 50);
            assert_eq!(player.balance + player.bet, 1_000, "no lost update");
        }
    }
}
