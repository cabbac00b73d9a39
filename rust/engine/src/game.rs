use crate::cards::Card;
use crate::deck::Deck;
use crate::errors::GameError;
use crate::hand;
use crate::player::{Dealer, Player, PlayerStatus};
use crate::rules::{self, Settlement, DEALER_STANDS_ON};
use crate::view::{GameView, PlayerView, TableSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Round lifecycle: `Waiting → Betting → InProgress → Completed → Betting → …`
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GameStatus {
    /// Seats are open, no betting yet
    Waiting,
    /// Seated players place their bets
    Betting,
    /// Cards are out and players take turns
    InProgress,
    /// Dealer played and bets are settled
    Completed,
}

impl GameStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Waiting => "waiting",
            GameStatus::Betting => "betting",
            GameStatus::InProgress => "inProgress",
            GameStatus::Completed => "completed",
        }
    }
}

/// One blackjack game bound to a table.
///
/// Seating order is turn order. While the game is `InProgress` exactly one player has
/// `is_active` set, and none once the dealer phase has begun. Every fallible operation
/// validates before it mutates, so an `Err` leaves the game untouched.
///
/// # Examples
///
/// ```
/// use cardroom_engine::deck::Deck;
/// use cardroom_engine::game::{Game, GameStatus};
///
/// let mut deck = Deck::new_with_seed(42);
/// deck.shuffle();
/// let mut game = Game::with_deck("table-1", 10, 500, deck);
///
/// game.add_player("alice", "Alice", 1_000).unwrap();
/// game.open_betting().unwrap();
/// game.place_bet("alice", 50).unwrap();
/// assert_eq!(game.players()[0].balance, 950);
///
/// game.start().unwrap();
/// assert_ne!(game.status(), GameStatus::Betting);
/// assert_eq!(game.players()[0].hand.len(), 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    id: String,
    table_id: String,
    players: Vec<Player>,
    dealer: Dealer,
    #[serde(skip)]
    deck: Deck,
    #[serde(skip)]
    discard: Vec<Card>,
    status: GameStatus,
    min_bet: u32,
    max_bet: u32,
    current_player_index: usize,
    settlements: Vec<Settlement>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Game {
    pub fn new(table_id: impl Into<String>, min_bet: u32, max_bet: u32) -> Self {
        Self::with_deck(table_id, min_bet, max_bet, Deck::new())
    }

    /// Game dealing from the given deck as-is; used for seeded or stacked play.
    pub fn with_deck(table_id: impl Into<String>, min_bet: u32, max_bet: u32, deck: Deck) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            table_id: table_id.into(),
            players: Vec::new(),
            dealer: Dealer::default(),
            deck,
            discard: Vec::new(),
            status: GameStatus::Waiting,
            min_bet,
            max_bet,
            current_player_index: 0,
            settlements: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn table_id(&self) -> &str {
        &self.table_id
    }
    pub fn players(&self) -> &[Player] {
        &self.players
    }
    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }
    pub fn dealer(&self) -> &Dealer {
        &self.dealer
    }
    pub fn deck(&self) -> &Deck {
        &self.deck
    }
    pub fn discard(&self) -> &[Card] {
        &self.discard
    }
    pub fn status(&self) -> GameStatus {
        self.status
    }
    pub fn min_bet(&self) -> u32 {
        self.min_bet
    }
    pub fn max_bet(&self) -> u32 {
        self.max_bet
    }
    pub fn current_player_index(&self) -> usize {
        self.current_player_index
    }
    pub fn settlements(&self) -> &[Settlement] {
        &self.settlements
    }
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// The player whose turn it is, if any.
    pub fn active_player(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_active)
    }

    /// Seats a player. Re-seating an existing id returns the current seat unchanged,
    /// in any state; new seats are only accepted while `Waiting`.
    pub fn add_player(
        &mut self,
        player_id: &str,
        name: &str,
        initial_balance: u32,
    ) -> Result<Player, GameError> {
        if let Some(existing) = self.player(player_id) {
            return Ok(existing.clone());
        }
        self.require(GameStatus::Waiting)?;

        let player = Player::new(player_id, name, initial_balance);
        self.players.push(player.clone());
        self.touch();
        Ok(player)
    }

    /// Unseats a player in any state. An emptied table completes the game.
    ///
    /// A bet placed during `Betting` goes back to the balance. Mid-round the turn
    /// pointer is kept consistent: removing the active player passes the turn on
    /// (possibly to the dealer); the removed hand goes to the discard pile and the
    /// escrowed bet is forfeited.
    pub fn remove_player(&mut self, player_id: &str) -> Result<Player, GameError> {
        let index = self.index_of(player_id)?;
        let mut removed = self.players.remove(index);
        self.discard.append(&mut removed.hand);
        if self.status == GameStatus::Betting {
            removed.credit(removed.bet);
            removed.bet = 0;
        }

        if self.players.is_empty() {
            self.current_player_index = 0;
            self.status = GameStatus::Completed;
        } else if self.status == GameStatus::InProgress {
            if index < self.current_player_index {
                self.current_player_index -= 1;
            } else if removed.is_active {
                self.advance_from(index % self.players.len());
            }
        }

        self.touch();
        Ok(removed)
    }

    /// Explicit `Waiting → Betting` transition.
    pub fn open_betting(&mut self) -> Result<(), GameError> {
        self.require(GameStatus::Waiting)?;
        if self.players.is_empty() {
            return Err(GameError::NoPlayers);
        }
        self.status = GameStatus::Betting;
        self.touch();
        Ok(())
    }

    /// Escrows a bet: the amount leaves the balance immediately.
    ///
    /// Betting again in the same round replaces the earlier bet, which is refunded
    /// first, so the limits apply to the new amount against the full bankroll.
    pub fn place_bet(&mut self, player_id: &str, amount: u32) -> Result<(), GameError> {
        self.require(GameStatus::Betting)?;
        let index = self.index_of(player_id)?;
        let player = &mut self.players[index];

        let bankroll = player.balance.saturating_add(player.bet);
        rules::validate_bet(amount, self.min_bet, self.max_bet, bankroll)?;

        player.balance = bankroll - amount;
        player.bet = amount;
        self.touch();
        Ok(())
    }

    /// Deals the round and hands the turn to the first seated player still to act.
    pub fn start(&mut self) -> Result<(), GameError> {
        self.require(GameStatus::Betting)?;
        if self.players.is_empty() {
            return Err(GameError::NoPlayers);
        }
        if self.players.iter().any(|p| p.bet == 0) {
            return Err(GameError::MissingBets);
        }
        let needed = 2 * (self.players.len() + 1);
        if self.deck.remaining() < needed {
            return Err(GameError::EmptyDeck);
        }

        for i in 0..self.players.len() {
            for _ in 0..2 {
                let card = self.deck.draw()?;
                self.players[i].take_card(card);
            }
            if hand::is_blackjack(&self.players[i].hand) {
                self.players[i].status = PlayerStatus::Blackjack;
            }
        }

        let up = self.deck.draw()?;
        self.dealer.take_card(Card { face_up: true, ..up });
        let hole = self.deck.draw()?;
        self.dealer.take_card(hole.face_down());

        self.status = GameStatus::InProgress;
        self.advance_from(0);
        self.touch();
        Ok(())
    }

    /// Draws one card for the active player; busting passes the turn on.
    pub fn hit(&mut self, player_id: &str) -> Result<Card, GameError> {
        let index = self.turn_of(player_id)?;
        let card = self.deck.draw()?;

        let player = &mut self.players[index];
        player.take_card(card);
        if player.score > hand::BLACKJACK {
            player.status = PlayerStatus::Busted;
            player.is_active = false;
            self.advance_turn();
        }
        self.touch();
        Ok(Card {
            face_up: true,
            ..card
        })
    }

    pub fn stand(&mut self, player_id: &str) -> Result<(), GameError> {
        let index = self.turn_of(player_id)?;
        let player = &mut self.players[index];
        player.status = PlayerStatus::Stood;
        player.is_active = false;
        self.advance_turn();
        self.touch();
        Ok(())
    }

    /// `Completed → Betting`: fresh shuffled deck, empty hands, balances kept.
    pub fn prepare_for_next_round(&mut self) -> Result<(), GameError> {
        self.require(GameStatus::Completed)?;
        self.deck.shuffle();
        self.discard.clear();
        self.dealer.clear();
        for player in &mut self.players {
            player.clear_round();
        }
        self.settlements.clear();
        self.current_player_index = 0;
        self.status = GameStatus::Betting;
        self.touch();
        Ok(())
    }

    /// Projection for one viewer. Every seat shows its hand; only the viewer's own
    /// seat carries a balance. `None` is a spectator.
    pub fn view_for(&self, viewer: Option<&str>) -> GameView {
        let players = self
            .players
            .iter()
            .map(|p| PlayerView {
                id: p.id.clone(),
                name: p.name.clone(),
                hand: p.hand.clone(),
                score: p.score,
                status: p.status,
                bet: p.bet,
                is_active: p.is_active,
                balance: (viewer == Some(p.id.as_str())).then_some(p.balance),
            })
            .collect();

        GameView {
            id: self.id.clone(),
            table_id: self.table_id.clone(),
            status: self.status,
            dealer: self.dealer.clone(),
            min_bet: self.min_bet,
            max_bet: self.max_bet,
            players,
        }
    }

    pub fn summary(&self) -> TableSummary {
        TableSummary {
            id: self.table_id.clone(),
            player_count: self.players.len(),
            status: self.status,
            min_bet: self.min_bet,
            max_bet: self.max_bet,
            current_game: self.id.clone(),
            last_updated: self.updated_at,
        }
    }

    fn require(&self, expected: GameStatus) -> Result<(), GameError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(GameError::InvalidState {
                expected,
                actual: self.status,
            })
        }
    }

    fn index_of(&self, player_id: &str) -> Result<usize, GameError> {
        self.players
            .iter()
            .position(|p| p.id == player_id)
            .ok_or_else(|| GameError::PlayerNotFound(player_id.to_string()))
    }

    /// Seat index of `player_id` if it may act right now.
    fn turn_of(&self, player_id: &str) -> Result<usize, GameError> {
        self.require(GameStatus::InProgress)?;
        let index = self.index_of(player_id)?;
        let player = &self.players[index];
        if player.status != PlayerStatus::Active {
            return Err(GameError::PlayerNotActive(player_id.to_string()));
        }
        if !player.is_active || index != self.current_player_index {
            return Err(GameError::NotPlayersTurn(player_id.to_string()));
        }
        Ok(index)
    }

    fn advance_turn(&mut self) {
        let start = (self.current_player_index + 1) % self.players.len();
        self.advance_from(start);
    }

    /// Gives the turn to the first Active seat at or after `start`, wrapping once
    /// around the table; with nobody left the dealer plays.
    fn advance_from(&mut self, start: usize) {
        let seats = self.players.len();
        for offset in 0..seats {
            let i = (start + offset) % seats;
            if self.players[i].status == PlayerStatus::Active {
                self.current_player_index = i;
                self.players[i].is_active = true;
                return;
            }
        }
        self.dealer_turn();
    }

    fn dealer_turn(&mut self) {
        for player in &mut self.players {
            player.is_active = false;
        }
        self.dealer.reveal();
        while self.dealer.score < DEALER_STANDS_ON {
            match self.deck.draw() {
                Ok(card) => self.dealer.take_card(Card {
                    face_up: true,
                    ..card
                }),
                Err(_) => break,
            }
        }
        self.settle();
        self.status = GameStatus::Completed;
    }

    fn settle(&mut self) {
        self.settlements.clear();
        for player in &mut self.players {
            let settlement = rules::settle(player, &self.dealer);
            player.credit(settlement.payout);
            self.settlements.push(settlement);
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
