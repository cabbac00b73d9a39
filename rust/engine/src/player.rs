use crate::cards::Card;
use crate::hand;
use serde::{Deserialize, Serialize};

/// Where a seated player stands in the current round.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerStatus {
    /// Still to act (or waiting for the deal)
    Active,
    /// Score went over 21
    Busted,
    /// Chose to stand
    Stood,
    /// Dealt a two-card 21
    Blackjack,
}

/// Default balance for a player the persistence layer has never seen.
pub const STARTING_BALANCE: u32 = 1_000;

/// A seated player: identity, current hand, escrowed bet and chip balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub name: String,
    pub hand: Vec<Card>,
    pub score: u32,
    pub status: PlayerStatus,
    /// Escrowed bet, already debited from `balance`
    pub bet: u32,
    pub balance: u32,
    /// True while it is this player's turn
    pub is_active: bool,
}

impl Player {
    pub fn new(id: impl Into<String>, name: impl Into<String>, balance: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            hand: Vec::new(),
            score: 0,
            status: PlayerStatus::Active,
            bet: 0,
            balance,
            is_active: false,
        }
    }

    pub(crate) fn take_card(&mut self, card: Card) {
        self.hand.push(Card {
            face_up: true,
            ..card
        });
        self.score = hand::score(&self.hand);
    }

    pub(crate) fn clear_round(&mut self) {
        self.hand.clear();
        self.score = 0;
        self.status = PlayerStatus::Active;
        self.bet = 0;
        self.is_active = false;
    }

    pub(crate) fn credit(&mut self, amount: u32) {
        self.balance = self.balance.saturating_add(amount);
    }
}

/// The house hand. `score` is what observers see: face-up cards only until the hole
/// card is flipped at the start of the dealer phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dealer {
    pub hand: Vec<Card>,
    pub score: u32,
}

impl Dealer {
    pub(crate) fn take_card(&mut self, card: Card) {
        self.hand.push(card);
        self.score = hand::visible_score(&self.hand);
    }

    pub(crate) fn reveal(&mut self) {
        for card in &mut self.hand {
            card.face_up = true;
        }
        self.score = hand::score(&self.hand);
    }

    pub(crate) fn clear(&mut self) {
        self.hand.clear();
        self.score = 0;
    }

    pub fn is_busted(&self) -> bool {
        self.score > hand::BLACKJACK
    }

    pub fn has_blackjack(&self) -> bool {
        hand::is_blackjack(&self.hand)
    }
}
