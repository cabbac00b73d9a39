use crate::game::GameStatus;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeckError {
    #[error("No cards left in the deck")]
    Empty,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Game is {actual:?}, operation requires {expected:?}")]
    InvalidState {
        expected: GameStatus,
        actual: GameStatus,
    },
    #[error("Player {0} is not seated at this game")]
    PlayerNotFound(String),
    #[error("It's not player {0}'s turn")]
    NotPlayersTurn(String),
    #[error("Player {0} has already finished this round")]
    PlayerNotActive(String),
    #[error("Invalid bet amount: {amount}, allowed range {min}..={max}")]
    BetOutOfRange { amount: u32, min: u32, max: u32 },
    #[error("Insufficient balance: bet {amount}, balance {balance}")]
    InsufficientBalance { amount: u32, balance: u32 },
    #[error("No players seated")]
    NoPlayers,
    #[error("Not every seated player has placed a bet")]
    MissingBets,
    #[error("No more cards available")]
    EmptyDeck,
}

impl From<DeckError> for GameError {
    fn from(_: DeckError) -> Self {
        GameError::EmptyDeck
    }
}
