//! # cardroom-engine: Blackjack Game Engine Core
//!
//! A deterministic single-deck blackjack state machine for multi-player tables.
//! Owns dealing, hand scoring, turn rotation and bet settlement; it performs no I/O
//! and knows nothing about connections or storage.
//!
//! ## Core Modules
//!
//! - [`cards`] - Card representation (Suit, Rank, Card) and the 52-card set
//! - [`deck`] - Fisher–Yates shuffled deck with seeded or OS-entropy ChaCha20 RNG
//! - [`hand`] - Blackjack scoring with soft/hard Ace adjustment
//! - [`player`] - Seated player and dealer state
//! - [`game`] - The round state machine (join, bet, deal, hit, stand, settle, reset)
//! - [`rules`] - Bet validation and settlement payouts
//! - [`view`] - Per-viewer projections and table summaries
//! - [`errors`] - Error types for game operations
//!
//! ## Quick Start
//!
//! ```rust
//! use cardroom_engine::cards::{Card, Rank, Suit};
//! use cardroom_engine::hand::score;
//!
//! let hand = [
//!     Card::new(Suit::Hearts, Rank::Ace),
//!     Card::new(Suit::Spades, Rank::King),
//! ];
//! assert_eq!(score(&hand), 21);
//! ```
//!
//! ## Deterministic Gameplay
//!
//! ```rust
//! use cardroom_engine::deck::Deck;
//!
//! let mut deck1 = Deck::new_with_seed(42);
//! let mut deck2 = Deck::new_with_seed(42);
//! deck1.shuffle();
//! deck2.shuffle();
//! assert_eq!(deck1.draw(), deck2.draw());
//! ```

pub mod cards;
pub mod deck;
pub mod errors;
pub mod game;
pub mod hand;
pub mod player;
pub mod rules;
pub mod view;
