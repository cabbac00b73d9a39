use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::cards::{full_deck, Card};
use crate::errors::DeckError;

/// A single 52-card deck drawn from the front.
///
/// Cards before `position` have been dealt; the rest are still in the deck, so the
/// dealt prefix plus the remaining suffix is always the card set the deck was built with.
#[derive(Debug, Clone)]
pub struct Deck {
    cards: Vec<Card>,
    position: usize,
    rng: ChaCha20Rng,
}

impl Deck {
    /// Fresh shuffled deck seeded from OS entropy.
    pub fn new() -> Self {
        let mut deck = Self::ordered(ChaCha20Rng::from_os_rng());
        deck.shuffle();
        deck
    }

    /// Ordered deck with a deterministic generator; call [`Deck::shuffle`] to mix it.
    pub fn new_with_seed(seed: u64) -> Self {
        Self::ordered(ChaCha20Rng::seed_from_u64(seed))
    }

    /// Stacked deck that deals `cards` in the given order.
    pub fn from_cards(cards: Vec<Card>) -> Self {
        Self {
            cards,
            position: 0,
            rng: ChaCha20Rng::from_os_rng(),
        }
    }

    fn ordered(rng: ChaCha20Rng) -> Self {
        Self {
            cards: full_deck(),
            position: 0,
            rng,
        }
    }

    /// Restores the full 52-card set and permutes it with a Fisher–Yates pass.
    pub fn shuffle(&mut self) {
        self.cards = full_deck();
        self.position = 0;
        for i in (1..self.cards.len()).rev() {
            let j = self.rng.random_range(0..=i);
            self.cards.swap(i, j);
        }
    }

    pub fn draw(&mut self) -> Result<Card, DeckError> {
        let card = *self.cards.get(self.position).ok_or(DeckError::Empty)?;
        self.position += 1;
        Ok(card)
    }

    pub fn remaining(&self) -> usize {
        self.cards.len().saturating_sub(self.position)
    }

    /// Cards already dealt, in draw order.
    pub fn drawn(&self) -> &[Card] {
        &self.cards[..self.position]
    }

    /// Cards still in the deck, in draw order.
    pub fn undealt(&self) -> &[Card] {
        &self.cards[self.position..]
    }
}

impl Default for Deck {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{Rank, Suit};

    #[test]
    fn stacked_deck_deals_in_order_then_runs_dry() {
        let mut deck = Deck::from_cards(vec![
            Card::new(Suit::Hearts, Rank::Ace),
            Card::new(Suit::Spades, Rank::King),
        ]);
        assert_eq!(deck.remaining(), 2);
        assert_eq!(deck.draw().unwrap().rank, Rank::Ace);
        assert_eq!(deck.draw().unwrap().rank, Rank::King);
        assert_eq!(deck.draw(), Err(DeckError::Empty));
        assert_eq!(deck.remaining(), 0);
        assert_eq!(deck.drawn().len(), 2);
    }

    #[test]
    fn unshuffled_seeded_deck_keeps_enumeration_order() {
        let mut deck = Deck::new_with_seed(7);
        let first = deck.draw().unwrap();
        assert_eq!(first, Card::new(Suit::Hearts, Rank::Ace));
        assert_eq!(deck.remaining(), 51);
    }

    #[test]
    fn shuffle_refills_a_partially_dealt_deck() {
        let mut deck = Deck::new_with_seed(99);
        deck.shuffle();
        for _ in 0..10 {
            deck.draw().unwrap();
        }
        deck.shuffle();
        assert_eq!(deck.remaining(), 52);
        assert!(deck.drawn().is_empty());
    }
}
