//! Blackjack hand scoring.

use crate::cards::Card;

pub const BLACKJACK: u32 = 21;

/// Scores a hand, counting every Ace as 11 and then demoting Aces to 1, one at a
/// time, while the total is over 21.
///
/// ```
/// use cardroom_engine::cards::{Card, Rank, Suit};
/// use cardroom_engine::hand::score;
///
/// let hand = [
///     Card::new(Suit::Hearts, Rank::Ace),
///     Card::new(Suit::Spades, Rank::Ace),
///     Card::new(Suit::Clubs, Rank::Nine),
/// ];
/// assert_eq!(score(&hand), 21);
/// ```
pub fn score(hand: &[Card]) -> u32 {
    total(hand.iter())
}

/// Score of the face-up cards only; what an observer can see of the dealer before the
/// hole card is turned.
pub fn visible_score(hand: &[Card]) -> u32 {
    total(hand.iter().filter(|c| c.face_up))
}

/// Two cards totaling 21.
pub fn is_blackjack(hand: &[Card]) -> bool {
    hand.len() == 2 && score(hand) == BLACKJACK
}

fn total<'a>(cards: impl Iterator<Item = &'a Card>) -> u32 {
    let mut sum = 0u32;
    let mut soft_aces = 0u32;
    for card in cards {
        if card.rank.is_ace() {
            soft_aces += 1;
        }
        sum += card.value();
    }
    while sum > BLACKJACK && soft_aces > 0 {
        sum -= 10;
        soft_aces -= 1;
    }
    sum
}
