use crate::errors::GameError;
use crate::player::{Dealer, Player, PlayerStatus};
use serde::{Deserialize, Serialize};

/// Dealer keeps drawing while the total is below this, soft or hard.
pub const DEALER_STANDS_ON: u32 = 17;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    Win,
    Blackjack,
    Push,
    Lose,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Blackjack => "blackjack",
            Outcome::Push => "push",
            Outcome::Lose => "lose",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "win" => Some(Outcome::Win),
            "blackjack" => Some(Outcome::Blackjack),
            "push" => Some(Outcome::Push),
            "lose" => Some(Outcome::Lose),
            _ => None,
        }
    }
}

/// Result of one player's round. `payout` is what was credited back to the balance,
/// escrowed stake included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub player_id: String,
    pub bet: u32,
    pub outcome: Outcome,
    pub payout: u32,
}

/// Checks a bet against the table limits and the player's balance.
///
/// # Errors
///
/// - [`GameError::BetOutOfRange`] when `amount` is outside `min..=max`
/// - [`GameError::InsufficientBalance`] when `amount` exceeds `balance`
///
/// ```
/// use cardroom_engine::rules::validate_bet;
/// use cardroom_engine::errors::GameError;
///
/// assert!(validate_bet(50, 10, 500, 1_000).is_ok());
/// assert!(matches!(
///     validate_bet(5, 10, 500, 1_000),
///     Err(GameError::BetOutOfRange { .. })
/// ));
/// assert!(matches!(
///     validate_bet(400, 10, 500, 100),
///     Err(GameError::InsufficientBalance { .. })
/// ));
/// ```
pub fn validate_bet(amount: u32, min: u32, max: u32, balance: u32) -> Result<(), GameError> {
    if amount < min || amount > max {
        return Err(GameError::BetOutOfRange { amount, min, max });
    }
    if amount > balance {
        return Err(GameError::InsufficientBalance { amount, balance });
    }
    Ok(())
}

/// Decides one player's result against the dealer's final hand.
pub fn settle(player: &Player, dealer: &Dealer) -> Settlement {
    let bet = player.bet;
    let (outcome, payout) = match player.status {
        PlayerStatus::Busted => (Outcome::Lose, 0),
        PlayerStatus::Blackjack => {
            if dealer.has_blackjack() {
                (Outcome::Push, bet)
            } else {
                (Outcome::Blackjack, bet.saturating_add(bet.saturating_mul(3) / 2))
            }
        }
        PlayerStatus::Active | PlayerStatus::Stood => {
            if dealer.is_busted() || player.score > dealer.score {
                (Outcome::Win, bet.saturating_mul(2))
            } else if player.score == dealer.score {
                (Outcome::Push, bet)
            } else {
                (Outcome::Lose, 0)
            }
        }
    };
    Settlement {
        player_id: player.id.clone(),
        bet,
        outcome,
        payout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{Card, Rank, Suit};

    fn dealer(ranks: &[Rank]) -> Dealer {
        let mut d = Dealer::default();
        for &r in ranks {
            d.take_card(Card::new(Suit::Diamonds, r));
        }
        d.reveal();
        d
    }

    fn player(status: PlayerStatus, score: u32, bet: u32) -> Player {
        let mut p = Player::new("p", "P", 0);
        p.status = status;
        p.score = score;
        p.bet = bet;
        p
    }

    #[test]
    fn blackjack_pays_three_to_two_rounding_down() {
        let s = settle(&player(PlayerStatus::Blackjack, 21, 25), &dealer(&[Rank::Ten, Rank::Nine]));
        assert_eq!(s.outcome, Outcome::Blackjack);
        assert_eq!(s.payout, 25 + 37);
    }

    #[test]
    fn blackjack_against_dealer_blackjack_pushes() {
        let s = settle(&player(PlayerStatus::Blackjack, 21, 40), &dealer(&[Rank::Ace, Rank::King]));
        assert_eq!(s.outcome, Outcome::Push);
        assert_eq!(s.payout, 40);
    }

    #[test]
    fn busted_player_loses_even_if_dealer_busts() {
        let s = settle(
            &player(PlayerStatus::Busted, 25, 10),
            &dealer(&[Rank::King, Rank::Six, Rank::Nine]),
        );
        assert_eq!(s.outcome, Outcome::Lose);
        assert_eq!(s.payout, 0);
    }

    #[test]
    fn stood_player_compares_scores() {
        let d = dealer(&[Rank::King, Rank::Eight]);
        assert_eq!(settle(&player(PlayerStatus::Stood, 19, 10), &d).payout, 20);
        assert_eq!(settle(&player(PlayerStatus::Stood, 18, 10), &d).outcome, Outcome::Push);
        assert_eq!(settle(&player(PlayerStatus::Stood, 17, 10), &d).outcome, Outcome::Lose);
    }

    #[test]
    fn outcome_names_round_trip() {
        for o in [Outcome::Win, Outcome::Blackjack, Outcome::Push, Outcome::Lose] {
            assert_eq!(Outcome::parse(o.as_str()), Some(o));
        }
        assert_eq!(Outcome::parse("fold"), None);
    }
}
