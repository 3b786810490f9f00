//! Core domain types for the fare gate.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Amount;

/// Card identifier (the RFID written on the card).
pub type CardId = String;

/// Station name, exactly as it appears in the fare table.
pub type Station = String;

/// Ledger entry identifier, unique across the whole store.
pub type EntryId = u64;

/// Fare category of a card holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardCategory {
    /// Student card, eligible for the discount while validated.
    #[default]
    Student,
    /// Standard card, always pays the base fare.
    Standard,
}

impl fmt::Display for CardCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardCategory::Student => f.write_str("student"),
            CardCategory::Standard => f.write_str("standard"),
        }
    }
}

/// Lifecycle status as stored on the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    #[default]
    Pending,
    Validated,
    Deactivated,
}

/// Status derived from the stored status and the card's deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EffectiveStatus {
    Pending,
    CardExpired,
    AnnualDiscountExpired,
    Validated,
    Deactivated,
}

impl fmt::Display for EffectiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EffectiveStatus::Pending => "Pending",
            EffectiveStatus::CardExpired => "Card Expired",
            EffectiveStatus::AnnualDiscountExpired => "Annual Discount Expired",
            EffectiveStatus::Validated => "Validated",
            EffectiveStatus::Deactivated => "Deactivated",
        };
        f.write_str(label)
    }
}

/// Derive the effective status of a card at `now`.
///
/// Checks run in a fixed order: a pending card is reported as pending even
/// when its dates have lapsed, and an expired card outranks a lapsed annual
/// renewal. A missing renewal deadline counts as lapsed.
pub fn effective_status(
    status: CardStatus,
    now: DateTime<Utc>,
    card_expiry: DateTime<Utc>,
    renewal_deadline: Option<DateTime<Utc>>,
) -> EffectiveStatus {
    if status == CardStatus::Pending {
        return EffectiveStatus::Pending;
    }
    if now > card_expiry {
        return EffectiveStatus::CardExpired;
    }
    match renewal_deadline {
        Some(deadline) if now <= deadline => {}
        _ => return EffectiveStatus::AnnualDiscountExpired,
    }
    match status {
        CardStatus::Validated => EffectiveStatus::Validated,
        _ => EffectiveStatus::Deactivated,
    }
}

/// Optional holder details kept alongside the account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub email: Option<String>,
    pub program: Option<String>,
    pub school: Option<String>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
}

/// Registration request for a new card.
#[derive(Debug, Clone)]
pub struct NewCard {
    pub card: CardId,
    pub student_id: Option<String>,
    pub name: String,
    pub category: CardCategory,
    pub initial_balance: Amount,
    pub profile: Profile,
}

impl NewCard {
    /// A student card with no profile details.
    pub fn student(card: impl Into<CardId>, name: impl Into<String>, balance: Amount) -> Self {
        Self {
            card: card.into(),
            student_id: None,
            name: name.into(),
            category: CardCategory::Student,
            initial_balance: balance,
            profile: Profile::default(),
        }
    }

    /// A standard card with no profile details.
    pub fn standard(card: impl Into<CardId>, name: impl Into<String>, balance: Amount) -> Self {
        Self {
            category: CardCategory::Standard,
            ..Self::student(card, name, balance)
        }
    }

    pub fn with_student_id(mut self, student_id: impl Into<String>) -> Self {
        self.student_id = Some(student_id.into());
        self
    }
}

/// Replacement holder details for an existing card.
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub name: String,
    pub student_id: Option<String>,
    pub profile: Profile,
}

/// A command representing the possible inputs of the engine.
#[derive(Debug, Clone)]
pub enum Command {
    /// Register a new card in pending status.
    Register(NewCard),
    /// Approve a card for the student discount for one year.
    Validate { card: CardId },
    /// Suspend the discount without expiring the card.
    Deactivate { card: CardId },
    /// Credit the card's balance at a teller.
    TopUp { card: CardId, amount: Amount },
    /// Tap in at an entry gate.
    Entry { card: CardId, station: Station },
    /// Tap out at an exit gate.
    Exit { card: CardId, station: Station },
    /// Administrative repair of a card stuck in an open journey.
    ResolveMismatch {
        card: CardId,
        penalty: Amount,
        notes: Option<String>,
    },
}

impl Command {
    pub fn card(&self) -> &str {
        match self {
            Command::Register(new_card) => &new_card.card,
            Command::Validate { card }
            | Command::Deactivate { card }
            | Command::TopUp { card, .. }
            | Command::Entry { card, .. }
            | Command::Exit { card, .. }
            | Command::ResolveMismatch { card, .. } => card,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn pending_wins_over_dates() {
        let lapsed = now() - Duration::days(1);
        assert_eq!(
            effective_status(CardStatus::Pending, now(), lapsed, Some(lapsed)),
            EffectiveStatus::Pending
        );
    }

    #[test]
    fn expired_card_outranks_lapsed_renewal() {
        let lapsed = now() - Duration::days(1);
        assert_eq!(
            effective_status(CardStatus::Validated, now(), lapsed, Some(lapsed)),
            EffectiveStatus::CardExpired
        );
    }

    #[test]
    fn lapsed_or_missing_renewal() {
        let future = now() + Duration::days(30);
        let lapsed = now() - Duration::seconds(1);
        assert_eq!(
            effective_status(CardStatus::Validated, now(), future, Some(lapsed)),
            EffectiveStatus::AnnualDiscountExpired
        );
        assert_eq!(
            effective_status(CardStatus::Validated, now(), future, None),
            EffectiveStatus::AnnualDiscountExpired
        );
    }

    #[test]
    fn deadlines_are_inclusive() {
        assert_eq!(
            effective_status(CardStatus::Validated, now(), now(), Some(now())),
            EffectiveStatus::Validated
        );
    }

    #[test]
    fn deactivated_card_within_dates() {
        let future = now() + Duration::days(30);
        assert_eq!(
            effective_status(CardStatus::Deactivated, now(), future, Some(future)),
            EffectiveStatus::Deactivated
        );
    }

    #[test]
    fn effective_status_labels() {
        assert_eq!(EffectiveStatus::CardExpired.to_string(), "Card Expired");
        assert_eq!(
            EffectiveStatus::AnnualDiscountExpired.to_string(),
            "Annual Discount Expired"
        );
    }

    #[test]
    fn command_card_accessor() {
        let command = Command::Exit {
            card: "RFID-1".to_string(),
            station: "Central".to_string(),
        };
        assert_eq!(command.card(), "RFID-1");
    }
}
