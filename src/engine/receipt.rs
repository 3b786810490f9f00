//! Results of successful operations, shaped for a request boundary.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ledger::LedgerEntry;
use super::state::CardAccount;
use crate::Amount;
use crate::model::{CardCategory, CardId, EffectiveStatus, Station};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryReceipt {
    pub message: String,
    pub card_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitReceipt {
    pub origin: Station,
    pub destination: Station,
    pub fare: Amount,
    pub discount_applied: bool,
    pub new_balance: Amount,
}

/// Which branch of mismatch resolution was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveOutcome {
    /// Penalty charged and journey closed.
    ForceClosed,
    /// No charge; journey left open for a normal exit.
    LoggedOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveReceipt {
    pub outcome: ResolveOutcome,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub penalty_applied: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpReceipt {
    pub message: String,
    pub new_balance: Amount,
}

/// Fare a card would pay on a route, without charging it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FareQuote {
    pub origin: Station,
    pub destination: Station,
    pub base_fare: Amount,
    pub fare: Amount,
    pub discount_applied: bool,
}

/// One card with its derived status and history, newest entry first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardView {
    pub account: CardAccount,
    pub effective_status: EffectiveStatus,
    pub in_journey: bool,
    pub ledger: Vec<LedgerEntry>,
}

/// Listing row for one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSummary {
    pub card: CardId,
    pub student_id: Option<String>,
    pub name: String,
    pub category: CardCategory,
    pub effective_status: EffectiveStatus,
    pub balance: Amount,
    pub in_journey: bool,
    pub created_at: DateTime<Utc>,
}
