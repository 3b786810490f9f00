use chrono::{DateTime, Months, Utc};
use serde::Serialize;

use crate::Amount;
use crate::model::{
    CardCategory, CardId, CardStatus, EffectiveStatus, NewCard, Profile, ProfileUpdate,
    effective_status,
};

/// Physical card validity from registration.
pub const CARD_LIFETIME: Months = Months::new(60);

/// Discount validity from each validation.
pub const RENEWAL_PERIOD: Months = Months::new(12);

fn add_months(at: DateTime<Utc>, months: Months) -> DateTime<Utc> {
    at.checked_add_months(months)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A card account with its balance and discount eligibility attributes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardAccount {
    card: CardId,
    student_id: Option<String>,
    name: String,
    category: CardCategory,
    balance: Amount,
    status: CardStatus,
    validated_at: Option<DateTime<Utc>>,
    renewal_deadline: Option<DateTime<Utc>>,
    card_expiry: DateTime<Utc>,
    profile: Profile,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// The holder details copied onto every ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HolderSnapshot {
    pub name: String,
    pub category: CardCategory,
    pub balance: Amount,
}

impl CardAccount {
    /// A freshly registered, pending account.
    pub fn register(new_card: NewCard, now: DateTime<Utc>) -> Self {
        Self {
            card: new_card.card,
            student_id: new_card.student_id,
            name: new_card.name,
            category: new_card.category,
            balance: new_card.initial_balance,
            status: CardStatus::Pending,
            validated_at: None,
            renewal_deadline: None,
            card_expiry: add_months(now, CARD_LIFETIME),
            profile: new_card.profile,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.card
    }

    pub fn student_id(&self) -> Option<&str> {
        self.student_id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> CardCategory {
        self.category
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    pub fn status(&self) -> CardStatus {
        self.status
    }

    pub fn validated_at(&self) -> Option<DateTime<Utc>> {
        self.validated_at
    }

    pub fn renewal_deadline(&self) -> Option<DateTime<Utc>> {
        self.renewal_deadline
    }

    pub fn card_expiry(&self) -> DateTime<Utc> {
        self.card_expiry
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn effective_status(&self, now: DateTime<Utc>) -> EffectiveStatus {
        effective_status(self.status, now, self.card_expiry, self.renewal_deadline)
    }

    /// Student card that is validated, unexpired and within its renewal year.
    pub fn is_discount_eligible(&self, now: DateTime<Utc>) -> bool {
        self.category == CardCategory::Student
            && self.effective_status(now) == EffectiveStatus::Validated
    }

    /// Holder details with the given balance.
    pub fn snapshot_with(&self, balance: Amount) -> HolderSnapshot {
        HolderSnapshot {
            name: self.name.clone(),
            category: self.category,
            balance,
        }
    }

    pub fn snapshot(&self) -> HolderSnapshot {
        self.snapshot_with(self.balance)
    }

    pub(crate) fn credit(&mut self, amount: Amount, now: DateTime<Utc>) {
        self.balance += amount;
        self.updated_at = now;
    }

    pub(crate) fn debit(&mut self, amount: Amount, now: DateTime<Utc>) {
        self.balance -= amount;
        self.updated_at = now;
    }

    pub(crate) fn validate(&mut self, now: DateTime<Utc>) {
        self.status = CardStatus::Validated;
        self.validated_at = Some(now);
        self.renewal_deadline = Some(add_months(now, RENEWAL_PERIOD));
        self.updated_at = now;
    }

    pub(crate) fn deactivate(&mut self, now: DateTime<Utc>) {
        self.status = CardStatus::Deactivated;
        self.updated_at = now;
    }

    pub(crate) fn apply_profile(&mut self, update: ProfileUpdate, now: DateTime<Utc>) {
        self.name = update.name;
        self.student_id = update.student_id;
        self.profile = update.profile;
        self.updated_at = now;
    }
}
