//! Fare gate engine.
//!
//! The engine owns the journey state machine for every card. A card is either
//! idle or in a journey, and that state is read from the card's ledger on each
//! call: it is in a journey exactly when the ledger holds an entry-kind record.
//!
//! - entry: idle -> in journey
//! - exit: in journey -> idle, charging the route fare
//! - mismatch resolution: in journey -> idle with a penalty, or a logged
//!   no-op that leaves the journey open
//!
//! Each operation locks only the card it touches, runs every check, and then
//! applies its account and ledger writes together.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info};

use crate::Amount;
use crate::clock::{Clock, SystemClock};
use crate::fare::FareTable;
use crate::model::{Command, NewCard, ProfileUpdate};

mod error;
pub use error::{
    EngineError, EntryError, ErrorKind, ExitError, InputError, ResolveError, StoreError,
};

mod ledger;
pub use ledger::{
    Closure, Ledger, LedgerEntry, LedgerError, LedgerKind, RESOLVED_EXIT, TOP_UP_SOURCE,
};

mod receipt;
pub use receipt::{
    CardSummary, CardView, EntryReceipt, ExitReceipt, FareQuote, ResolveOutcome, ResolveReceipt,
    TopUpReceipt,
};

mod state;
pub use state::{CARD_LIFETIME, CardAccount, HolderSnapshot, RENEWAL_PERIOD};

mod store;
pub use store::{CardGuard, CardRecord, CardStore, DEFAULT_LOCK_TIMEOUT};

/// Highest penalty an administrator may charge when closing a journey.
pub const MAX_PENALTY: Amount = Amount::from_units(30);

const FORCED_CLOSE_NOTES: &str = "Journey manually closed by admin.";
const LOGGED_ONLY_NOTES: &str = "Mismatch logged; rider may complete the journey normally.";

/// Student discount policy: a flat 50% off the base fare.
pub fn discounted(base_fare: Amount) -> Amount {
    base_fare.half()
}

/// The fare gate engine.
///
/// Cheap to clone; clones share the same store, fare table and clock.
#[derive(Clone)]
pub struct Engine {
    store: Arc<CardStore>,
    fares: Arc<FareTable>,
    clock: Arc<dyn Clock>,
}

/// Public API
impl Engine {
    pub fn new(fares: FareTable) -> Self {
        Self {
            store: Arc::new(CardStore::new()),
            fares: Arc::new(fares),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_store(mut self, store: Arc<CardStore>) -> Self {
        self.store = store;
        self
    }

    pub fn fares(&self) -> &FareTable {
        &self.fares
    }

    pub fn store(&self) -> &CardStore {
        &self.store
    }

    /// Run the engine with the given command stream
    pub async fn run(&self, mut stream: impl Stream<Item = Command> + Unpin) {
        while let Some(command) = stream.next().await {
            debug!(card = command.card(), "command received");
            // rejections are logged per operation and must not stop the engine
            let _ = self.apply(command).await;
        }
    }

    /// Apply a single command
    pub async fn apply(&self, command: Command) -> Result<(), EngineError> {
        match command {
            Command::Register(new_card) => self.register(new_card).await.map(|_| ()),
            Command::Validate { card } => self.validate(&card).await.map(|_| ()),
            Command::Deactivate { card } => self.deactivate(&card).await.map(|_| ()),
            Command::TopUp { card, amount } => self.top_up(&card, amount).await.map(|_| ()),
            Command::Entry { card, station } => {
                self.process_entry(&card, &station).await.map(|_| ())
            }
            Command::Exit { card, station } => {
                self.process_exit(&card, &station).await.map(|_| ())
            }
            Command::ResolveMismatch {
                card,
                penalty,
                notes,
            } => self
                .resolve_mismatch(&card, penalty, notes)
                .await
                .map(|_| ()),
        }
    }

    /// Tap in at `station`.
    pub async fn process_entry(
        &self,
        card: &str,
        station: &str,
    ) -> Result<EntryReceipt, EngineError> {
        let result = self.enter(card, station).await;
        Self::log_result("entry", card, None, &result);
        result
    }

    /// Tap out at `station`, charging the fare from the open entry's origin.
    pub async fn process_exit(
        &self,
        card: &str,
        station: &str,
    ) -> Result<ExitReceipt, EngineError> {
        let result = self.exit(card, station).await;
        Self::log_result("exit", card, result.as_ref().ok().map(|r| r.fare), &result);
        result
    }

    /// Repair a card stuck in an open journey.
    ///
    /// A positive penalty is charged and the journey is closed. A zero
    /// penalty only records the mismatch, and the rider can still tap out.
    pub async fn resolve_mismatch(
        &self,
        card: &str,
        penalty: Amount,
        notes: Option<String>,
    ) -> Result<ResolveReceipt, EngineError> {
        let result = self.resolve(card, penalty, notes).await;
        Self::log_result("mismatch resolution", card, Some(penalty), &result);
        result
    }

    /// Credit the card's balance.
    pub async fn top_up(&self, card: &str, amount: Amount) -> Result<TopUpReceipt, EngineError> {
        let result = self.credit(card, amount).await;
        Self::log_result("top-up", card, Some(amount), &result);
        result
    }

    /// Register a new card in pending status.
    pub async fn register(&self, new_card: NewCard) -> Result<CardAccount, EngineError> {
        let card = new_card.card.clone();
        let result = self.insert_card(new_card).await;
        Self::log_result("registration", &card, None, &result);
        result
    }

    /// Approve a card for the student discount for the next year.
    pub async fn validate(&self, card: &str) -> Result<CardAccount, EngineError> {
        let now = self.clock.now();
        let result = self
            .update_account(card, |account| account.validate(now))
            .await;
        Self::log_result("validation", card, None, &result);
        result
    }

    /// Withdraw the card's discount approval.
    pub async fn deactivate(&self, card: &str) -> Result<CardAccount, EngineError> {
        let now = self.clock.now();
        let result = self
            .update_account(card, |account| account.deactivate(now))
            .await;
        Self::log_result("deactivation", card, None, &result);
        result
    }

    /// Replace the holder details of a card.
    pub async fn update_profile(
        &self,
        card: &str,
        mut update: ProfileUpdate,
    ) -> Result<CardAccount, EngineError> {
        let result = async {
            require("name", &update.name)?;
            update.student_id = non_blank(update.student_id);
            let account = self
                .store
                .update_profile(card, update, self.clock.now())
                .await?;
            Ok::<_, EngineError>(account)
        }
        .await;
        Self::log_result("profile update", card, None, &result);
        result
    }

    /// Fare the card would pay from `origin` to `destination` right now.
    pub async fn quote_fare(
        &self,
        card: &str,
        origin: &str,
        destination: &str,
    ) -> Result<FareQuote, EngineError> {
        require("origin", origin)?;
        require("destination", destination)?;
        let now = self.clock.now();
        let record = self.store.lock(card).await?;
        Ok(self.price(&record.account, origin, destination, now)?)
    }

    /// Look a card up by card id or student id.
    pub async fn find(&self, identifier: &str) -> Result<CardView, EngineError> {
        let card = self
            .store
            .resolve(identifier)
            .await
            .ok_or_else(|| StoreError::CardNotFound(identifier.to_string()))?;
        let now = self.clock.now();
        let record = self.store.lock(&card).await?;

        let in_journey = record
            .ledger
            .open_entry()
            .map_err(|e| record.corrupted(e))?
            .is_some();

        Ok(CardView {
            account: record.account.clone(),
            effective_status: record.account.effective_status(now),
            in_journey,
            ledger: record.ledger.entries().iter().rev().cloned().collect(),
        })
    }

    /// Every card, most recently registered first.
    pub async fn list(&self) -> Result<Vec<CardSummary>, EngineError> {
        let now = self.clock.now();
        let mut summaries = Vec::new();

        for card in self.store.card_ids().await {
            let record = self.store.lock(&card).await?;
            let in_journey = record
                .ledger
                .open_entry()
                .map_err(|e| record.corrupted(e))?
                .is_some();
            let account = &record.account;
            summaries.push(CardSummary {
                card: account.id().to_string(),
                student_id: account.student_id().map(str::to_string),
                name: account.name().to_string(),
                category: account.category(),
                effective_status: account.effective_status(now),
                balance: account.balance(),
                in_journey,
                created_at: account.created_at(),
            });
        }

        summaries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.card.cmp(&b.card))
        });
        Ok(summaries)
    }
}

/// Private API
impl Engine {
    /// Small helper to log operation results
    fn log_result<T>(
        operation: &str,
        card: &str,
        amount: Option<Amount>,
        result: &Result<T, EngineError>,
    ) {
        match (result, amount) {
            (Ok(_), Some(amount)) => {
                info!(card, amount = %amount, "{operation} applied");
            }
            (Ok(_), None) => {
                info!(card, "{operation} applied");
            }
            (Err(e), _) if e.kind() == ErrorKind::Internal => {
                error!(card, reason = %e, "{operation} failed");
            }
            (Err(e), _) => {
                info!(card, reason = %e, "{operation} rejected");
            }
        }
    }

    /// Entry tap:
    /// - Ensure the card exists
    /// - Ensure the card has no open journey
    /// - Record an open entry at `station`; the balance is untouched
    async fn enter(&self, card: &str, station: &str) -> Result<EntryReceipt, EngineError> {
        require("station", station)?;
        let now = self.clock.now();
        let mut record = self.store.lock(card).await?;

        let entry = LedgerEntry::entry(
            self.store.next_entry_id(),
            now,
            record.account.snapshot(),
            station.to_string(),
        );
        let appended = record.ledger.append(entry).map(|_| ());
        match appended {
            Ok(()) => {}
            Err(LedgerError::AlreadyOpen { origin }) => {
                return Err(EntryError::AlreadyInJourney {
                    card: card.to_string(),
                    origin,
                }
                .into());
            }
            Err(other) => return Err(record.corrupted(other).into()),
        }

        Ok(EntryReceipt {
            message: "Entry recorded successfully.".to_string(),
            card_name: record.account.name().to_string(),
        })
    }

    /// Exit tap:
    /// - Ensure the card exists and has an open journey
    /// - Price the route from the journey origin, applying the discount if eligible
    /// - Ensure the balance covers the fare
    /// - Close the open entry and debit the balance
    async fn exit(&self, card: &str, destination: &str) -> Result<ExitReceipt, EngineError> {
        require("station", destination)?;
        let now = self.clock.now();
        let mut record = self.store.lock(card).await?;

        let open_origin = record
            .ledger
            .open_entry()
            .map(|open| open.map(|entry| entry.origin.clone()));
        let origin = match open_origin {
            Ok(Some(origin)) => origin,
            Ok(None) => return Err(ExitError::NoOpenJourney(card.to_string()).into()),
            Err(e) => return Err(record.corrupted(e).into()),
        };

        let quote = self.price(&record.account, &origin, destination, now)?;

        let balance = record.account.balance();
        if balance < quote.fare {
            return Err(ExitError::InsufficientFunds {
                card: card.to_string(),
                balance,
                fare: quote.fare,
            }
            .into());
        }

        let new_balance = balance - quote.fare;
        let holder = record.account.snapshot_with(new_balance);
        let closure = Closure::Exit {
            destination: destination.to_string(),
            fare: quote.fare,
            discount_applied: quote.discount_applied,
        };
        let closed = record.ledger.close_open_entry(closure, holder, now).map(|_| ());
        if let Err(e) = closed {
            return Err(record.corrupted(e).into());
        }
        record.account.debit(quote.fare, now);

        Ok(ExitReceipt {
            origin,
            destination: destination.to_string(),
            fare: quote.fare,
            discount_applied: quote.discount_applied,
            new_balance,
        })
    }

    /// Mismatch resolution:
    /// - Ensure the card exists and the penalty is within 0..=MAX_PENALTY
    /// - Ensure the card has an open journey
    /// - Positive penalty: ensure the balance covers it, debit it and
    ///   force-close the open entry
    /// - Zero penalty: append an audit record and leave the journey open
    async fn resolve(
        &self,
        card: &str,
        penalty: Amount,
        notes: Option<String>,
    ) -> Result<ResolveReceipt, EngineError> {
        let now = self.clock.now();
        let mut record = self.store.lock(card).await?;

        if penalty.is_negative() || penalty > MAX_PENALTY {
            return Err(ResolveError::PenaltyOutOfRange(penalty, MAX_PENALTY).into());
        }

        let open_origin = record
            .ledger
            .open_entry()
            .map(|open| open.map(|entry| entry.origin.clone()));
        let origin = match open_origin {
            Ok(Some(origin)) => origin,
            Ok(None) => return Err(ResolveError::NothingToResolve(card.to_string()).into()),
            Err(e) => return Err(record.corrupted(e).into()),
        };
        let notes = non_blank(notes);

        if !penalty.is_positive() {
            let entry = LedgerEntry::penalty_log(
                self.store.next_entry_id(),
                now,
                record.account.snapshot(),
                origin,
                notes.unwrap_or_else(|| LOGGED_ONLY_NOTES.to_string()),
            );
            let appended = record.ledger.append(entry).map(|_| ());
            if let Err(e) = appended {
                return Err(record.corrupted(e).into());
            }
            return Ok(ResolveReceipt {
                outcome: ResolveOutcome::LoggedOnly,
                message: "Mismatch logged; journey left open for a normal exit.".to_string(),
                new_balance: None,
                penalty_applied: None,
            });
        }

        let balance = record.account.balance();
        if balance < penalty {
            return Err(ResolveError::InsufficientFunds {
                card: card.to_string(),
                balance,
                penalty,
            }
            .into());
        }

        let new_balance = balance - penalty;
        let holder = record.account.snapshot_with(new_balance);
        let closure = Closure::Forced {
            penalty,
            notes: notes.unwrap_or_else(|| FORCED_CLOSE_NOTES.to_string()),
        };
        let closed = record.ledger.close_open_entry(closure, holder, now).map(|_| ());
        if let Err(e) = closed {
            return Err(record.corrupted(e).into());
        }
        record.account.debit(penalty, now);

        Ok(ResolveReceipt {
            outcome: ResolveOutcome::ForceClosed,
            message: "Incomplete journey resolved successfully.".to_string(),
            new_balance: Some(new_balance),
            penalty_applied: Some(penalty),
        })
    }

    /// Top-up:
    /// - Ensure the amount is positive and the card exists
    /// - Ensure the new balance is representable
    /// - Append a top-up record and credit the balance
    async fn credit(&self, card: &str, amount: Amount) -> Result<TopUpReceipt, EngineError> {
        if !amount.is_positive() {
            return Err(InputError::NonPositiveAmount(amount).into());
        }
        let now = self.clock.now();
        let mut record = self.store.lock(card).await?;

        let balance = record.account.balance();
        let new_balance = balance
            .checked_add(amount)
            .ok_or(InputError::AmountOutOfRange { balance, amount })?;
        let entry = LedgerEntry::top_up(
            self.store.next_entry_id(),
            now,
            record.account.snapshot_with(new_balance),
            amount,
        );
        let appended = record.ledger.append(entry).map(|_| ());
        if let Err(e) = appended {
            return Err(record.corrupted(e).into());
        }
        record.account.credit(amount, now);

        Ok(TopUpReceipt {
            message: "Balance added successfully.".to_string(),
            new_balance,
        })
    }

    async fn insert_card(&self, mut new_card: NewCard) -> Result<CardAccount, EngineError> {
        require("card id", &new_card.card)?;
        require("name", &new_card.name)?;
        if new_card.initial_balance.is_negative() {
            return Err(InputError::NegativeBalance(new_card.initial_balance).into());
        }
        new_card.student_id = non_blank(new_card.student_id);

        let account = CardAccount::register(new_card, self.clock.now());
        self.store.insert(account.clone()).await?;
        Ok(account)
    }

    async fn update_account(
        &self,
        card: &str,
        update: impl FnOnce(&mut CardAccount),
    ) -> Result<CardAccount, EngineError> {
        let mut record = self.store.lock(card).await?;
        update(&mut record.account);
        Ok(record.account.clone())
    }

    /// Fare for a route given the card's eligibility at `now`
    fn price(
        &self,
        account: &CardAccount,
        origin: &str,
        destination: &str,
        now: DateTime<Utc>,
    ) -> Result<FareQuote, ExitError> {
        if origin == destination {
            return Err(ExitError::SameStation(origin.to_string()));
        }
        let base_fare = self
            .fares
            .lookup(origin, destination)
            .ok_or_else(|| ExitError::Unroutable(origin.to_string(), destination.to_string()))?;

        let discount_applied = account.is_discount_eligible(now);
        let fare = if discount_applied {
            discounted(base_fare)
        } else {
            base_fare
        };

        Ok(FareQuote {
            origin: origin.to_string(),
            destination: destination.to_string(),
            base_fare,
            fare,
            discount_applied,
        })
    }
}

fn require(field: &'static str, value: &str) -> Result<(), InputError> {
    if value.trim().is_empty() {
        return Err(InputError::MissingField(field));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("routes", &self.fares.len())
            .finish_non_exhaustive()
    }
}
