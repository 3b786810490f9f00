//! Shared card store with one serialization point per card.
//!
//! No task ever waits on a card mutex while holding the index lock.
//! Operations on a single card clone its handle under a short index read
//! lock, drop the index lock, then hold only the card mutex for the whole
//! read-check-write. Profile updates take the index write lock briefly while
//! already holding their card.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::error::StoreError;
use super::ledger::{Ledger, LedgerError};
use super::state::CardAccount;
use crate::model::{CardId, EntryId, ProfileUpdate};

/// Default bound on waiting for another operation on the same card.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// A card account together with its ledger.
#[derive(Debug)]
pub struct CardRecord {
    pub account: CardAccount,
    pub ledger: Ledger,
}

impl CardRecord {
    /// Wrap a ledger error as a store inconsistency for this card.
    pub fn corrupted(&self, source: LedgerError) -> StoreError {
        StoreError::Corrupted {
            card: self.account.id().to_string(),
            source,
        }
    }
}

/// Exclusive access to one card for the duration of an operation.
pub type CardGuard = OwnedMutexGuard<CardRecord>;

#[derive(Debug, Default)]
struct Index {
    cards: HashMap<CardId, Arc<Mutex<CardRecord>>>,
    student_ids: HashMap<String, CardId>,
}

/// In-memory store of card accounts and ledgers.
#[derive(Debug)]
pub struct CardStore {
    index: RwLock<Index>,
    next_entry_id: AtomicU64,
    lock_timeout: Duration,
}

impl CardStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            index: RwLock::new(Index::default()),
            next_entry_id: AtomicU64::new(1),
            lock_timeout,
        }
    }

    /// Next ledger entry id; ids are never reused.
    pub fn next_entry_id(&self) -> EntryId {
        self.next_entry_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Add a newly registered account with an empty ledger.
    pub async fn insert(&self, account: CardAccount) -> Result<(), StoreError> {
        let mut index = self.index.write().await;

        if index.cards.contains_key(account.id()) {
            return Err(StoreError::DuplicateCard(account.id().to_string()));
        }
        if let Some(student_id) = account.student_id() {
            if index.student_ids.contains_key(student_id) {
                return Err(StoreError::DuplicateStudentId(student_id.to_string()));
            }
            index
                .student_ids
                .insert(student_id.to_string(), account.id().to_string());
        }

        let card = account.id().to_string();
        let record = CardRecord {
            account,
            ledger: Ledger::new(),
        };
        index.cards.insert(card, Arc::new(Mutex::new(record)));
        Ok(())
    }

    /// Lock one card for a read-check-write sequence.
    pub async fn lock(&self, card: &str) -> Result<CardGuard, StoreError> {
        let handle = {
            let index = self.index.read().await;
            index
                .cards
                .get(card)
                .cloned()
                .ok_or_else(|| StoreError::CardNotFound(card.to_string()))?
        };
        self.acquire(card, handle).await
    }

    /// Resolve a card id or student id to the card id.
    pub async fn resolve(&self, identifier: &str) -> Option<CardId> {
        let index = self.index.read().await;
        if index.cards.contains_key(identifier) {
            return Some(identifier.to_string());
        }
        index.student_ids.get(identifier).cloned()
    }

    /// Every registered card id, in no particular order.
    pub async fn card_ids(&self) -> Vec<CardId> {
        self.index.read().await.cards.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.cards.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Replace holder details, keeping the student id index in step.
    ///
    /// The card is locked first; the index write lock is taken only for the
    /// student id check and swap, so other cards are never stalled behind a
    /// busy one.
    pub async fn update_profile(
        &self,
        card: &str,
        update: ProfileUpdate,
        now: DateTime<Utc>,
    ) -> Result<CardAccount, StoreError> {
        let mut record = self.lock(card).await?;
        let mut index = self.index.write().await;

        if let Some(student_id) = update.student_id.as_deref() {
            if let Some(owner) = index.student_ids.get(student_id) {
                if owner != card {
                    return Err(StoreError::DuplicateStudentId(student_id.to_string()));
                }
            }
        }

        if let Some(old) = record.account.student_id() {
            index.student_ids.remove(old);
        }
        if let Some(new) = update.student_id.as_deref() {
            index.student_ids.insert(new.to_string(), card.to_string());
        }
        drop(index);
        record.account.apply_profile(update, now);

        Ok(record.account.clone())
    }

    async fn acquire(
        &self,
        card: &str,
        handle: Arc<Mutex<CardRecord>>,
    ) -> Result<CardGuard, StoreError> {
        tokio::time::timeout(self.lock_timeout, handle.lock_owned())
            .await
            .map_err(|_| StoreError::Busy(card.to_string()))
    }
}

impl Default for CardStore {
    fn default() -> Self {
        Self::new()
    }
}
