//! Per-card journey ledger.
//!
//! The ledger is append-only with a single exception: the card's open entry
//! is rewritten in place when the journey is closed, either by a normal exit
//! tap or by an administrator forcing it closed. [`Ledger::close_open_entry`]
//! is the only code path allowed to modify a recorded entry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::state::HolderSnapshot;
use crate::Amount;
use crate::model::{EntryId, Station};

/// Origin recorded on teller top-ups.
pub const TOP_UP_SOURCE: &str = "Teller Load";

/// Destination recorded on journeys closed by an administrator.
pub const RESOLVED_EXIT: &str = "resolved-exit";

/// What a ledger entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    /// Tap-in with no matching exit yet: the card is in a journey.
    Entry,
    /// Entry closed by an exit tap; carries the fare paid.
    Journey,
    /// Entry force-closed by an administrator; carries the penalty paid.
    AdminCorrection,
    /// Zero-fare audit record of a mismatch left open for the rider.
    AdminPenaltyLog,
    /// Balance credit; the fare field holds the credited amount.
    TopUp,
}

/// Errors raised by ledger transitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("journey already open from {origin}")]
    AlreadyOpen { origin: Station },
    #[error("no open journey")]
    NoOpenEntry,
    #[error("{0} open journeys recorded for one card")]
    MultipleOpenEntries(usize),
}

/// One recorded gate, teller or administrator event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: EntryId,
    pub kind: LedgerKind,
    /// Time of the event, or of the closure for rewritten entries.
    pub recorded_at: DateTime<Utc>,
    /// Tap-in time, kept when an entry is closed.
    pub entered_at: Option<DateTime<Utc>>,
    pub holder: HolderSnapshot,
    pub origin: Station,
    pub destination: Option<Station>,
    pub fare: Option<Amount>,
    pub discount_applied: bool,
    pub notes: Option<String>,
}

impl LedgerEntry {
    pub fn entry(id: EntryId, at: DateTime<Utc>, holder: HolderSnapshot, origin: Station) -> Self {
        Self {
            id,
            kind: LedgerKind::Entry,
            recorded_at: at,
            entered_at: Some(at),
            holder,
            origin,
            destination: None,
            fare: None,
            discount_applied: false,
            notes: None,
        }
    }

    pub fn top_up(id: EntryId, at: DateTime<Utc>, holder: HolderSnapshot, amount: Amount) -> Self {
        Self {
            id,
            kind: LedgerKind::TopUp,
            recorded_at: at,
            entered_at: None,
            holder,
            origin: TOP_UP_SOURCE.to_string(),
            destination: None,
            fare: Some(amount),
            discount_applied: false,
            notes: None,
        }
    }

    pub fn penalty_log(
        id: EntryId,
        at: DateTime<Utc>,
        holder: HolderSnapshot,
        origin: Station,
        notes: String,
    ) -> Self {
        Self {
            id,
            kind: LedgerKind::AdminPenaltyLog,
            recorded_at: at,
            entered_at: None,
            holder,
            origin,
            destination: None,
            fare: Some(Amount::ZERO),
            discount_applied: false,
            notes: Some(notes),
        }
    }

    pub fn is_open(&self) -> bool {
        self.kind == LedgerKind::Entry
    }
}

/// How an open entry is closed.
#[derive(Debug, Clone)]
pub enum Closure {
    /// Normal exit tap.
    Exit {
        destination: Station,
        fare: Amount,
        discount_applied: bool,
    },
    /// Administrator closed the journey and charged a penalty.
    Forced { penalty: Amount, notes: String },
}

/// Ledger of one card, oldest entry first.
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The card's open entry, if any.
    ///
    /// Looks only at entry-kind records, so top-ups or audit records written
    /// after the tap-in never hide an open journey.
    pub fn open_entry(&self) -> Result<Option<&LedgerEntry>, LedgerError> {
        let mut open = self.entries.iter().filter(|entry| entry.is_open());
        let first = open.next();
        let extra = open.count();
        if extra > 0 {
            return Err(LedgerError::MultipleOpenEntries(extra + 1));
        }
        Ok(first)
    }

    /// Append a new entry. Opening a journey while one is open is refused.
    pub fn append(&mut self, entry: LedgerEntry) -> Result<&LedgerEntry, LedgerError> {
        if entry.is_open() {
            if let Some(open) = self.open_entry()? {
                return Err(LedgerError::AlreadyOpen {
                    origin: open.origin.clone(),
                });
            }
        }
        self.entries.push(entry);
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Rewrite the open entry in place as a closed journey.
    ///
    /// This is the only mutation of an existing entry. The entry keeps its id,
    /// origin and tap-in time; everything else reflects the closure.
    pub fn close_open_entry(
        &mut self,
        closure: Closure,
        holder: HolderSnapshot,
        at: DateTime<Utc>,
    ) -> Result<&LedgerEntry, LedgerError> {
        let position = match self.open_entry()? {
            Some(open) => open.id,
            None => return Err(LedgerError::NoOpenEntry),
        };
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.id == position)
            .ok_or(LedgerError::NoOpenEntry)?;

        match closure {
            Closure::Exit {
                destination,
                fare,
                discount_applied,
            } => {
                entry.kind = LedgerKind::Journey;
                entry.destination = Some(destination);
                entry.fare = Some(fare);
                entry.discount_applied = discount_applied;
            }
            Closure::Forced { penalty, notes } => {
                entry.kind = LedgerKind::AdminCorrection;
                entry.destination = Some(RESOLVED_EXIT.to_string());
                entry.fare = Some(penalty);
                entry.discount_applied = false;
                entry.notes = Some(notes);
            }
        }
        entry.holder = holder;
        entry.recorded_at = at;

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CardCategory;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
    }

    fn holder(balance: i64) -> HolderSnapshot {
        HolderSnapshot {
            name: "Ana".to_string(),
            category: CardCategory::Student,
            balance: Amount::from_units(balance),
        }
    }

    fn tap_in(id: EntryId, origin: &str) -> LedgerEntry {
        LedgerEntry::entry(id, now(), holder(100), origin.to_string())
    }

    #[test]
    fn empty_ledger_has_no_open_entry() {
        assert_eq!(Ledger::new().open_entry(), Ok(None));
    }

    #[test]
    fn append_entry_opens_journey() {
        let mut ledger = Ledger::new();
        ledger.append(tap_in(1, "Central")).unwrap();

        let open = ledger.open_entry().unwrap().unwrap();
        assert_eq!(open.origin, "Central");
        assert_eq!(open.destination, None);
        assert_eq!(open.fare, None);
    }

    #[test]
    fn second_entry_is_refused() {
        let mut ledger = Ledger::new();
        ledger.append(tap_in(1, "Central")).unwrap();

        let result = ledger.append(tap_in(2, "EDSA"));
        assert_eq!(
            result.map(|e| e.id),
            Err(LedgerError::AlreadyOpen {
                origin: "Central".to_string()
            })
        );
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn later_records_do_not_hide_open_entry() {
        let mut ledger = Ledger::new();
        ledger.append(tap_in(1, "Central")).unwrap();
        ledger
            .append(LedgerEntry::top_up(2, now(), holder(150), Amount::from_units(50)))
            .unwrap();

        assert_eq!(ledger.open_entry().unwrap().map(|e| e.id), Some(1));
    }

    #[test]
    fn close_by_exit_rewrites_in_place() {
        let mut ledger = Ledger::new();
        ledger.append(tap_in(1, "Central")).unwrap();
        let later = now() + Duration::minutes(20);

        let closed = ledger
            .close_open_entry(
                Closure::Exit {
                    destination: "Monumento".to_string(),
                    fare: Amount::from_units(10),
                    discount_applied: true,
                },
                holder(90),
                later,
            )
            .unwrap()
            .clone();

        assert_eq!(closed.id, 1);
        assert_eq!(closed.kind, LedgerKind::Journey);
        assert_eq!(closed.origin, "Central");
        assert_eq!(closed.destination.as_deref(), Some("Monumento"));
        assert_eq!(closed.fare, Some(Amount::from_units(10)));
        assert!(closed.discount_applied);
        assert_eq!(closed.holder.balance, Amount::from_units(90));
        assert_eq!(closed.entered_at, Some(now()));
        assert_eq!(closed.recorded_at, later);

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.open_entry(), Ok(None));
    }

    #[test]
    fn forced_close_marks_admin_correction() {
        let mut ledger = Ledger::new();
        ledger.append(tap_in(1, "Central")).unwrap();

        let closed = ledger
            .close_open_entry(
                Closure::Forced {
                    penalty: Amount::from_units(30),
                    notes: "gate fault".to_string(),
                },
                holder(70),
                now(),
            )
            .unwrap();

        assert_eq!(closed.kind, LedgerKind::AdminCorrection);
        assert_eq!(closed.destination.as_deref(), Some(RESOLVED_EXIT));
        assert_eq!(closed.fare, Some(Amount::from_units(30)));
        assert_eq!(closed.notes.as_deref(), Some("gate fault"));
    }

    #[test]
    fn close_without_open_entry_fails() {
        let mut ledger = Ledger::new();
        let result = ledger.close_open_entry(
            Closure::Forced {
                penalty: Amount::ZERO,
                notes: String::new(),
            },
            holder(100),
            now(),
        );
        assert_eq!(result.map(|e| e.id), Err(LedgerError::NoOpenEntry));
    }

    #[test]
    fn journey_can_reopen_after_close() {
        let mut ledger = Ledger::new();
        ledger.append(tap_in(1, "Central")).unwrap();
        ledger
            .close_open_entry(
                Closure::Exit {
                    destination: "EDSA".to_string(),
                    fare: Amount::from_units(20),
                    discount_applied: false,
                },
                holder(80),
                now(),
            )
            .unwrap();

        ledger.append(tap_in(2, "EDSA")).unwrap();
        assert_eq!(ledger.open_entry().unwrap().map(|e| e.id), Some(2));
    }

    #[test]
    fn penalty_log_is_not_open() {
        let entry = LedgerEntry::penalty_log(
            1,
            now(),
            holder(100),
            "Central".to_string(),
            "logged".to_string(),
        );
        assert!(!entry.is_open());
        assert_eq!(entry.fare, Some(Amount::ZERO));
    }

    #[test]
    fn multiple_open_entries_are_reported() {
        // Only reachable by bypassing `append`
        let ledger = Ledger {
            entries: vec![tap_in(1, "Central"), tap_in(2, "EDSA")],
        };
        assert_eq!(ledger.open_entry(), Err(LedgerError::MultipleOpenEntries(2)));
    }
}
