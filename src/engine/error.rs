//! Error types for card operations.

use thiserror::Error;

use super::ledger::LedgerError;
use crate::Amount;
use crate::model::{CardId, Station};

/// Coarse classification a request boundary can map to a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidInput,
    InsufficientFunds,
    Internal,
}

/// Top-level error returned by every [`Engine`](super::Engine) operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("entry failed: {0}")]
    Entry(#[from] EntryError),

    #[error("exit failed: {0}")]
    Exit(#[from] ExitError),

    #[error("mismatch resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("{0}")]
    Input(#[from] InputError),

    #[error("{0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Entry(EntryError::AlreadyInJourney { .. }) => ErrorKind::Conflict,
            EngineError::Exit(ExitError::NoOpenJourney(_)) => ErrorKind::Conflict,
            EngineError::Exit(ExitError::SameStation(_) | ExitError::Unroutable(..)) => {
                ErrorKind::InvalidInput
            }
            EngineError::Exit(ExitError::InsufficientFunds { .. }) => {
                ErrorKind::InsufficientFunds
            }
            EngineError::Resolve(ResolveError::InsufficientFunds { .. }) => {
                ErrorKind::InsufficientFunds
            }
            EngineError::Resolve(_) => ErrorKind::InvalidInput,
            EngineError::Input(_) => ErrorKind::InvalidInput,
            EngineError::Store(StoreError::CardNotFound(_)) => ErrorKind::NotFound,
            EngineError::Store(
                StoreError::DuplicateCard(_) | StoreError::DuplicateStudentId(_),
            ) => ErrorKind::Conflict,
            EngineError::Store(StoreError::Busy(_) | StoreError::Corrupted { .. }) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Error during an entry tap.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("card {card} is already in an open journey from {origin}")]
    AlreadyInJourney { card: CardId, origin: Station },
}

/// Error during an exit tap, or while quoting a fare.
#[derive(Debug, Error)]
pub enum ExitError {
    #[error("card {0} has no open journey")]
    NoOpenJourney(CardId),
    #[error("origin and destination are both {0}")]
    SameStation(Station),
    #[error("no fare from {0} to {1}")]
    Unroutable(Station, Station),
    #[error("insufficient balance on card {card}: balance {balance}, fare {fare}")]
    InsufficientFunds {
        card: CardId,
        balance: Amount,
        fare: Amount,
    },
}

/// Error during an administrative mismatch resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("card {0} has no open journey to resolve")]
    NothingToResolve(CardId),
    #[error("penalty {0} is outside 0.00..={1}")]
    PenaltyOutOfRange(Amount, Amount),
    #[error("insufficient balance on card {card}: balance {balance}, penalty {penalty}")]
    InsufficientFunds {
        card: CardId,
        balance: Amount,
        penalty: Amount,
    },
}

/// Malformed request values, detected before touching any card.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Amount),
    #[error("initial balance cannot be negative, got {0}")]
    NegativeBalance(Amount),
    #[error("adding {amount} to balance {balance} exceeds the largest representable amount")]
    AmountOutOfRange { balance: Amount, amount: Amount },
}

/// Error raised by the card store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("card {0} not found")]
    CardNotFound(CardId),
    #[error("card {0} is already registered")]
    DuplicateCard(CardId),
    #[error("student id {0} is already in use")]
    DuplicateStudentId(String),
    #[error("card {0} is busy, try again")]
    Busy(CardId),
    #[error("ledger of card {card} is inconsistent: {source}")]
    Corrupted { card: CardId, source: LedgerError },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_taxonomy() {
        let not_found: EngineError = StoreError::CardNotFound("X".into()).into();
        assert_eq!(not_found.kind(), ErrorKind::NotFound);

        let conflict: EngineError = ExitError::NoOpenJourney("X".into()).into();
        assert_eq!(conflict.kind(), ErrorKind::Conflict);

        let invalid: EngineError = ResolveError::NothingToResolve("X".into()).into();
        assert_eq!(invalid.kind(), ErrorKind::InvalidInput);

        let funds: EngineError = ExitError::InsufficientFunds {
            card: "X".into(),
            balance: Amount::from_units(5),
            fare: Amount::from_units(20),
        }
        .into();
        assert_eq!(funds.kind(), ErrorKind::InsufficientFunds);

        let internal: EngineError = StoreError::Corrupted {
            card: "X".into(),
            source: LedgerError::MultipleOpenEntries(2),
        }
        .into();
        assert_eq!(internal.kind(), ErrorKind::Internal);
    }

    #[test]
    fn messages_name_the_card() {
        let err: EngineError = EntryError::AlreadyInJourney {
            card: "RFID-1".into(),
            origin: "Central".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "entry failed: card RFID-1 is already in an open journey from Central"
        );
    }
}
