use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::Amount;
use crate::amount::AmountError;
use crate::engine::CardSummary;
use crate::fare::{FareTable, FareTableError};
use crate::model::{CardCategory, CardId, Command, NewCard, Profile, Station};

/// Errors that can occur when reading or writing csv files
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: invalid amount: {source}")]
    Amount { line: usize, source: AmountError },

    #[error("line {line}: {source}")]
    Fare { line: usize, source: FareTableError },

    #[error("line {line}: unrecognized command type '{kind}'")]
    UnrecognizedType { line: usize, kind: String },

    #[error("line {line}: {kind} missing {field}")]
    MissingField {
        line: usize,
        kind: String,
        field: &'static str,
    },

    #[error("failed to write report: {0}")]
    Write(#[from] csv::Error),
}

#[derive(Debug, Deserialize)]
struct FareRow {
    origin: Station,
    destination: Station,
    fare: String,
}

#[derive(Debug, Deserialize)]
struct InputRow {
    r#type: String,
    card: CardId,
    station: Option<Station>,
    amount: Option<String>,
    name: Option<String>,
    category: Option<CardCategory>,
    student_id: Option<String>,
    notes: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutputRow<'a> {
    card: &'a str,
    name: &'a str,
    category: String,
    status: String,
    balance: String,
    in_journey: bool,
}

fn open(path: &Path) -> Result<csv::Reader<std::fs::File>, CsvError> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })
}

fn parse_amount(line: usize, raw: &str) -> Result<Amount, CsvError> {
    raw.parse()
        .map_err(|source| CsvError::Amount { line, source })
}

/// Load the fare table; any bad row fails the whole load
pub fn load_fares(path: impl AsRef<Path>) -> Result<FareTable, CsvError> {
    let mut fares = FareTable::new();

    for (idx, result) in open(path.as_ref())?.into_deserialize::<FareRow>().enumerate() {
        let line = idx + 2; // 1-indexed, skip header
        let row = result.map_err(|source| CsvError::Parse { line, source })?;
        let fare = parse_amount(line, &row.fare)?;
        fares
            .insert(row.origin, row.destination, fare)
            .map_err(|source| CsvError::Fare { line, source })?;
    }

    Ok(fares)
}

/// Read commands from a csv file
pub fn read_commands(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<Command, CsvError>>, CsvError> {
    let reader = open(path.as_ref())?;

    Ok(reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            to_command(line, row)
        }))
}

fn to_command(line: usize, row: InputRow) -> Result<Command, CsvError> {
    let kind = row.r#type.as_str();
    let missing = |field: &'static str| CsvError::MissingField {
        line,
        kind: kind.to_string(),
        field,
    };
    let card = row.card;

    match kind {
        "register" => {
            let initial_balance = match row.amount.as_deref() {
                Some(raw) => parse_amount(line, raw)?,
                None => Amount::ZERO,
            };
            Ok(Command::Register(NewCard {
                card,
                student_id: row.student_id,
                name: row.name.ok_or_else(|| missing("name"))?,
                category: row.category.unwrap_or_default(),
                initial_balance,
                profile: Profile::default(),
            }))
        }
        "validate" => Ok(Command::Validate { card }),
        "deactivate" => Ok(Command::Deactivate { card }),
        "top_up" => {
            let raw = row.amount.ok_or_else(|| missing("amount"))?;
            Ok(Command::TopUp {
                card,
                amount: parse_amount(line, &raw)?,
            })
        }
        "entry" => Ok(Command::Entry {
            card,
            station: row.station.ok_or_else(|| missing("station"))?,
        }),
        "exit" => Ok(Command::Exit {
            card,
            station: row.station.ok_or_else(|| missing("station"))?,
        }),
        "resolve" => {
            let raw = row.amount.ok_or_else(|| missing("amount"))?;
            Ok(Command::ResolveMismatch {
                card,
                penalty: parse_amount(line, &raw)?,
                notes: row.notes,
            })
        }
        other => Err(CsvError::UnrecognizedType {
            line,
            kind: other.to_string(),
        }),
    }
}

/// Write the card report in csv format
pub fn write_cards<'a>(
    cards: impl IntoIterator<Item = &'a CardSummary>,
    out: impl io::Write,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(out);

    for card in cards {
        writer.serialize(OutputRow {
            card: &card.card,
            name: &card.name,
            category: card.category.to_string(),
            status: card.effective_status.to_string(),
            balance: card.balance.to_string(),
            in_journey: card.in_journey,
        })?;
    }

    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EffectiveStatus;
    use chrono::Utc;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "type,card,station,amount,name,category,student_id,notes\n";

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn read(rows: &str) -> Vec<Result<Command, CsvError>> {
        let file = write_csv(&format!("{HEADER}{rows}"));
        read_commands(file.path()).unwrap().collect()
    }

    #[test]
    fn load_fare_table() {
        let file = write_csv("origin,destination,fare\nBaclaran,EDSA,15\nEDSA,Baclaran,15.00\n");
        let fares = load_fares(file.path()).unwrap();
        assert_eq!(fares.len(), 2);
        assert_eq!(fares.lookup("EDSA", "Baclaran"), Some(Amount::from_units(15)));
    }

    #[test]
    fn load_fare_table_rejects_duplicates() {
        let file = write_csv("origin,destination,fare\nA,B,15\nA,B,16\n");
        let err = load_fares(file.path()).unwrap_err();
        assert!(matches!(err, CsvError::Fare { line: 3, .. }));
    }

    #[test]
    fn load_fare_table_rejects_bad_amount() {
        let file = write_csv("origin,destination,fare\nA,B,1.234\n");
        let err = load_fares(file.path()).unwrap_err();
        assert!(matches!(err, CsvError::Amount { line: 2, .. }));
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let err = load_fares("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, CsvError::Open { .. }));
    }

    #[test]
    fn read_register() {
        let results = read("register,RFID-1,,150.50,Ana,standard,2021-001,\n");
        assert_eq!(results.len(), 1);

        match results.into_iter().next().unwrap().unwrap() {
            Command::Register(new_card) => {
                assert_eq!(new_card.card, "RFID-1");
                assert_eq!(new_card.name, "Ana");
                assert_eq!(new_card.category, CardCategory::Standard);
                assert_eq!(new_card.student_id.as_deref(), Some("2021-001"));
                assert_eq!(new_card.initial_balance, Amount::from_scaled(15_050));
            }
            _ => panic!("expected register"),
        }
    }

    #[test]
    fn register_defaults_to_student_with_zero_balance() {
        let results = read("register,RFID-1,,,Ana,,,\n");
        match results.into_iter().next().unwrap().unwrap() {
            Command::Register(new_card) => {
                assert_eq!(new_card.category, CardCategory::Student);
                assert_eq!(new_card.initial_balance, Amount::ZERO);
                assert_eq!(new_card.student_id, None);
            }
            _ => panic!("expected register"),
        }
    }

    #[test]
    fn read_taps_with_whitespace() {
        let results = read("entry, RFID-1, Central,,,,,\nexit, RFID-1, EDSA,,,,,\n");
        assert_eq!(results.len(), 2);

        match results[0].as_ref().unwrap() {
            Command::Entry { card, station } => {
                assert_eq!(card, "RFID-1");
                assert_eq!(station, "Central");
            }
            _ => panic!("expected entry"),
        }
        assert!(matches!(results[1], Ok(Command::Exit { .. })));
    }

    #[test]
    fn read_resolve_with_notes() {
        let results = read("resolve,RFID-1,,30,,,,gate fault\n");
        match results.into_iter().next().unwrap().unwrap() {
            Command::ResolveMismatch {
                card,
                penalty,
                notes,
            } => {
                assert_eq!(card, "RFID-1");
                assert_eq!(penalty, Amount::from_units(30));
                assert_eq!(notes.as_deref(), Some("gate fault"));
            }
            _ => panic!("expected resolve"),
        }
    }

    #[test]
    fn read_returns_error_for_unknown_type() {
        let results = read("teleport,RFID-1,,,,,,\n");
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(err, CsvError::UnrecognizedType { line: 2, .. }));
    }

    #[test]
    fn read_returns_error_for_missing_fields() {
        let results = read("entry,RFID-1,,,,,,\ntop_up,RFID-1,,,,,,\n");
        assert!(matches!(
            results[0].as_ref().unwrap_err(),
            CsvError::MissingField {
                line: 2,
                field: "station",
                ..
            }
        ));
        assert!(matches!(
            results[1].as_ref().unwrap_err(),
            CsvError::MissingField {
                line: 3,
                field: "amount",
                ..
            }
        ));
    }

    #[test]
    fn read_returns_error_for_bad_amount() {
        let results = read("top_up,RFID-1,,ten,,,,\n");
        assert!(matches!(
            results[0].as_ref().unwrap_err(),
            CsvError::Amount { line: 2, .. }
        ));
    }

    #[test]
    fn write_report() {
        let cards = vec![CardSummary {
            card: "RFID-1".to_string(),
            student_id: None,
            name: "Ana".to_string(),
            category: CardCategory::Student,
            effective_status: EffectiveStatus::Validated,
            balance: Amount::from_units(90),
            in_journey: false,
            created_at: Utc::now(),
        }];

        let mut out = Vec::new();
        write_cards(&cards, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "card,name,category,status,balance,in_journey");
        assert_eq!(lines[1], "RFID-1,Ana,student,Validated,90.00,false");
    }
}
