//! Static station-pair fare lookup.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::Amount;
use crate::model::Station;

/// Errors raised while building a fare table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FareTableError {
    #[error("fare from {0} to {0} is not a route")]
    SameStation(Station),
    #[error("fare from {0} to {1} is negative: {2}")]
    NegativeFare(Station, Station, Amount),
    #[error("fare from {0} to {1} is listed twice")]
    DuplicateRoute(Station, Station),
}

/// Base fare per directed (origin, destination) pair.
///
/// Pairs are not symmetric: `A -> B` and `B -> A` must each be listed.
#[derive(Debug, Default, Clone)]
pub struct FareTable {
    routes: HashMap<Station, HashMap<Station, Amount>>,
}

impl FareTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directed route.
    pub fn insert(
        &mut self,
        origin: impl Into<Station>,
        destination: impl Into<Station>,
        fare: Amount,
    ) -> Result<(), FareTableError> {
        let origin = origin.into();
        let destination = destination.into();

        if origin == destination {
            return Err(FareTableError::SameStation(origin));
        }
        if fare.is_negative() {
            return Err(FareTableError::NegativeFare(origin, destination, fare));
        }

        let row = self.routes.entry(origin.clone()).or_default();
        if row.contains_key(&destination) {
            return Err(FareTableError::DuplicateRoute(origin, destination));
        }
        row.insert(destination, fare);
        Ok(())
    }

    /// Base fare for the route, `None` if the pair is not routable.
    pub fn lookup(&self, origin: &str, destination: &str) -> Option<Amount> {
        self.routes.get(origin)?.get(destination).copied()
    }

    /// Number of directed routes.
    pub fn len(&self) -> usize {
        self.routes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every station named in the table, sorted.
    pub fn stations(&self) -> BTreeSet<&str> {
        self.routes
            .iter()
            .flat_map(|(origin, row)| {
                std::iter::once(origin.as_str()).chain(row.keys().map(String::as_str))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> FareTable {
        let mut fares = FareTable::new();
        fares
            .insert("Baclaran", "Central", Amount::from_units(20))
            .unwrap();
        fares
            .insert("Central", "Monumento", Amount::from_units(25))
            .unwrap();
        fares
    }

    #[test]
    fn lookup_known_route() {
        assert_eq!(
            table().lookup("Baclaran", "Central"),
            Some(Amount::from_units(20))
        );
    }

    #[test]
    fn lookup_is_directional() {
        assert_eq!(table().lookup("Central", "Baclaran"), None);
    }

    #[test]
    fn lookup_unknown_station() {
        assert_eq!(table().lookup("Nowhere", "Central"), None);
    }

    #[test]
    fn insert_rejects_same_station() {
        let mut fares = FareTable::new();
        assert_eq!(
            fares.insert("Central", "Central", Amount::from_units(10)),
            Err(FareTableError::SameStation("Central".to_string()))
        );
    }

    #[test]
    fn insert_rejects_negative_fare() {
        let mut fares = FareTable::new();
        assert!(matches!(
            fares.insert("A", "B", Amount::from_scaled(-1)),
            Err(FareTableError::NegativeFare(..))
        ));
    }

    #[test]
    fn insert_rejects_duplicate_route() {
        let mut fares = table();
        assert!(matches!(
            fares.insert("Baclaran", "Central", Amount::from_units(30)),
            Err(FareTableError::DuplicateRoute(..))
        ));
        // First value kept
        assert_eq!(
            fares.lookup("Baclaran", "Central"),
            Some(Amount::from_units(20))
        );
    }

    #[test]
    fn zero_fare_is_allowed() {
        let mut fares = FareTable::new();
        fares.insert("A", "B", Amount::ZERO).unwrap();
        assert_eq!(fares.lookup("A", "B"), Some(Amount::ZERO));
    }

    #[test]
    fn len_and_stations() {
        let fares = table();
        assert_eq!(fares.len(), 2);
        assert!(!fares.is_empty());
        let stations: Vec<_> = fares.stations().into_iter().collect();
        assert_eq!(stations, vec!["Baclaran", "Central", "Monumento"]);
    }
}
