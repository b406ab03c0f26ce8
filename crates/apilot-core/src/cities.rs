//! Duplicate-city disambiguation.
//!
//! Several Chinese city and district names map to more than one weather
//! station id. The bundled table lists those names; anything else is safe
//! to query by display name.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Deserialize)]
pub struct CityRecord {
    pub city_id: String,
    pub province: String,
    pub leader: String,
}

#[derive(Debug, Deserialize)]
struct CityEntry {
    data: Vec<CityRecord>,
}

#[derive(Debug)]
pub enum CityResolution<'a> {
    /// Exactly one record: query by its id.
    Resolved(&'a str),
    /// Several same-named cities; the caller must ask the user to resend
    /// the query with a numeric id.
    Ambiguous(&'a [CityRecord]),
    /// Not a duplicated name; query the provider by display name.
    NotFound,
}

pub struct CityTable {
    entries: HashMap<String, Vec<CityRecord>>,
}

static TABLE: OnceLock<CityTable> = OnceLock::new();

impl CityTable {
    /// Process-wide table, parsed from the bundled dataset on first call
    /// and immutable afterwards. The plugin touches it during init so the
    /// lifecycle is explicit and test setup stays deterministic.
    pub fn global() -> &'static CityTable {
        TABLE.get_or_init(|| {
            let raw: HashMap<String, CityEntry> =
                serde_json::from_str(include_str!("../data/duplicate_cities.json"))
                    .expect("bundled duplicate-city table is valid JSON");
            CityTable {
                entries: raw
                    .into_iter()
                    .map(|(name, entry)| (name, entry.data))
                    .collect(),
            }
        })
    }

    /// Exact-name lookup against the duplicate table.
    pub fn resolve(&self, city_name: &str) -> CityResolution<'_> {
        match self.entries.get(city_name) {
            Some(records) if records.len() == 1 => CityResolution::Resolved(&records[0].city_id),
            Some(records) if !records.is_empty() => CityResolution::Ambiguous(records),
            _ => CityResolution::NotFound,
        }
    }
}
