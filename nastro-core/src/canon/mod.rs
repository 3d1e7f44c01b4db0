//! Canonicalization lookup tables, frozen after load.
//!
//! Three tables share the `(PROVIDER, raw)` JSON layout: symbol overrides,
//! venue→MIC, and condition codes. Symbol resolution is provider-aware first
//! and falls back to the generic section (provider key `*`). Tables are
//! immutable once constructed, so readers share them without locks.

mod tables;

use std::path::Path;

pub use tables::MappingTable;

use crate::NastroError;

/// Provider key of the generic symbol-override section.
pub const GENERIC_PROVIDER: &str = "*";

/// Name returned for condition codes with no table entry.
pub const UNKNOWN_CONDITION: &str = "Unknown";

/// Aggregated lookup tables used to enrich raw events.
#[derive(Debug, Default)]
pub struct Canonicalizer {
    symbols: MappingTable,
    venues: MappingTable,
    conditions: MappingTable,
}

impl Canonicalizer {
    /// Build from already-loaded tables.
    #[must_use]
    pub const fn new(
        symbols: MappingTable,
        venues: MappingTable,
        conditions: MappingTable,
    ) -> Self {
        Self {
            symbols,
            venues,
            conditions,
        }
    }

    /// All-empty tables: every symbol resolves to itself, every venue and
    /// condition is unknown.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the three tables from a directory, tolerating missing files:
    /// `symbol_overrides.json`, `venue_mics.json`, `condition_codes.json`.
    pub fn load_dir(dir: &Path) -> Result<Self, NastroError> {
        Ok(Self {
            symbols: MappingTable::load(&dir.join("symbol_overrides.json"))?,
            venues: MappingTable::load(&dir.join("venue_mics.json"))?,
            conditions: MappingTable::load(&dir.join("condition_codes.json"))?,
        })
    }

    /// Resolve the canonical symbol for `(provider, raw)`.
    ///
    /// Provider-specific overrides win; the generic section is consulted
    /// next; with no entry the raw symbol is its own canonical form.
    #[must_use]
    pub fn resolve_symbol(&self, provider: &str, raw: &str) -> String {
        if let Some(Some(mapped)) = self.symbols.get(provider, raw) {
            return mapped.to_string();
        }
        if let Some(Some(mapped)) = self.symbols.get(GENERIC_PROVIDER, raw) {
            return mapped.to_string();
        }
        raw.to_string()
    }

    /// Whether symbol resolution found an explicit table entry.
    #[must_use]
    pub fn symbol_is_mapped(&self, provider: &str, raw: &str) -> bool {
        matches!(self.symbols.get(provider, raw), Some(Some(_)))
            || matches!(self.symbols.get(GENERIC_PROVIDER, raw), Some(Some(_)))
    }

    /// Map a raw venue tag to its ISO 10383 MIC. Unknown or explicitly
    /// unmapped venues yield `None`.
    #[must_use]
    pub fn resolve_venue(&self, provider: &str, raw_venue: &str) -> Option<String> {
        self.venues
            .get(provider, raw_venue)
            .flatten()
            .map(str::to_string)
    }

    /// Canonical name of a condition code, or [`UNKNOWN_CONDITION`].
    #[must_use]
    pub fn condition_name(&self, provider: &str, raw: &str) -> String {
        self.conditions
            .get(provider, raw)
            .flatten()
            .unwrap_or(UNKNOWN_CONDITION)
            .to_string()
    }

    /// Version of the venue table, for diagnostics.
    #[must_use]
    pub const fn venue_table_version(&self) -> u32 {
        self.venues.version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonicalizer() -> Canonicalizer {
        let symbols = MappingTable::from_json_str(
            r#"{"version":1,"mappings":{
                "YAHOO": {"BRK-B": "BRK.B"},
                "*": {"GOOGL": "GOOG"}
            }}"#,
        )
        .unwrap();
        let venues = MappingTable::from_json_str(
            r#"{"version":1,"mappings":{"POLYGON":{"4": "XNAS", "dark": null}}}"#,
        )
        .unwrap();
        let conditions = MappingTable::from_json_str(
            r#"{"version":1,"mappings":{"POLYGON":{"@": "Regular"}}}"#,
        )
        .unwrap();
        Canonicalizer::new(symbols, venues, conditions)
    }

    #[test]
    fn provider_override_wins_over_generic() {
        let canon = canonicalizer();
        assert_eq!(canon.resolve_symbol("yahoo", "BRK-B"), "BRK.B");
        assert_eq!(canon.resolve_symbol("yahoo", "GOOGL"), "GOOG");
        assert_eq!(canon.resolve_symbol("yahoo", "AAPL"), "AAPL");
    }

    #[test]
    fn venue_unknown_and_unmapped_are_none() {
        let canon = canonicalizer();
        assert_eq!(canon.resolve_venue("polygon", "4"), Some("XNAS".into()));
        assert_eq!(canon.resolve_venue("polygon", "dark"), None);
        assert_eq!(canon.resolve_venue("polygon", "77"), None);
    }

    #[test]
    fn condition_falls_back_to_unknown() {
        let canon = canonicalizer();
        assert_eq!(canon.condition_name("polygon", "@"), "Regular");
        assert_eq!(canon.condition_name("polygon", "zz"), UNKNOWN_CONDITION);
    }
}
