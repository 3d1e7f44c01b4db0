//! Frozen provider-keyed lookup tables.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::NastroError;

/// On-disk layout: `{"version": 3, "mappings": {"POLYGON": {"4": "XNAS"}}}`.
/// A `null` value records "known raw key, no canonical equivalent".
#[derive(Debug, Deserialize)]
struct MappingFile {
    version: u32,
    mappings: HashMap<String, HashMap<String, Option<String>>>,
}

/// An immutable lookup table keyed by `(PROVIDER, raw)`.
///
/// The table is built mutably during load and frozen before it is shared;
/// readers need no synchronization. Provider keys are uppercased at load.
#[derive(Debug, Default)]
pub struct MappingTable {
    version: u32,
    map: HashMap<(String, String), Option<String>>,
}

impl MappingTable {
    /// An empty table with version 0.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a table from its JSON representation.
    pub fn from_json_str(json: &str) -> Result<Self, NastroError> {
        let file: MappingFile = serde_json::from_str(json)
            .map_err(|e| NastroError::InvalidArg(format!("malformed mapping table: {e}")))?;
        let mut map = HashMap::new();
        for (provider, entries) in file.mappings {
            let provider = provider.to_uppercase();
            for (raw, canonical) in entries {
                map.insert((provider.clone(), raw), canonical);
            }
        }
        Ok(Self {
            version: file.version,
            map,
        })
    }

    /// Load a table from disk. A missing file yields an empty table with a
    /// warning; a present-but-malformed file is an error.
    pub fn load(path: &Path) -> Result<Self, NastroError> {
        match std::fs::read_to_string(path) {
            Ok(json) => Self::from_json_str(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "mapping table missing, using empty table");
                Ok(Self::empty())
            }
            Err(e) => Err(NastroError::Other(format!(
                "reading mapping table {}: {e}",
                path.display()
            ))),
        }
    }

    /// Table version as declared by the file.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Look up `(provider, raw)`.
    ///
    /// Outer `None` means the pair has no entry. `Some(None)` means the raw
    /// key is known but maps to nothing. When the exact raw key misses and
    /// its uppercase form differs, the uppercase form is retried.
    #[must_use]
    pub fn get(&self, provider: &str, raw: &str) -> Option<Option<&str>> {
        let provider = provider.to_uppercase();
        if let Some(value) = self.map.get(&(provider.clone(), raw.to_string())) {
            return Some(value.as_deref());
        }
        let upper = raw.to_uppercase();
        if upper != raw {
            if let Some(value) = self.map.get(&(provider, upper)) {
                return Some(value.as_deref());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VENUES: &str = r#"{
        "version": 2,
        "mappings": {
            "Polygon": { "4": "XNAS", "n": "XNYS", "dark": null }
        }
    }"#;

    #[test]
    fn parses_and_uppercases_providers() {
        let table = MappingTable::from_json_str(VENUES).unwrap();
        assert_eq!(table.version(), 2);
        assert_eq!(table.get("polygon", "4"), Some(Some("XNAS")));
        assert_eq!(table.get("POLYGON", "4"), Some(Some("XNAS")));
    }

    #[test]
    fn null_entries_are_known_but_unmapped() {
        let table = MappingTable::from_json_str(VENUES).unwrap();
        assert_eq!(table.get("polygon", "dark"), Some(None));
        assert_eq!(table.get("polygon", "nope"), None);
    }

    #[test]
    fn case_insensitive_fallback_on_raw_key() {
        let table = MappingTable::from_json_str(
            r#"{"version":1,"mappings":{"POLYGON":{"N": "XNYS"}}}"#,
        )
        .unwrap();
        // "n" misses, "N" hits.
        assert_eq!(table.get("polygon", "n"), Some(Some("XNYS")));
    }

    #[test]
    fn missing_file_loads_empty() {
        let table = MappingTable::load(Path::new("/nonexistent/venue_mics.json")).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.version(), 0);
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(MappingTable::from_json_str("{not json").is_err());
    }
}
