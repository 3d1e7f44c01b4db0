//! Last-run backfill status persisted for the UI.

use std::path::{Path, PathBuf};

use nastro_core::NastroError;
use nastro_types::BackfillResult;

/// Persists the most recent [`BackfillResult`] as JSON at
/// `<data_root>/.mdc/backfill_status.json`.
///
/// Writes go through a temp file and rename so readers never observe a
/// partial document.
#[derive(Debug, Clone)]
pub struct StatusStore {
    data_root: PathBuf,
}

impl StatusStore {
    /// Store rooted at `data_root`.
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    /// Path of the status file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.data_root.join(".mdc").join("backfill_status.json")
    }

    /// Write `result` as the last-run status.
    pub fn save(&self, result: &BackfillResult) -> Result<(), NastroError> {
        let path = self.path();
        let dir = path.parent().expect("status path has a parent");
        std::fs::create_dir_all(dir)
            .map_err(|e| NastroError::Other(format!("creating {}: {e}", dir.display())))?;

        let json = serde_json::to_vec_pretty(result)
            .map_err(|e| NastroError::Other(format!("encoding backfill status: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| NastroError::Other(format!("writing {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| NastroError::Other(format!("renaming into {}: {e}", path.display())))?;
        Ok(())
    }

    /// Read the last-run status, `None` when no run has been persisted.
    pub fn load(&self) -> Result<Option<BackfillResult>, NastroError> {
        let path = self.path();
        match std::fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| NastroError::Other(format!("decoding {}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(NastroError::Other(format!(
                "reading {}: {e}",
                path.display()
            ))),
        }
    }

    /// The configured data root.
    #[must_use]
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }
}
