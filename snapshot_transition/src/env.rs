use std::path::PathBuf;

use tracing::{debug, warn};

/// Loads the nearest `.env` file into the process environment and returns
/// its path.
///
/// Variables already set are left alone. A missing file is not an error; a
/// malformed one is logged and skipped.
pub fn load_dotenvy_vars_if_present() -> Option<PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => {
            debug!(path = %path.display(), "Loaded environment file");
            Some(path)
        }
        Err(e) if e.not_found() => None,
        Err(e) => {
            warn!("Ignoring malformed `.env` file: {e}");
            None
        }
    }
}
