use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::warn;

/// How the final in-place swap went
#[derive(Debug)]
pub enum Finalize {
    /// The temporary file atomically replaced the original
    Replaced,
    /// The rename failed and the original was deleted; the result survives in `kept_temp`
    RenameFailedOriginalRemoved {
        rename_error: io::Error,
        kept_temp: PathBuf,
    },
    /// The rename failed and so did deleting the original
    RenameFailedRemoveFailed {
        rename_error: io::Error,
        remove_error: io::Error,
        kept_temp: PathBuf,
    },
}

impl Finalize {
    pub fn is_replaced(&self) -> bool {
        matches!(self, Finalize::Replaced)
    }

    pub fn kept_temp(&self) -> Option<&Path> {
        match self {
            Finalize::Replaced => None,
            Finalize::RenameFailedOriginalRemoved { kept_temp, .. }
            | Finalize::RenameFailedRemoveFailed { kept_temp, .. } => Some(kept_temp),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Finalize::Replaced => "replaced".to_string(),
            Finalize::RenameFailedOriginalRemoved {
                rename_error,
                kept_temp,
            } => format!(
                "File renaming error: {}; original removed, result kept in '{}'",
                rename_error,
                kept_temp.display()
            ),
            Finalize::RenameFailedRemoveFailed {
                rename_error,
                remove_error,
                kept_temp,
            } => format!(
                "File renaming error: {}; file deleting error: {}; result kept in '{}'",
                rename_error,
                remove_error,
                kept_temp.display()
            ),
        }
    }
}

/// Renames `temp` over `target`.
///
/// If the rename fails the temporary file is kept on disk and the original is
/// deleted, so the transformed content is what remains at a known path.
pub fn swap_into_place(temp: NamedTempFile, target: &Path) -> Finalize {
    let err = match temp.persist(target) {
        Ok(_) => return Finalize::Replaced,
        Err(err) => err,
    };

    let rename_error = err.error;
    let kept_temp = err.file.path().to_path_buf();
    warn!(
        "Renaming {} to {} failed: {}",
        kept_temp.display(),
        target.display(),
        rename_error
    );
    if let Err(keep_error) = err.file.into_temp_path().keep() {
        warn!(
            "Could not keep temporary file {}: {}",
            kept_temp.display(),
            keep_error
        );
    }

    match fs::remove_file(target) {
        Ok(()) => Finalize::RenameFailedOriginalRemoved {
            rename_error,
            kept_temp,
        },
        Err(remove_error) => {
            warn!("Deleting {} failed: {}", target.display(), remove_error);
            Finalize::RenameFailedRemoveFailed {
                rename_error,
                remove_error,
                kept_temp,
            }
        }
    }
}
