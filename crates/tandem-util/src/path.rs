//! Path utilities.

use std::path::{Component, Path, PathBuf};

/// Get the tandem configuration directory (`~/.config/tandem` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tandem"))
}

/// Get the tandem data directory (`~/.local/share/tandem` on Linux).
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("tandem"))
}

/// Default root for persisted sessions.
pub fn sessions_dir() -> Option<PathBuf> {
    data_dir().map(|p| p.join("sessions"))
}

/// Where older releases kept sessions (`~/.tandem/sessions`). Records found
/// here are migrated into [`sessions_dir`] on first load.
pub fn legacy_sessions_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".tandem").join("sessions"))
}

/// Normalize a path by removing `.` and `..` components.
///
/// Unlike `canonicalize`, this doesn't require the path to exist and never
/// follows symlinks. A `..` that would climb above the root is dropped.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            _ => result.push(component),
        }
    }

    result
}

/// Whether the path text contains a `..` segment.
pub fn has_parent_segment(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}
