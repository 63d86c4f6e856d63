pub mod validator;

use std::path::{Path, PathBuf};
use which::which;

/// Resolves the scanner executable.
/// Search order: the configured value as a path → `./tools/<name>` → System PATH
pub fn resolve_scanner_path(configured: &str) -> Option<PathBuf> {
    let direct = Path::new(configured);
    if direct.components().count() > 1 && direct.is_file() {
        return Some(direct.to_path_buf());
    }

    let tools_path = PathBuf::from("./tools").join(configured);
    if tools_path.is_file() {
        return Some(tools_path);
    }

    which(configured).ok()
}
