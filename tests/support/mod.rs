//! Shared helpers for integration tests.
#![allow(dead_code)]

pub mod socket_guard;

use std::path::{Path, PathBuf};

use regscrape_core::{Database, Store, View};
use tempfile::TempDir;

/// File-backed store in a fresh temp dir, with a small page size so paging is
/// exercised.
pub async fn setup_store() -> Result<(Store, TempDir), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let db = Database::new(&temp_dir.path().join("regs.db")).await?;
    Ok((Store::new(db).with_page_size(2), temp_dir))
}

/// A view that has been downloaded to `file`.
pub fn downloaded_view(url: &str, file_type: &str, file: &Path) -> View {
    let mut view = View::new(url, file_type);
    view.mark_downloaded(file.to_path_buf());
    view
}

/// Writes an executable shell script and returns its path.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> std::io::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}
