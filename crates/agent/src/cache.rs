// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Last adopted configuration, persisted so a restart does not regress to
//! "no configuration". Load/save to a JSON file with atomic writes.

use std::path::Path;

use crate::model::ConfigResponse;

/// Load the cache record. `Ok(None)` when the file does not exist.
pub fn load(path: &Path) -> anyhow::Result<Option<ConfigResponse>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let record: ConfigResponse = serde_json::from_str(&contents)?;
    Ok(Some(record))
}

/// Save the cache record atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) so two saves never share a
/// `.tmp` file.
pub fn save(path: &Path, record: &ConfigResponse) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let json = serde_json::to_vec(record)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
