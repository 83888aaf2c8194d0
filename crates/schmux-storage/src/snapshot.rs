// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic whole-document persistence: write to a sibling `.tmp` path,
//! `fsync`, then `rename` over the final path. A forcibly truncated `.tmp`
//! file never clobbers a previously-saved document.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use schmux_core::Error;

use crate::document::Document;

pub fn save(path: &Path, document: &Document) -> Result<(), Error> {
    if path.as_os_str().is_empty() {
        return Err(Error::invalid("state file path is empty"));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(&file);
        serde_json::to_writer_pretty(&mut writer, document)
            .map_err(|e| Error::invalid(format!("serializing state document: {e}")))?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Loads the document from `path`. A missing file is treated as an empty
/// document, matching the cross-restart "absent file" rule.
pub fn load(path: &Path) -> Result<Document, Error> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| Error::invalid(format!("corrupt state file {}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::default()),
        Err(e) => Err(Error::Io(e)),
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
