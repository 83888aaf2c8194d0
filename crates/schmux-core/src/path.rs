// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relative-path validation (data model invariant v).

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A relative path that has passed [`validate_rel_path`]. Safe to join onto
/// a workspace root or overlay root without escaping it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelPath(String);

impl RelPath {
    pub fn parse(value: impl Into<String>) -> Result<Self, Error> {
        let value = value.into();
        validate_rel_path(&value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RelPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for RelPath {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

/// Rejects `""`, `"."`, absolute paths, and any path with a `..` component
/// anywhere in it; accepts every purely descending relative path.
pub fn validate_rel_path(rel: &str) -> Result<(), Error> {
    if rel.is_empty() {
        return Err(Error::invalid("relative path is empty"));
    }
    if rel == "." {
        return Err(Error::invalid("relative path is \".\""));
    }
    let path = Path::new(rel);
    if path.is_absolute() {
        return Err(Error::invalid(format!("relative path is absolute: {rel}")));
    }
    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(Error::invalid(format!(
                    "relative path escapes its root: {rel}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(Error::invalid(format!("relative path is absolute: {rel}")));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "path_tests.rs"]
mod tests;
