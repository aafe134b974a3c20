//! Language maps and the map store.
//!
//! A language map translates input symbols to keyboard report sequences
//! for one keyboard layout: a symbol is either a single character (for
//! typing) or a canonical combo token string. Every symbol maps to a
//! non-empty sequence; the trailing release is implicit because the
//! controller always writes the neutral report after a mapped sequence.
//!
//! Maps are persisted as JSON documents, one per map. The [`MapStore`]
//! tracks loaded maps in load order and holds the single active
//! selection; if no map is explicitly activated, the first successfully
//! loaded map wins. Callers rely on that default, so it must hold even
//! when later loads fail.

pub mod builtin;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::report::KeyboardOutReport;

/// Error type for map documents and store operations.
#[derive(Debug, Error)]
pub enum MapError {
    /// No loaded map carries the requested name.
    #[error("language map '{0}' not found")]
    NotFound(String),

    /// An operation needed the active map, but none is set (no map has
    /// been loaded yet).
    #[error("no active language map")]
    NoActiveMap,

    /// A file system error while reading or writing a map document.
    #[error("I/O error on map document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A map document exists but does not parse as a language map.
    #[error("failed to parse map document {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A named mapping from input symbols to keyboard report sequences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageMap {
    /// Unique name within a store (e.g. `"US"`, `"DE"`).
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Symbol → ordered report sequence.
    pub mapping: HashMap<String, Vec<KeyboardOutReport>>,
}

impl LanguageMap {
    /// Looks up the report sequence for one symbol.
    pub fn reports_for(&self, symbol: &str) -> Option<&[KeyboardOutReport]> {
        self.mapping.get(symbol).map(Vec::as_slice)
    }

    /// Serializes this map to a JSON document at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Io`] on write failure.
    pub fn store_to_file(&self, path: impl AsRef<Path>) -> Result<(), MapError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).map_err(|source| MapError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, content).map_err(|source| MapError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Deserializes a map from a JSON document at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Io`] on read failure and [`MapError::Parse`]
    /// on malformed content.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, MapError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| MapError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| MapError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Outcome of loading a directory of map documents.
///
/// A document that fails to load is reported here and skipped; it never
/// aborts the other loads.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Names of the maps loaded, in load order.
    pub loaded: Vec<String>,
    /// Per-document failures: the offending path and the error.
    pub failures: Vec<(PathBuf, MapError)>,
}

/// Registry of loaded language maps plus the single active selection.
#[derive(Debug, Default)]
pub struct MapStore {
    // Load order is meaningful: names() lists in this order and the
    // first insert becomes the default active map.
    maps: Vec<LanguageMap>,
    active: Option<usize>,
}

impl MapStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a map, replacing any previously loaded map of the same
    /// name in place. The first inserted map becomes active by default.
    pub fn insert(&mut self, map: LanguageMap) {
        if let Some(pos) = self.maps.iter().position(|m| m.name == map.name) {
            self.maps[pos] = map;
        } else {
            self.maps.push(map);
            if self.active.is_none() {
                self.active = Some(0);
            }
        }
    }

    /// Loads every `.json` document in `dir`, skipping documents that
    /// fail to read or parse. Documents are loaded in file-name order so
    /// the default activation is deterministic.
    pub fn load_directory(&mut self, dir: impl AsRef<Path>) -> Result<LoadReport, MapError> {
        let dir = dir.as_ref();
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|source| MapError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        entries.sort();

        let mut report = LoadReport::default();
        for path in entries {
            match LanguageMap::load_from_file(&path) {
                Ok(map) => {
                    debug!(name = %map.name, path = %path.display(), "loaded language map");
                    report.loaded.push(map.name.clone());
                    self.insert(map);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable map document");
                    report.failures.push((path, err));
                }
            }
        }
        Ok(report)
    }

    /// Names of all loaded maps, in load order.
    pub fn names(&self) -> Vec<String> {
        self.maps.iter().map(|m| m.name.clone()).collect()
    }

    /// Atomically swaps the active map reference.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::NotFound`] if no map with that name is
    /// loaded; the previous active map stays in effect.
    pub fn set_active(&mut self, name: &str) -> Result<(), MapError> {
        match self.maps.iter().position(|m| m.name == name) {
            Some(pos) => {
                self.active = Some(pos);
                Ok(())
            }
            None => Err(MapError::NotFound(name.to_string())),
        }
    }

    /// The currently active map.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::NoActiveMap`] when nothing has been loaded.
    pub fn active(&self) -> Result<&LanguageMap, MapError> {
        self.active
            .and_then(|i| self.maps.get(i))
            .ok_or(MapError::NoActiveMap)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
