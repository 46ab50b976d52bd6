//! Interned label tables.
//!
//! Node labels and edge labels each live in their own table of at most
//! [`MAX_LABELS`] distinct strings. The integer label id is the
//! position in the table; tables persist as text, one label per line.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use quiver_core::{LabelId, MAX_LABELS};
use thiserror::Error;

/// Errors raised by label interning and table persistence.
#[derive(Debug, Error)]
pub enum LabelError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("label table overflow: more than {MAX_LABELS} distinct labels (while interning {label:?})")]
    Overflow { label: String },
}

/// An insertion-ordered string interner capped at [`MAX_LABELS`] entries.
#[derive(Debug, Default)]
pub struct LabelTable {
    names: Vec<String>,
    index: HashMap<String, LabelId>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `name`, assigning the next free id on first
    /// sight. Exceeding [`MAX_LABELS`] distinct labels is fatal.
    pub fn intern(&mut self, name: &str) -> Result<LabelId, LabelError> {
        if let Some(&id) = self.index.get(name) {
            return Ok(id);
        }
        if self.names.len() >= MAX_LABELS {
            return Err(LabelError::Overflow {
                label: name.to_string(),
            });
        }
        let id = LabelId(self.names.len() as u8);
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        Ok(id)
    }

    /// Looks up an already-interned label.
    pub fn get(&self, name: &str) -> Option<LabelId> {
        self.index.get(name).copied()
    }

    /// The label string for an id.
    pub fn name(&self, id: LabelId) -> Option<&str> {
        self.names.get(id.as_usize()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterates over labels in id order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Writes the table as text, one label per line, in id order.
    pub fn write(&self, path: &Path) -> Result<(), LabelError> {
        let mut out = String::new();
        for name in &self.names {
            out.push_str(name);
            out.push('\n');
        }
        fs::write(path, out)?;
        Ok(())
    }

    /// Loads a table previously written by [`LabelTable::write`].
    pub fn load(path: &Path) -> Result<Self, LabelError> {
        let text = fs::read_to_string(path)?;
        let mut table = Self::new();
        for line in text.lines() {
            table.intern(line)?;
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_intern_assigns_in_order() {
        let mut table = LabelTable::new();
        assert_eq!(table.intern("Person").unwrap(), LabelId(0));
        assert_eq!(table.intern("Company").unwrap(), LabelId(1));
        assert_eq!(table.intern("Person").unwrap(), LabelId(0));
        assert_eq!(table.len(), 2);
        assert_eq!(table.name(LabelId(1)), Some("Company"));
        assert_eq!(table.get("Company"), Some(LabelId(1)));
        assert_eq!(table.get("Robot"), None);
    }

    #[test]
    fn test_overflow_is_fatal() {
        let mut table = LabelTable::new();
        for i in 0..MAX_LABELS {
            table.intern(&format!("label-{i}")).unwrap();
        }
        assert!(matches!(
            table.intern("one-too-many"),
            Err(LabelError::Overflow { .. })
        ));
        // Existing labels still resolve after a failed intern.
        assert_eq!(table.intern("label-0").unwrap(), LabelId(0));
    }

    #[test]
    fn test_write_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.txt");

        let mut table = LabelTable::new();
        table.intern("KNOWS").unwrap();
        table.intern("WORKS_AT").unwrap();
        table.write(&path).unwrap();

        let loaded = LabelTable::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get("KNOWS"), Some(LabelId(0)));
        assert_eq!(loaded.get("WORKS_AT"), Some(LabelId(1)));
    }

    #[test]
    fn test_load_empty_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        fs::write(&path, "").unwrap();

        let loaded = LabelTable::load(&path).unwrap();
        assert!(loaded.is_empty());
    }
}
