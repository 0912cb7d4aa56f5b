//! Name table for variables, file segments and field segments.
//!
//! All three kinds share one namespace: a name keeps the kind it was
//! first declared with.

use std::fs::File;
use std::path::Path;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::ErrorKind;
use crate::scanner::Delimiter;

/// What a declared name refers to. The payload indexes the matching
/// table in [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Variable(usize),
    File(usize),
    Field(usize),
}

impl Binding {
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Variable(_) => "variable",
            Self::File(_) => "file segment",
            Self::Field(_) => "field segment",
        }
    }
}

/// An open file split into records by `delimiter`.
#[derive(Debug)]
pub struct FileSegment {
    pub name: Vec<u8>,
    pub delimiter: Delimiter,
    pub source: File,
}

/// A delimiter applied to the enclosing loop's buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSegment {
    pub name: Vec<u8>,
    pub delimiter: Delimiter,
}

#[derive(Debug, Default)]
pub struct Registry {
    names: FxHashMap<Vec<u8>, Binding>,
    values: Vec<Vec<u8>>,
    files: Vec<FileSegment>,
    fields: Vec<FieldSegment>,
}

fn lossy(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lookup(&self, name: &[u8]) -> Option<Binding> {
        self.names.get(name).copied()
    }

    /// Look up a name that must exist.
    pub fn resolve(&self, name: &[u8]) -> Result<Binding, ErrorKind> {
        self.lookup(name)
            .ok_or_else(|| ErrorKind::UndeclaredName(lossy(name)))
    }

    fn collision(name: &[u8], existing: Binding) -> ErrorKind {
        ErrorKind::NameCollision {
            name: lossy(name),
            existing: existing.describe(),
        }
    }

    /// Declare a variable, or reset an existing one to `value`.
    pub fn declare_variable(&mut self, name: &[u8], value: Vec<u8>) -> Result<usize, ErrorKind> {
        match self.lookup(name) {
            Some(Binding::Variable(slot)) => {
                self.values[slot] = value;
                Ok(slot)
            }
            Some(other) => Err(Self::collision(name, other)),
            None => {
                let slot = self.values.len();
                self.values.push(value);
                self.names.insert(name.to_vec(), Binding::Variable(slot));
                debug!(name = %String::from_utf8_lossy(name), "variable declared");
                Ok(slot)
            }
        }
    }

    /// Declare a file segment. Re-declaring one replaces it in place,
    /// closing the previous handle.
    pub fn declare_file(
        &mut self,
        name: &[u8],
        path: &Path,
        delimiter: Delimiter,
    ) -> Result<usize, ErrorKind> {
        let existing = match self.lookup(name) {
            Some(Binding::File(slot)) => Some(slot),
            Some(other) => return Err(Self::collision(name, other)),
            None => None,
        };

        let source = File::open(path).map_err(|e| ErrorKind::FileOpen {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!(
            name = %String::from_utf8_lossy(name),
            path = %path.display(),
            %delimiter,
            "file segment declared"
        );

        let segment = FileSegment {
            name: name.to_vec(),
            delimiter,
            source,
        };

        if let Some(slot) = existing {
            self.files[slot] = segment;
            Ok(slot)
        } else {
            let slot = self.files.len();
            self.files.push(segment);
            self.names.insert(name.to_vec(), Binding::File(slot));
            Ok(slot)
        }
    }

    /// Declare or redefine a field segment.
    pub fn declare_field(&mut self, name: &[u8], delimiter: Delimiter) -> Result<usize, ErrorKind> {
        debug!(name = %String::from_utf8_lossy(name), %delimiter, "field segment declared");
        match self.lookup(name) {
            Some(Binding::Field(slot)) => {
                self.fields[slot].delimiter = delimiter;
                Ok(slot)
            }
            Some(other) => Err(Self::collision(name, other)),
            None => {
                let slot = self.fields.len();
                self.fields.push(FieldSegment {
                    name: name.to_vec(),
                    delimiter,
                });
                self.names.insert(name.to_vec(), Binding::Field(slot));
                Ok(slot)
            }
        }
    }

    #[must_use]
    pub fn value(&self, slot: usize) -> &[u8] {
        self.values.get(slot).map_or(&[], Vec::as_slice)
    }

    pub fn set_value(&mut self, slot: usize, value: Vec<u8>) {
        if let Some(stored) = self.values.get_mut(slot) {
            *stored = value;
        }
    }

    /// Value of a variable looked up by name.
    pub fn variable(&self, name: &[u8]) -> Result<&[u8], ErrorKind> {
        match self.resolve(name)? {
            Binding::Variable(slot) => Ok(self.value(slot)),
            other => Err(ErrorKind::UnexpectedToken {
                expected: "a variable",
                found: format!("{} {}", other.describe(), lossy(name)),
            }),
        }
    }

    #[must_use]
    pub fn file(&self, slot: usize) -> &FileSegment {
        &self.files[slot]
    }

    pub fn file_mut(&mut self, slot: usize) -> &mut FileSegment {
        &mut self.files[slot]
    }

    #[must_use]
    pub fn field(&self, slot: usize) -> &FieldSegment {
        &self.fields[slot]
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn variable_redeclare_resets_value() {
        let mut registry = Registry::new();
        let slot = registry.declare_variable(b"x", b"1".to_vec()).expect("declare");
        let again = registry.declare_variable(b"x", Vec::new()).expect("redeclare");
        assert_eq!(slot, again);
        assert_eq!(registry.value(slot), b"");
    }

    #[test]
    fn kind_collision() {
        let mut registry = Registry::new();
        registry.declare_variable(b"cols", Vec::new()).expect("declare");
        let err = registry
            .declare_field(b"cols", Delimiter::Whitespace)
            .unwrap_err();
        assert_eq!(
            err,
            ErrorKind::NameCollision {
                name: "cols".to_string(),
                existing: "variable",
            }
        );
    }

    #[test]
    fn field_redefinition_keeps_slot() {
        let mut registry = Registry::new();
        let slot = registry.declare_field(b"f", Delimiter::Whitespace).expect("declare");
        let again = registry
            .declare_field(b"f", Delimiter::from_bytes(b","))
            .expect("redefine");
        assert_eq!(slot, again);
        assert_eq!(registry.field(slot).delimiter, Delimiter::from_bytes(b","));
    }

    #[test]
    fn file_reopen_keeps_slot() {
        let mut tmp = tempfile::NamedTempFile::new().expect("tempfile");
        tmp.write_all(b"a\n").expect("write");
        let mut registry = Registry::new();
        let slot = registry
            .declare_file(b"data", tmp.path(), Delimiter::newline())
            .expect("declare");
        let again = registry
            .declare_file(b"data", tmp.path(), Delimiter::EachByte)
            .expect("reopen");
        assert_eq!(slot, again);
        assert_eq!(registry.file(slot).delimiter, Delimiter::EachByte);
        assert_eq!(registry.lookup(b"data"), Some(Binding::File(slot)));
    }

    #[test]
    fn missing_file() {
        let mut registry = Registry::new();
        let err = registry
            .declare_file(b"data", Path::new("/definitely/not/here"), Delimiter::newline())
            .unwrap_err();
        assert!(matches!(err, ErrorKind::FileOpen { .. }));
        assert_eq!(registry.lookup(b"data"), None);
    }

    #[test]
    fn undeclared() {
        let registry = Registry::new();
        assert_eq!(
            registry.resolve(b"nope").unwrap_err(),
            ErrorKind::UndeclaredName("nope".to_string())
        );
    }
}
