//! Operation id to display name mapping
//!
//! The catalog belongs to whoever defines the wrapped API. The trace context
//! only asks it for the size of the id space and for names (diagnostics and
//! observer arguments).

use std::collections::HashSet;
use std::fmt;

use anyhow::{bail, Result};

/// Index of one operation of the wrapped API
///
/// Stable for the life of the process; compared only for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(pub u32);

impl OperationId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for OperationId {
    fn from(id: u32) -> Self {
        OperationId(id)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Read-only id to name mapping
///
/// `name_of` must be total over `0..len()`.
pub trait OperationCatalog {
    /// Size of the id space
    fn len(&self) -> usize;

    /// Display name of a valid id
    fn name_of(&self, id: OperationId) -> &str;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, id: OperationId) -> bool {
        id.index() < self.len()
    }

    /// Reverse lookup, linear in the catalog size
    fn lookup(&self, name: &str) -> Option<OperationId> {
        (0..self.len() as u32)
            .map(OperationId)
            .find(|&id| self.name_of(id) == name)
    }
}

/// Catalog over a compile-time name table, the usual shape for generated
/// wrappers
#[derive(Debug, Clone, Copy)]
pub struct StaticCatalog {
    names: &'static [&'static str],
}

impl StaticCatalog {
    pub const fn new(names: &'static [&'static str]) -> Self {
        StaticCatalog { names }
    }
}

impl OperationCatalog for StaticCatalog {
    fn len(&self) -> usize {
        self.names.len()
    }

    fn name_of(&self, id: OperationId) -> &str {
        self.names[id.index()]
    }
}

/// Catalog built at runtime from a list of names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedCatalog {
    names: Vec<String>,
}

impl NamedCatalog {
    /// Build from names; ids are assigned in order
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            bail!("Operation catalog must contain at least one operation");
        }
        if names.len() > u32::MAX as usize {
            bail!("Operation catalog too large: {} entries", names.len());
        }

        let mut seen = HashSet::new();
        for name in &names {
            if name.is_empty() {
                bail!("Operation names must not be empty");
            }
            if !seen.insert(name.as_str()) {
                bail!("Duplicate operation name: {}", name);
            }
        }
        Ok(NamedCatalog { names })
    }

    /// Parse a comma-separated list like "alloc,free,call"
    pub fn from_list(list: &str) -> Result<Self> {
        Self::new(list.split(',').map(str::trim))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl OperationCatalog for NamedCatalog {
    fn len(&self) -> usize {
        self.names.len()
    }

    fn name_of(&self, id: OperationId) -> &str {
        &self.names[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static NAMES: &[&str] = &["alloc", "free", "call"];

    #[test]
    fn test_static_catalog_names() {
        let catalog = StaticCatalog::new(NAMES);
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.name_of(OperationId(0)), "alloc");
        assert_eq!(catalog.name_of(OperationId(2)), "call");
    }

    #[test]
    fn test_contains() {
        let catalog = StaticCatalog::new(NAMES);
        assert!(catalog.contains(OperationId(2)));
        assert!(!catalog.contains(OperationId(3)));
    }

    #[test]
    fn test_lookup() {
        let catalog = StaticCatalog::new(NAMES);
        assert_eq!(catalog.lookup("free"), Some(OperationId(1)));
        assert_eq!(catalog.lookup("missing"), None);
    }

    #[test]
    fn test_named_catalog_from_list() {
        let catalog = NamedCatalog::from_list("alloc, free ,call").unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.name_of(OperationId(1)), "free");
    }

    #[test]
    fn test_named_catalog_rejects_duplicates() {
        let err = NamedCatalog::from_list("alloc,alloc").unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_named_catalog_rejects_empty_name() {
        assert!(NamedCatalog::from_list("alloc,,call").is_err());
    }

    #[test]
    fn test_named_catalog_rejects_empty() {
        assert!(NamedCatalog::new(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_operation_id_display() {
        assert_eq!(OperationId(42).to_string(), "#42");
    }
}
