//! Interned-identifier service contract: bidirectional string ↔ fixed-width
//! byte-id mapping for metric names, tag names, and tag values.
//!
//! The query core only consumes this service. [`MemUidTable`] is the
//! in-memory reference implementation used by tests and embedders.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::QueryError;
use crate::row_key::KeyLayout;

/// One interned id namespace (metrics, tag names, or tag values).
///
/// Id widths are constant for the lifetime of the process.
pub trait UidTable: std::fmt::Debug + Send + Sync {
    /// Resolves a name to its id. Missing names fail with
    /// [`QueryError::NoSuchName`].
    fn id(&self, name: &str) -> Result<Vec<u8>, QueryError>;

    /// Resolves an id back to its name. Missing ids fail with
    /// [`QueryError::NoSuchId`].
    fn name(&self, id: &[u8]) -> Result<String, QueryError>;

    /// Number of bytes every id in this namespace occupies.
    fn width(&self) -> usize;
}

/// The three id namespaces a row-key schema is built from.
#[derive(Debug, Clone)]
pub struct Uids {
    pub metrics: Arc<dyn UidTable>,
    pub tag_names: Arc<dyn UidTable>,
    pub tag_values: Arc<dyn UidTable>,
}

impl Uids {
    pub fn layout(&self) -> KeyLayout {
        KeyLayout {
            metric: self.metrics.width(),
            name: self.tag_names.width(),
            value: self.tag_values.width(),
        }
    }
}

/// Resolves an id to its name, rendering missing ids as a `<…>` placeholder
/// instead of failing. Only for diagnostics; lookups on the query path
/// surface [`QueryError::NoSuchId`].
pub fn name_or_placeholder(table: &dyn UidTable, id: &[u8]) -> String {
    table.name(id).unwrap_or_else(|_| {
        let mut s = String::with_capacity(2 * id.len() + 4);
        s.push_str("<0x");
        for b in id {
            s.push_str(&format!("{b:02x}"));
        }
        s.push('>');
        s
    })
}

#[derive(Debug, Default)]
struct MemUidInner {
    by_name: HashMap<String, Vec<u8>>,
    by_id: HashMap<Vec<u8>, String>,
    next: u64,
}

/// In-memory [`UidTable`]: ids are assigned in insertion order, big-endian,
/// starting at 1.
#[derive(Debug)]
pub struct MemUidTable {
    kind: &'static str,
    width: usize,
    inner: RwLock<MemUidInner>,
}

impl MemUidTable {
    pub fn new(kind: &'static str, width: usize) -> Self {
        assert!(width > 0 && width <= 8, "id width must be in 1..=8");
        Self {
            kind,
            width,
            inner: RwLock::new(MemUidInner::default()),
        }
    }

    /// Returns the id for `name`, assigning the next free one if unseen.
    pub fn assign(&self, name: &str) -> Vec<u8> {
        let mut inner = self.inner.write().expect("uid table lock");
        if let Some(id) = inner.by_name.get(name) {
            return id.clone();
        }
        inner.next += 1;
        let id = self.encode(inner.next);
        inner.by_name.insert(name.to_string(), id.clone());
        inner.by_id.insert(id.clone(), name.to_string());
        id
    }

    /// Registers `name` under an explicit id. Test fixtures use this to pin
    /// exact key bytes.
    ///
    /// # Panics
    /// Panics if the id width is wrong or either side is already mapped
    /// differently.
    pub fn insert(&self, name: &str, id: &[u8]) {
        assert_eq!(id.len(), self.width, "id width mismatch for {:?}", name);
        let mut inner = self.inner.write().expect("uid table lock");
        let prev_id = inner.by_name.insert(name.to_string(), id.to_vec());
        assert!(
            prev_id.is_none() || prev_id.as_deref() == Some(id),
            "{:?} already mapped to a different id",
            name
        );
        let prev_name = inner.by_id.insert(id.to_vec(), name.to_string());
        assert!(
            prev_name.is_none() || prev_name.as_deref() == Some(name),
            "id {:?} already mapped to a different name",
            id
        );
    }

    fn encode(&self, n: u64) -> Vec<u8> {
        let be = n.to_be_bytes();
        assert!(
            be[..8 - self.width].iter().all(|&b| b == 0),
            "uid space exhausted for width {}",
            self.width
        );
        be[8 - self.width..].to_vec()
    }
}

impl UidTable for MemUidTable {
    fn id(&self, name: &str) -> Result<Vec<u8>, QueryError> {
        let inner = self.inner.read().expect("uid table lock");
        inner
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| QueryError::NoSuchName {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    fn name(&self, id: &[u8]) -> Result<String, QueryError> {
        let inner = self.inner.read().expect("uid table lock");
        inner
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| QueryError::NoSuchId {
                kind: self.kind,
                id: id.to_vec(),
            })
    }

    fn width(&self) -> usize {
        self.width
    }
}

/// Builds a [`Uids`] bundle of in-memory tables, all sharing one width.
pub fn mem_uids(width: usize) -> Uids {
    Uids {
        metrics: Arc::new(MemUidTable::new("metric", width)),
        tag_names: Arc::new(MemUidTable::new("tag name", width)),
        tag_values: Arc::new(MemUidTable::new("tag value", width)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_is_idempotent_and_dense() {
        let t = MemUidTable::new("metric", 3);
        let a = t.assign("sys.cpu.user");
        let b = t.assign("sys.cpu.sys");
        assert_eq!(a, vec![0, 0, 1]);
        assert_eq!(b, vec![0, 0, 2]);
        assert_eq!(t.assign("sys.cpu.user"), a);
        assert_eq!(t.id("sys.cpu.user").unwrap(), a);
        assert_eq!(t.name(&b).unwrap(), "sys.cpu.sys");
    }

    #[test]
    fn missing_lookups_fail() {
        let t = MemUidTable::new("tag name", 3);
        assert!(matches!(
            t.id("host"),
            Err(QueryError::NoSuchName { kind: "tag name", .. })
        ));
        assert!(matches!(t.name(&[0, 0, 9]), Err(QueryError::NoSuchId { .. })));
    }

    #[test]
    fn placeholder_rendering() {
        let t = MemUidTable::new("tag value", 3);
        t.insert("web01", &[0, 0, 5]);
        assert_eq!(name_or_placeholder(&t, &[0, 0, 5]), "web01");
        assert_eq!(name_or_placeholder(&t, &[0, 0, 6]), "<0x000006>");
    }
}
