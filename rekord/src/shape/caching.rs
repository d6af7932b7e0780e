use std::{collections::HashMap, hash::Hash};

use parking_lot::RwLock;

use super::{AttributeKind, ShapeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct CachingMapId(u32);

impl CachingMapId {
    pub const EMPTY: Self = Self(0);

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

struct CachingNode<K, V> {
    indexes: HashMap<K, usize, ahash::RandomState>,
    statics: HashMap<K, V, ahash::RandomState>,
    dynamic_keys: Vec<K>,
    static_keys: Vec<K>,
}

impl<K, V> CachingNode<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    fn kind_of(&self, name: &K) -> Option<AttributeKind> {
        if self.indexes.contains_key(name) {
            Some(AttributeKind::Dynamic)
        } else if self.statics.contains_key(name) {
            Some(AttributeKind::Static)
        } else {
            None
        }
    }

    fn has_key(&self, name: &K) -> bool {
        self.kind_of(name).is_some()
    }

    fn len(&self) -> usize {
        self.indexes.len() + self.statics.len()
    }

    fn duplicate(&self) -> Self {
        Self {
            indexes: self.indexes.clone(),
            statics: self.statics.clone(),
            dynamic_keys: self.dynamic_keys.clone(),
            static_keys: self.static_keys.clone(),
        }
    }
}

struct CachingMapTableImpl<K, V> {
    nodes: Vec<CachingNode<K, V>>,
    dynamic_transitions: HashMap<(CachingMapId, K), CachingMapId, ahash::RandomState>,
    static_transitions: HashMap<(CachingMapId, K, V), CachingMapId, ahash::RandomState>,
}

impl<K, V> CachingMapTableImpl<K, V>
where
    K: Clone + Eq + Hash + ToString,
    V: Clone + Eq + Hash,
{
    fn node(&self, map: CachingMapId) -> Result<&CachingNode<K, V>, ShapeError> {
        self.nodes
            .get(map.index())
            .ok_or(ShapeError::UnknownShape(map.0))
    }

    fn check_fresh(&self, map: CachingMapId, name: &K) -> Result<(), ShapeError> {
        match self.node(map)?.kind_of(name) {
            Some(existing) => Err(ShapeError::KindConflict {
                name: name.to_string(),
                existing,
            }),
            None => Ok(()),
        }
    }

    fn push(&mut self, node: CachingNode<K, V>) -> CachingMapId {
        let id = CachingMapId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }
}

/// Shapes that split attributes into static ones, whose value is stored on
/// the node and shared by every object using it, and dynamic ones, stored
/// per object. A name is one kind or the other, never both.
pub struct CachingMapTable<K, V>(RwLock<CachingMapTableImpl<K, V>>);

impl<K, V> CachingMapTable<K, V>
where
    K: Clone + Eq + Hash + ToString,
    V: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        let root = CachingNode {
            indexes: HashMap::default(),
            statics: HashMap::default(),
            dynamic_keys: Vec::new(),
            static_keys: Vec::new(),
        };
        Self(RwLock::new(CachingMapTableImpl {
            nodes: vec![root],
            dynamic_transitions: HashMap::default(),
            static_transitions: HashMap::default(),
        }))
    }

    /// Adds `name` with a value shared through the shape itself. Memoized
    /// on `(map, name, value)`.
    pub fn extend_static(
        &self,
        map: CachingMapId,
        name: K,
        value: V,
    ) -> Result<CachingMapId, ShapeError> {
        let key = (map, name, value);
        if let Some(&child) = self.0.read().static_transitions.get(&key) {
            return Ok(child);
        }

        let mut inner = self.0.write();
        if let Some(&child) = inner.static_transitions.get(&key) {
            return Ok(child);
        }
        let (map, name, value) = key;
        inner.check_fresh(map, &name)?;
        let mut node = inner.node(map)?.duplicate();
        node.statics.insert(name.clone(), value.clone());
        node.static_keys.push(name.clone());
        let child = inner.push(node);
        inner.static_transitions.insert((map, name, value), child);
        log::trace!("caching map node {} extends {} statically", child.0, map.0);
        Ok(child)
    }

    /// Adds `name` as the next per-object slot. Memoized on `(map, name)`.
    pub fn extend_dynamic(&self, map: CachingMapId, name: K) -> Result<CachingMapId, ShapeError> {
        let key = (map, name);
        if let Some(&child) = self.0.read().dynamic_transitions.get(&key) {
            return Ok(child);
        }

        let mut inner = self.0.write();
        if let Some(&child) = inner.dynamic_transitions.get(&key) {
            return Ok(child);
        }
        let (map, name) = key;
        inner.check_fresh(map, &name)?;
        let mut node = inner.node(map)?.duplicate();
        node.indexes.insert(name.clone(), node.dynamic_keys.len());
        node.dynamic_keys.push(name.clone());
        let child = inner.push(node);
        inner.dynamic_transitions.insert((map, name), child);
        log::trace!("caching map node {} extends {} dynamically", child.0, map.0);
        Ok(child)
    }

    pub fn get_dynamic_index(&self, map: CachingMapId, name: &K) -> Option<usize> {
        self.0.read().node(map).ok()?.indexes.get(name).copied()
    }

    pub fn get_static(&self, map: CachingMapId, name: &K) -> Option<V> {
        self.0.read().node(map).ok()?.statics.get(name).cloned()
    }

    /// A dynamic attribute is read from `storage`, a static one from the
    /// shape. Anything else yields `default`.
    pub fn lookup(&self, map: CachingMapId, name: &K, storage: &[V], default: V) -> V {
        let inner = self.0.read();
        let Ok(node) = inner.node(map) else {
            return default;
        };
        if let Some(&index) = node.indexes.get(name) {
            return storage.get(index).cloned().unwrap_or(default);
        }
        node.statics.get(name).cloned().unwrap_or(default)
    }

    pub fn has_key(&self, map: CachingMapId, name: &K) -> bool {
        self.0.read().node(map).is_ok_and(|node| node.has_key(name))
    }

    /// True for the shape with no attributes at all.
    pub fn is_leaf(&self, map: CachingMapId) -> bool {
        self.0.read().node(map).is_ok_and(|node| node.len() == 0)
    }

    /// Whether both shapes carry the same attribute names. Static values
    /// and addition order do not matter.
    pub fn has_same_shape(&self, a: CachingMapId, b: CachingMapId) -> bool {
        if a == b {
            return true;
        }
        let inner = self.0.read();
        let (Ok(a), Ok(b)) = (inner.node(a), inner.node(b)) else {
            return false;
        };
        a.len() == b.len()
            && a.dynamic_keys.iter().all(|key| b.has_key(key))
            && a.static_keys.iter().all(|key| b.has_key(key))
    }

    /// Per-object slot count.
    pub fn storage_size(&self, map: CachingMapId) -> Option<usize> {
        Some(self.0.read().node(map).ok()?.dynamic_keys.len())
    }

    /// Dynamic keys in slot order, then static keys in addition order.
    pub fn keys(&self, map: CachingMapId) -> Option<Vec<K>> {
        let inner = self.0.read();
        let node = inner.node(map).ok()?;
        Some(
            node.dynamic_keys
                .iter()
                .chain(&node.static_keys)
                .cloned()
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.read().nodes.len()
    }
}

impl<K, V> Default for CachingMapTable<K, V>
where
    K: Clone + Eq + Hash + ToString,
    V: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Table = CachingMapTable<&'static str, i64>;

    #[test]
    fn static_extension_is_memoized_on_value() {
        let table = Table::new();
        let a1 = table.extend_static(CachingMapId::EMPTY, "a", 1).unwrap();
        let again = table.extend_static(CachingMapId::EMPTY, "a", 1).unwrap();
        let a2 = table.extend_static(CachingMapId::EMPTY, "a", 2).unwrap();
        assert_eq!(a1, again);
        assert_ne!(a1, a2);
        assert_eq!(table.get_static(a1, &"a"), Some(1));
        assert_eq!(table.get_static(a2, &"a"), Some(2));
        assert_eq!(table.storage_size(a1), Some(0));
    }

    #[test]
    fn lookup_prefers_storage_for_dynamic_names() {
        let table = Table::new();
        let m = table.extend_dynamic(CachingMapId::EMPTY, "x").unwrap();
        let m = table.extend_static(m, "tag", 7).unwrap();
        let m = table.extend_dynamic(m, "y").unwrap();
        let storage = [100, 200];
        assert_eq!(table.lookup(m, &"x", &storage, 0), 100);
        assert_eq!(table.lookup(m, &"y", &storage, 0), 200);
        assert_eq!(table.lookup(m, &"tag", &storage, 0), 7);
        assert_eq!(table.lookup(m, &"z", &storage, 0), 0);
        assert_eq!(table.keys(m), Some(vec!["x", "y", "tag"]));
    }

    #[test]
    fn a_name_has_one_kind() {
        let table = Table::new();
        let m = table.extend_dynamic(CachingMapId::EMPTY, "x").unwrap();
        assert_eq!(
            table.extend_static(m, "x", 1),
            Err(ShapeError::KindConflict {
                name: "x".into(),
                existing: AttributeKind::Dynamic,
            })
        );
        let s = table.extend_static(CachingMapId::EMPTY, "s", 1).unwrap();
        assert!(matches!(
            table.extend_dynamic(s, "s"),
            Err(ShapeError::KindConflict { existing: AttributeKind::Static, .. })
        ));
    }

    #[test]
    fn same_shape_ignores_order_and_static_values() {
        let table = Table::new();
        let ab = table.extend_dynamic(CachingMapId::EMPTY, "a").unwrap();
        let ab = table.extend_static(ab, "b", 1).unwrap();
        let ba = table.extend_static(CachingMapId::EMPTY, "b", 2).unwrap();
        let ba = table.extend_dynamic(ba, "a").unwrap();
        let a = table.extend_dynamic(CachingMapId::EMPTY, "a").unwrap();

        assert_ne!(ab, ba);
        assert!(table.has_same_shape(ab, ab));
        assert!(table.has_same_shape(ab, ba));
        assert!(table.has_same_shape(ba, ab));
        assert!(!table.has_same_shape(ab, a));
        assert!(!table.has_same_shape(a, ab));
    }

    #[test]
    fn only_the_empty_shape_is_a_leaf() {
        let table = Table::new();
        assert!(table.is_leaf(CachingMapId::EMPTY));
        let m = table.extend_dynamic(CachingMapId::EMPTY, "a").unwrap();
        assert!(!table.is_leaf(m));
        assert!(table.has_key(m, &"a"));
    }

    #[test]
    fn ids_from_another_table_are_rejected() {
        let big = Table::new();
        let foreign = big.extend_dynamic(CachingMapId::EMPTY, "a").unwrap();
        let foreign = big.extend_dynamic(foreign, "b").unwrap();
        let small = Table::new();

        assert_eq!(
            small.extend_dynamic(foreign, "x"),
            Err(ShapeError::UnknownShape(foreign.raw()))
        );
        assert_eq!(
            small.extend_static(foreign, "x", 1),
            Err(ShapeError::UnknownShape(foreign.raw()))
        );
        assert_eq!(small.get_dynamic_index(foreign, &"a"), None);
        assert_eq!(small.get_static(foreign, &"a"), None);
        assert_eq!(small.lookup(foreign, &"a", &[5], 0), 0);
        assert!(!small.has_key(foreign, &"a"));
        assert!(!small.is_leaf(foreign));
        assert!(!small.has_same_shape(CachingMapId::EMPTY, foreign));
        assert_eq!(small.storage_size(foreign), None);
        assert_eq!(small.keys(foreign), None);
    }
}
