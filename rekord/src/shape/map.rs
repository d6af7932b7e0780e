use std::{collections::HashMap, hash::Hash};

use parking_lot::RwLock;

use super::ShapeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct MapId(u32);

impl MapId {
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

struct MapNode<K> {
    indexes: HashMap<K, usize, ahash::RandomState>,
    /// keys in slot order
    keys: Vec<K>,
}

struct MapTableImpl<K> {
    nodes: Vec<MapNode<K>>,
    transitions: HashMap<(MapId, K), MapId, ahash::RandomState>,
}

impl<K> MapTableImpl<K> {
    fn node(&self, map: MapId) -> Result<&MapNode<K>, ShapeError> {
        self.nodes
            .get(map.index())
            .ok_or(ShapeError::UnknownShape(map.0))
    }
}

/// Plain shapes: every attribute lives in per-object storage.
pub struct MapTable<K>(RwLock<MapTableImpl<K>>);

impl<K> MapTable<K>
where
    K: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        let root = MapNode {
            indexes: HashMap::default(),
            keys: Vec::new(),
        };
        Self(RwLock::new(MapTableImpl {
            nodes: vec![root],
            transitions: HashMap::default(),
        }))
    }

    /// The shape reached from `map` by adding `name`. Repeated calls with
    /// the same arguments return the same id. Adding a name the shape
    /// already has returns `map` itself.
    pub fn extend(&self, map: MapId, name: K) -> Result<MapId, ShapeError> {
        {
            let inner = self.0.read();
            if inner.node(map)?.indexes.contains_key(&name) {
                return Ok(map);
            }
            if let Some(&child) = inner.transitions.get(&(map, name.clone())) {
                return Ok(child);
            }
        }

        let mut inner = self.0.write();
        if let Some(&child) = inner.transitions.get(&(map, name.clone())) {
            return Ok(child);
        }
        let parent = inner.node(map)?;
        let mut indexes = parent.indexes.clone();
        let mut keys = parent.keys.clone();
        indexes.insert(name.clone(), keys.len());
        keys.push(name.clone());

        let child = MapId(inner.nodes.len() as u32);
        inner.nodes.push(MapNode { indexes, keys });
        inner.transitions.insert((map, name), child);
        log::trace!("map node {} extends {}", child.0, map.0);
        Ok(child)
    }

    /// Adds `names` in order, starting from the empty shape.
    pub fn path(&self, names: impl IntoIterator<Item = K>) -> Result<MapId, ShapeError> {
        names
            .into_iter()
            .try_fold(MapId::EMPTY, |map, name| self.extend(map, name))
    }

    /// Slot of `name`; `None` also for an id this table did not issue.
    #[inline]
    pub fn get_index(&self, map: MapId, name: &K) -> Option<usize> {
        self.0.read().node(map).ok()?.indexes.get(name).copied()
    }

    /// Reads `name` out of an object's `storage`, or `default` when the
    /// shape has no such attribute.
    pub fn lookup<V: Clone>(&self, map: MapId, name: &K, storage: &[V], default: V) -> V {
        self.get_index(map, name)
            .and_then(|index| storage.get(index).cloned())
            .unwrap_or(default)
    }

    pub fn storage_size(&self, map: MapId) -> Option<usize> {
        Some(self.0.read().node(map).ok()?.keys.len())
    }

    pub fn keys(&self, map: MapId) -> Option<Vec<K>> {
        Some(self.0.read().node(map).ok()?.keys.clone())
    }

    /// Number of shapes created so far, the empty one included.
    pub fn len(&self) -> usize {
        self.0.read().nodes.len()
    }
}

impl<K> Default for MapTable<K>
where
    K: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
