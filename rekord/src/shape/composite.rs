use std::{collections::HashMap, hash::Hash};

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct CompositeId(u32);

impl CompositeId {
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

struct CompositeMapTableImpl<T> {
    parts: Vec<T>,
    ids: HashMap<T, CompositeId, ahash::RandomState>,
}

/// Interns fixed tuples of component shapes, e.g. `(MapId, CachingMapId)`,
/// so that two equal tuples always share one composite id.
pub struct CompositeMapTable<T>(RwLock<CompositeMapTableImpl<T>>);

impl<T> CompositeMapTable<T>
where
    T: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self(RwLock::new(CompositeMapTableImpl {
            parts: Vec::new(),
            ids: HashMap::default(),
        }))
    }

    pub fn instantiate(&self, parts: T) -> CompositeId {
        if let Some(&id) = self.0.read().ids.get(&parts) {
            return id;
        }
        let mut inner = self.0.write();
        if let Some(&id) = inner.ids.get(&parts) {
            return id;
        }
        let id = CompositeId(inner.parts.len() as u32);
        inner.parts.push(parts.clone());
        inner.ids.insert(parts, id);
        log::trace!("composite map {} created", id.0);
        id
    }

    /// The components `id` was instantiated from.
    pub fn get(&self, id: CompositeId) -> Option<T> {
        self.0.read().parts.get(id.0 as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.read().parts.len()
    }
}

impl<T> Default for CompositeMapTable<T>
where
    T: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{CachingMapId, CachingMapTable, MapId, MapTable};

    #[test]
    fn equal_tuples_share_one_composite() {
        let layouts = MapTable::new();
        let handlers: CachingMapTable<&str, i64> = CachingMapTable::new();
        let composites = CompositeMapTable::new();

        let layout = layouts.extend(MapId::EMPTY, "x").unwrap();
        let handler = handlers.extend_static(CachingMapId::EMPTY, "get", 1).unwrap();

        let a = composites.instantiate((layout, handler));
        let b = composites.instantiate((layouts.extend(MapId::EMPTY, "x").unwrap(), handler));
        let c = composites.instantiate((MapId::EMPTY, handler));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(composites.len(), 2);
        assert_eq!(composites.get(a), Some((layout, handler)));
    }
}
