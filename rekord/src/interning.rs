use std::{
    collections::HashMap,
    hash::Hasher,
    sync::{Arc, LazyLock},
};

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InternedId(u64);

struct InternedStringsImpl {
    table: HashMap<InternedId, Arc<str>, ahash::RandomState>,
    mappings: HashMap<Arc<str>, InternedId, ahash::RandomState>,
}

/// Process-wide symbol table. Symbols never die, so there is no removal.
pub struct InternedStrings(RwLock<InternedStringsImpl>);

static SYMBOLS: LazyLock<InternedStrings> = LazyLock::new(InternedStrings::new);

impl InternedStringsImpl {
    fn new() -> Self {
        Self {
            table: HashMap::default(),
            mappings: HashMap::default(),
        }
    }

    fn get_or_add(&mut self, value: &str) -> (InternedId, Arc<str>) {
        if let Some(&id) = self.mappings.get(value) {
            return (id, self.table[&id].clone());
        }
        let mut hasher = ahash::AHasher::default();
        hasher.write(value.as_bytes());
        let mut id = InternedId(hasher.finish());
        // open addressing on the rare collision keeps ids unique
        while self.table.contains_key(&id) {
            id = InternedId(id.0.wrapping_add(1));
        }
        let interned = Arc::<str>::from(value);
        self.mappings.insert(interned.clone(), id);
        self.table.insert(id, interned.clone());
        (id, interned)
    }

    fn get(&self, id: &InternedId) -> Option<Arc<str>> {
        self.table.get(id).cloned()
    }
}

impl InternedStrings {
    pub fn new() -> Self {
        Self(RwLock::new(InternedStringsImpl::new()))
    }

    pub fn global() -> &'static InternedStrings {
        &SYMBOLS
    }

    pub fn add(&self, value: &str) -> (InternedId, Arc<str>) {
        if let Some(found) = self.lookup(value) {
            return found;
        }
        self.0.write().get_or_add(value)
    }

    pub fn lookup(&self, value: &str) -> Option<(InternedId, Arc<str>)> {
        let inner = self.0.read();
        let id = *inner.mappings.get(value)?;
        Some((id, inner.table[&id].clone()))
    }

    pub fn get(&self, id: &InternedId) -> Option<Arc<str>> {
        self.0.read().get(id)
    }

    pub fn len(&self) -> usize {
        self.0.read().table.len()
    }
}

impl Default for InternedStrings {
    fn default() -> Self {
        Self::new()
    }
}
