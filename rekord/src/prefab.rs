//! Canonical keys for prefab (structurally identified) struct types.
//!
//! A key is built from a live type, from raw definition parameters, or from
//! a printed datum. All three paths end in [`PrefabCatalog::intern`], so
//! equivalent declarations always meet at one key, and through the catalog
//! at one type.
//!
//! Printed form:
//! `(name init-count (auto-count auto-value)? #(mutable-index ...)? super-key-elements ...)`

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::RwLock;

use crate::{StructError, StructType, Symbol, Value, error::Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrefabKeyId(u64);

pub struct PrefabKey {
    id: PrefabKeyId,
    name: Symbol,
    init_field_count: usize,
    auto_field_count: usize,
    auto_value: Value,
    mutables: Vec<usize>,
    super_key: Option<Arc<PrefabKey>>,
}

/// The structural tuple keys are interned by. Super keys are interned
/// already, so comparing their ids is full structural comparison.
#[derive(Clone, PartialEq, Eq, Hash)]
struct KeyTuple {
    name: Symbol,
    init_field_count: usize,
    auto_field_count: usize,
    auto_value: Value,
    mutables: Vec<usize>,
    super_key: Option<PrefabKeyId>,
}

impl PrefabKey {
    #[inline]
    pub fn id(&self) -> PrefabKeyId {
        self.id
    }

    pub fn name(&self) -> &Symbol {
        &self.name
    }

    pub fn init_field_count(&self) -> usize {
        self.init_field_count
    }

    pub fn auto_field_count(&self) -> usize {
        self.auto_field_count
    }

    pub fn auto_value(&self) -> &Value {
        &self.auto_value
    }

    pub fn mutables(&self) -> &[usize] {
        &self.mutables
    }

    pub fn super_key(&self) -> Option<&Arc<PrefabKey>> {
        self.super_key.as_ref()
    }

    /// Fields of an instance of the described type, supers included.
    pub fn total_field_count(&self) -> usize {
        let mut total = 0;
        let mut key = Some(self);
        while let Some(k) = key {
            total += k.init_field_count + k.auto_field_count;
            key = k.super_key.as_deref();
        }
        total
    }

    /// Immutable init-field indices: everything not listed as mutable.
    pub fn immutables(&self) -> Vec<usize> {
        (0..self.init_field_count)
            .filter(|i| self.mutables.binary_search(i).is_err())
            .collect()
    }

    fn elements(&self) -> Vec<Value> {
        let mut out = Vec::new();
        let mut key = Some(self);
        while let Some(k) = key {
            push_elements(
                &mut out,
                &k.name,
                k.init_field_count,
                k.auto_field_count,
                &k.auto_value,
                &k.mutables,
            );
            key = k.super_key.as_deref();
        }
        out
    }

    pub fn to_datum(&self) -> Value {
        Value::list(self.elements())
    }

    /// Like [`Self::to_datum`] without the leading init count, which can be
    /// inferred from the instance's field count. A lone name prints as the
    /// bare symbol.
    pub fn to_short_datum(&self) -> Value {
        shorten(self.elements())
    }
}

impl PartialEq for PrefabKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PrefabKey {}

impl fmt::Debug for PrefabKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<prefab-key:{}>", self.to_datum())
    }
}

fn push_elements(
    out: &mut Vec<Value>,
    name: &Symbol,
    init_field_count: usize,
    auto_field_count: usize,
    auto_value: &Value,
    mutables: &[usize],
) {
    out.push(Value::Symbol(name.clone()));
    out.push(Value::Fixnum(init_field_count as i64));
    if auto_field_count > 0 {
        out.push(Value::list([
            Value::Fixnum(auto_field_count as i64),
            auto_value.clone(),
        ]));
    }
    if !mutables.is_empty() {
        out.push(Value::vector(mutables.iter().map(|&i| Value::Fixnum(i as i64))));
    }
}

fn shorten(mut elements: Vec<Value>) -> Value {
    elements.remove(1);
    if elements.len() > 1 {
        Value::list(elements)
    } else {
        elements.swap_remove(0)
    }
}

fn mutables_of(init_field_count: usize, immutables: &[usize]) -> Vec<usize> {
    (0..init_field_count)
        .filter(|i| !immutables.contains(i))
        .collect()
}

/// Short printed key of a prefab type, computed without interning.
pub(crate) fn short_datum_of(ty: &StructType) -> Value {
    let mut out = Vec::new();
    for t in ty.ancestry() {
        push_elements(
            &mut out,
            t.name(),
            t.init_field_count(),
            t.auto_field_count(),
            t.auto_value(),
            &mutables_of(t.init_field_count(), t.immutables()),
        );
    }
    shorten(out)
}

/// A key datum after parsing, before interning.
struct ParsedKey {
    name: Symbol,
    init_field_count: Option<usize>,
    auto_field_count: usize,
    auto_value: Value,
    mutables: Vec<usize>,
    super_key: Option<Box<ParsedKey>>,
}

fn parse_datum(datum: &Value) -> Option<ParsedKey> {
    match datum {
        Value::Symbol(name) => Some(ParsedKey {
            name: name.clone(),
            init_field_count: None,
            auto_field_count: 0,
            auto_value: Value::FALSE,
            mutables: Vec::new(),
            super_key: None,
        }),
        Value::List(items) => parse_elements(items, true),
        _ => None,
    }
}

/// Parses one key level and, recursively, the super key elements behind
/// it. Only the outermost level may omit its init count.
fn parse_elements(items: &[Value], outermost: bool) -> Option<ParsedKey> {
    let (name, mut rest) = match items.split_first()? {
        (Value::Symbol(name), rest) => (name.clone(), rest),
        _ => return None,
    };

    let mut init_field_count = None;
    if let Some((Value::Fixnum(_), tail)) = rest.split_first() {
        init_field_count = Some(rest[0].as_index()?);
        rest = tail;
    }
    if init_field_count.is_none() && !outermost {
        return None;
    }

    let mut auto_field_count = 0;
    let mut auto_value = Value::FALSE;
    if let Some((Value::List(auto), tail)) = rest.split_first() {
        match &auto[..] {
            [count, value] => {
                auto_field_count = count.as_index()?;
                auto_value = value.clone();
            }
            _ => return None,
        }
        rest = tail;
    }

    let mut mutables = Vec::new();
    if let Some((Value::Vector(indices), tail)) = rest.split_first() {
        for index in indices.iter() {
            mutables.push(index.as_index()?);
        }
        mutables.sort_unstable();
        mutables.dedup();
        if let (Some(init), Some(&last)) = (init_field_count, mutables.last()) {
            if last >= init {
                return None;
            }
        }
        rest = tail;
    }

    let super_key = if rest.is_empty() {
        None
    } else {
        Some(Box::new(parse_elements(rest, false)?))
    };

    Some(ParsedKey {
        name,
        init_field_count,
        auto_field_count,
        auto_value,
        mutables,
        super_key,
    })
}

/// Whether `datum` is a well-formed printed prefab key.
pub fn is_prefab_key(datum: &Value) -> bool {
    parse_datum(datum).is_some()
}

struct PrefabCatalogImpl {
    keys: HashMap<KeyTuple, Arc<PrefabKey>, ahash::RandomState>,
    /// canonical type per key; pending until a definition finalizes it
    types: HashMap<PrefabKeyId, Arc<StructType>, ahash::RandomState>,
    next_id: u64,
}

/// Interning table for prefab keys plus the canonical type of each key.
pub struct PrefabCatalog(RwLock<PrefabCatalogImpl>);

impl PrefabCatalog {
    pub fn new(capacity: usize) -> Self {
        Self(RwLock::new(PrefabCatalogImpl {
            keys: HashMap::with_capacity_and_hasher(capacity, Default::default()),
            types: HashMap::with_capacity_and_hasher(capacity, Default::default()),
            next_id: 0,
        }))
    }

    /// The canonical key for this structural tuple.
    pub fn intern(
        &self,
        name: Symbol,
        init_field_count: usize,
        auto_field_count: usize,
        auto_value: Value,
        mutables: Vec<usize>,
        super_key: Option<Arc<PrefabKey>>,
    ) -> Arc<PrefabKey> {
        let mut mutables = mutables;
        mutables.sort_unstable();
        mutables.dedup();
        let tuple = KeyTuple {
            name,
            init_field_count,
            auto_field_count,
            auto_value,
            mutables,
            super_key: super_key.as_ref().map(|k| k.id),
        };

        if let Some(key) = self.0.read().keys.get(&tuple) {
            log::trace!("prefab key hit: {}", tuple.name);
            return key.clone();
        }

        let mut inner = self.0.write();
        if let Some(key) = inner.keys.get(&tuple) {
            return key.clone();
        }
        let id = PrefabKeyId(inner.next_id);
        inner.next_id += 1;
        let key = Arc::new(PrefabKey {
            id,
            name: tuple.name.clone(),
            init_field_count: tuple.init_field_count,
            auto_field_count: tuple.auto_field_count,
            auto_value: tuple.auto_value.clone(),
            mutables: tuple.mutables.clone(),
            super_key,
        });
        log::trace!("prefab key interned: {}", key.to_datum());
        inner.keys.insert(tuple, key.clone());
        key
    }

    /// Key of an existing type, supers included.
    pub fn from_struct_type(&self, ty: &StructType) -> Arc<PrefabKey> {
        let super_key = ty.super_type().map(|sup| self.from_struct_type(sup));
        self.intern(
            ty.name().clone(),
            ty.init_field_count(),
            ty.auto_field_count(),
            ty.auto_value().clone(),
            mutables_of(ty.init_field_count(), ty.immutables()),
            super_key,
        )
    }

    /// Key of a definition request, before any type exists for it.
    pub fn from_raw_params(
        &self,
        name: &Symbol,
        init_field_count: usize,
        auto_field_count: usize,
        auto_value: &Value,
        immutables: &[usize],
        super_type: Option<&StructType>,
    ) -> Arc<PrefabKey> {
        let super_key = super_type.map(|sup| self.from_struct_type(sup));
        self.intern(
            name.clone(),
            init_field_count,
            auto_field_count,
            auto_value.clone(),
            mutables_of(init_field_count, immutables),
            super_key,
        )
    }

    /// Key of a printed datum. `total_field_count` is the field count of an
    /// instance and is only used when the datum omits the init count.
    pub fn from_datum(&self, datum: &Value, total_field_count: usize) -> Result<Arc<PrefabKey>> {
        let invalid = || StructError::InvalidPrefabKey {
            datum: datum.to_string(),
        };
        let parsed = parse_datum(datum).ok_or_else(invalid)?;
        self.intern_parsed(parsed, Some(total_field_count))
            .ok_or_else(invalid)
    }

    fn intern_parsed(&self, parsed: ParsedKey, total: Option<usize>) -> Option<Arc<PrefabKey>> {
        let super_key = match parsed.super_key {
            Some(sup) => Some(self.intern_parsed(*sup, None)?),
            None => None,
        };
        let init_field_count = match parsed.init_field_count {
            Some(init) => init,
            None => {
                let inherited = super_key.as_ref().map_or(0, |k| k.total_field_count());
                total?
                    .checked_sub(inherited)?
                    .checked_sub(parsed.auto_field_count)?
            }
        };
        if parsed.mutables.last().is_some_and(|&last| last >= init_field_count) {
            return None;
        }
        Some(self.intern(
            parsed.name,
            init_field_count,
            parsed.auto_field_count,
            parsed.auto_value,
            parsed.mutables,
            super_key,
        ))
    }

    pub fn type_for(&self, key: &PrefabKey) -> Option<Arc<StructType>> {
        self.0.read().types.get(&key.id).cloned()
    }

    /// Registers `ty` as the canonical type of `key`, unless one is
    /// registered already, in which case that one is returned.
    pub fn register_type(&self, key: &PrefabKey, ty: Arc<StructType>) -> Arc<StructType> {
        self.0.write().types.entry(key.id).or_insert(ty).clone()
    }

    pub fn key_count(&self) -> usize {
        self.0.read().keys.len()
    }

    pub fn type_count(&self) -> usize {
        self.0.read().types.len()
    }

    /// Forgets every key and type. Existing `Arc`s stay valid but will no
    /// longer be found.
    pub fn reset(&self) {
        let mut inner = self.0.write();
        inner.keys.clear();
        inner.types.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StructTypeDescriptor;

    fn sym(name: &str) -> Symbol {
        Symbol::intern(name)
    }

    fn fix(n: i64) -> Value {
        Value::Fixnum(n)
    }

    #[test]
    fn equal_tuples_intern_to_one_key() {
        let catalog = PrefabCatalog::new(8);
        let a = catalog.intern(sym("p"), 2, 0, Value::FALSE, vec![1], None);
        let b = catalog.intern(sym("p"), 2, 0, Value::FALSE, vec![1, 1], None);
        let c = catalog.intern(sym("p"), 2, 0, Value::FALSE, vec![], None);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(catalog.key_count(), 2);
    }

    #[test]
    fn auto_value_takes_part_in_identity() {
        let catalog = PrefabCatalog::new(8);
        let a = catalog.intern(sym("p"), 1, 1, Value::list([fix(0)]), vec![], None);
        let b = catalog.intern(sym("p"), 1, 1, Value::list([fix(0)]), vec![], None);
        let c = catalog.intern(sym("p"), 1, 1, Value::list([fix(1)]), vec![], None);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn datum_round_trips_with_super() {
        let catalog = PrefabCatalog::new(8);
        let base = catalog.intern(sym("base"), 2, 1, fix(0), vec![0], None);
        let key = catalog.intern(sym("derived"), 1, 0, Value::FALSE, vec![], Some(base));

        let datum = key.to_datum();
        assert_eq!(datum.to_string(), "(derived 1 base 2 (1 0) #(0))");
        let back = catalog.from_datum(&datum, 0).unwrap();
        assert!(Arc::ptr_eq(&key, &back));

        let short = key.to_short_datum();
        assert_eq!(short.to_string(), "(derived base 2 (1 0) #(0))");
        let back = catalog.from_datum(&short, key.total_field_count()).unwrap();
        assert!(Arc::ptr_eq(&key, &back));
    }

    #[test]
    fn bare_symbol_short_form() {
        let catalog = PrefabCatalog::new(8);
        let key = catalog.intern(sym("point"), 2, 0, Value::FALSE, vec![], None);
        assert_eq!(key.to_short_datum(), Value::symbol("point"));
        let back = catalog.from_datum(&Value::symbol("point"), 2).unwrap();
        assert!(Arc::ptr_eq(&key, &back));
    }

    #[test]
    fn three_paths_agree() {
        let catalog = PrefabCatalog::new(8);
        let mut desc = StructTypeDescriptor::new("cell", None, 3, 0);
        desc.immutables = vec![0, 2];
        desc.inspector = crate::Inspector::Prefab;
        let ty = StructType::skeleton(&desc).unwrap();

        let from_type = catalog.from_struct_type(&ty);
        let from_params =
            catalog.from_raw_params(&sym("cell"), 3, 0, &Value::FALSE, &[0, 2], None);
        let datum = Value::list([Value::symbol("cell"), fix(3), Value::vector([fix(1)])]);
        let from_datum = catalog.from_datum(&datum, 3).unwrap();

        assert!(Arc::ptr_eq(&from_type, &from_params));
        assert!(Arc::ptr_eq(&from_type, &from_datum));
        assert_eq!(from_type.mutables(), &[1]);
        assert_eq!(from_type.immutables(), vec![0, 2]);
    }

    #[test]
    fn key_grammar() {
        assert!(is_prefab_key(&Value::symbol("p")));
        assert!(is_prefab_key(&Value::list([Value::symbol("p"), fix(1)])));
        assert!(is_prefab_key(&Value::list([Value::symbol("p")])));
        assert!(is_prefab_key(&Value::list([
            Value::symbol("p"),
            fix(1),
            Value::list([fix(2), Value::FALSE]),
            Value::vector([fix(0)]),
            Value::symbol("q"),
            fix(3),
        ])));
        // super level without a count
        assert!(!is_prefab_key(&Value::list([Value::symbol("p"), fix(1), Value::symbol("q")])));
        // mutable index past the init fields
        assert!(!is_prefab_key(&Value::list([
            Value::symbol("p"),
            fix(1),
            Value::vector([fix(1)]),
        ])));
        assert!(!is_prefab_key(&fix(3)));
        assert!(!is_prefab_key(&Value::list([fix(3)])));
    }

    #[test]
    fn inferred_init_count_must_fit() {
        let catalog = PrefabCatalog::new(8);
        let datum = Value::list([Value::symbol("p"), Value::symbol("q"), fix(3)]);
        assert!(matches!(
            catalog.from_datum(&datum, 2),
            Err(StructError::InvalidPrefabKey { .. })
        ));
        let key = catalog.from_datum(&datum, 5).unwrap();
        assert_eq!(key.init_field_count(), 2);
    }

    #[test]
    fn reset_forgets_keys() {
        let catalog = PrefabCatalog::new(8);
        let a = catalog.intern(sym("p"), 1, 0, Value::FALSE, vec![], None);
        catalog.reset();
        let b = catalog.intern(sym("p"), 1, 0, Value::FALSE, vec![], None);
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(catalog.key_count(), 1);
    }
}
