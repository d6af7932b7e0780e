use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    Accessor, Constructor, Mutator, PROP_PROCEDURE, Predicate, StructError,
    StructProperty, Symbol, Value, error::Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructTypeId(u64);

static NEXT_TYPE_ID: AtomicU64 = AtomicU64::new(1);

impl StructTypeId {
    fn fresh() -> Self {
        Self(NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Inspector hierarchy. Recorded on opaque types; nothing walks it yet.
#[derive(Debug)]
pub struct StructInspector {
    super_inspector: Option<Arc<StructInspector>>,
}

impl StructInspector {
    pub fn root() -> Arc<Self> {
        Arc::new(Self {
            super_inspector: None,
        })
    }

    /// A sibling inspector shares `inspector`'s parent instead of being
    /// controlled by `inspector` itself.
    pub fn make(inspector: Option<&Arc<Self>>, is_sibling: bool) -> Arc<Self> {
        let super_inspector = if is_sibling {
            inspector.and_then(|inspector| inspector.super_inspector.clone())
        } else {
            inspector.cloned()
        };
        Arc::new(Self { super_inspector })
    }

    pub fn super_inspector(&self) -> Option<&Arc<StructInspector>> {
        self.super_inspector.as_ref()
    }
}

#[derive(Debug, Clone)]
pub enum Inspector {
    Transparent,
    Opaque(Arc<StructInspector>),
    /// Structural identity; see [`crate::PrefabKey`].
    Prefab,
}

impl PartialEq for Inspector {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Inspector::Transparent, Inspector::Transparent)
            | (Inspector::Prefab, Inspector::Prefab) => true,
            (Inspector::Opaque(a), Inspector::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// How instances of a type behave when applied.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcSpec {
    /// Apply this procedure with the instance prepended to the arguments.
    Procedure(Value),
    /// Apply whatever the instance holds in this (own) field.
    Field(usize),
}

impl ProcSpec {
    pub fn from_value(value: Value) -> Result<Self> {
        if let Value::Fixnum(_) = value {
            return value
                .as_index()
                .map(ProcSpec::Field)
                .ok_or_else(|| StructError::contract("prop:procedure", "field index", &value));
        }
        if value.is_callable() {
            Ok(ProcSpec::Procedure(value))
        } else {
            Err(StructError::contract(
                "prop:procedure",
                "(or/c procedure? exact-nonnegative-integer?)",
                &value,
            ))
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ProcSpec::Procedure(procedure) => procedure.clone(),
            ProcSpec::Field(index) => Value::Fixnum(*index as i64),
        }
    }
}

/// The procedure designation a type ended up with, and the type whose own
/// fields a [`ProcSpec::Field`] index is relative to.
#[derive(Debug, Clone)]
pub struct ProcedureBinding {
    pub spec: ProcSpec,
    pub source: StructTypeId,
}

/// Result of the attachment protocol, published in one go.
#[derive(Debug, Default)]
pub(crate) struct ResolvedProperties {
    pub properties: Vec<(Arc<StructProperty>, Value)>,
    pub procedure: Option<ProcedureBinding>,
}

/// Everything a type-definition request carries.
#[derive(Debug, Clone)]
pub struct StructTypeDescriptor {
    pub name: Symbol,
    pub super_type: Option<Arc<StructType>>,
    pub init_field_count: usize,
    pub auto_field_count: usize,
    pub auto_value: Value,
    pub properties: Vec<(Arc<StructProperty>, Value)>,
    pub inspector: Inspector,
    pub proc_spec: Option<Value>,
    pub immutables: Vec<usize>,
    pub guard: Option<Value>,
    pub constructor_name: Option<Symbol>,
}

impl StructTypeDescriptor {
    pub fn new(
        name: &str,
        super_type: Option<Arc<StructType>>,
        init_field_count: usize,
        auto_field_count: usize,
    ) -> Self {
        Self {
            name: Symbol::intern(name),
            super_type,
            init_field_count,
            auto_field_count,
            auto_value: Value::FALSE,
            properties: Vec::new(),
            inspector: Inspector::Transparent,
            proc_spec: None,
            immutables: Vec::new(),
            guard: None,
            constructor_name: None,
        }
    }
}

/// Record-type layout descriptor.
pub struct StructType {
    id: StructTypeId,
    name: Symbol,
    super_type: Option<Arc<StructType>>,
    init_field_count: usize,
    auto_field_count: usize,
    total_field_count: usize,
    auto_value: Value,
    auto_values: Box<[Value]>,
    inspector: Inspector,
    immutables: Vec<usize>,
    guard: Option<Value>,
    constructor_name: Symbol,
    /// ancestor id (self included) -> base offset of that ancestor's own
    /// fields inside an instance of this exact type
    offsets: HashMap<StructTypeId, usize, ahash::RandomState>,
    resolved: OnceLock<ResolvedProperties>,
}

impl StructType {
    /// Builds the unprocessed skeleton: layout, immutables and auto values.
    /// Properties are attached later by the attachment protocol.
    pub(crate) fn skeleton(desc: &StructTypeDescriptor) -> Result<Arc<Self>> {
        let name = desc.name.clone();
        let super_total = desc
            .super_type
            .as_ref()
            .map_or(0, |sup| sup.total_field_count);
        let total_field_count =
            super_total + desc.init_field_count + desc.auto_field_count;

        let mut immutables = Vec::with_capacity(desc.immutables.len() + 1);
        for &index in &desc.immutables {
            if index >= desc.init_field_count {
                return Err(StructError::FieldIndexOutOfRange {
                    type_name: name.to_string(),
                    index,
                    count: desc.init_field_count,
                });
            }
            immutables.push(index);
        }
        // a procedure field is immutable whichever way it was designated
        let designations = desc.proc_spec.iter().chain(
            desc.properties
                .iter()
                .filter(|(property, _)| Arc::ptr_eq(property, &*PROP_PROCEDURE))
                .map(|(_, value)| value),
        );
        for spec in designations {
            if let Value::Fixnum(_) = spec {
                let ProcSpec::Field(index) = ProcSpec::from_value(spec.clone())? else {
                    continue;
                };
                if index >= desc.init_field_count {
                    return Err(StructError::FieldIndexOutOfRange {
                        type_name: name.to_string(),
                        index,
                        count: desc.init_field_count,
                    });
                }
                immutables.push(index);
            }
        }
        immutables.sort_unstable();
        immutables.dedup();

        let id = StructTypeId::fresh();
        let mut offsets = HashMap::default();
        offsets.insert(id, super_total);
        let mut ancestor = desc.super_type.as_deref();
        while let Some(ty) = ancestor {
            offsets.insert(ty.id, ty.own_base());
            ancestor = ty.super_type.as_deref();
        }

        let constructor_name = desc
            .constructor_name
            .clone()
            .unwrap_or_else(|| Symbol::intern(&format!("make-{name}")));

        Ok(Arc::new(Self {
            id,
            name,
            super_type: desc.super_type.clone(),
            init_field_count: desc.init_field_count,
            auto_field_count: desc.auto_field_count,
            total_field_count,
            auto_value: desc.auto_value.clone(),
            auto_values: vec![desc.auto_value.clone(); desc.auto_field_count]
                .into_boxed_slice(),
            inspector: desc.inspector.clone(),
            immutables,
            guard: desc.guard.clone(),
            constructor_name,
            offsets,
            resolved: OnceLock::new(),
        }))
    }

    #[inline]
    fn own_base(&self) -> usize {
        self.total_field_count - self.init_field_count - self.auto_field_count
    }

    #[inline]
    pub fn id(&self) -> StructTypeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &Symbol {
        &self.name
    }

    #[inline]
    pub fn super_type(&self) -> Option<&Arc<StructType>> {
        self.super_type.as_ref()
    }

    #[inline]
    pub fn init_field_count(&self) -> usize {
        self.init_field_count
    }

    #[inline]
    pub fn auto_field_count(&self) -> usize {
        self.auto_field_count
    }

    #[inline]
    pub fn own_field_count(&self) -> usize {
        self.init_field_count + self.auto_field_count
    }

    #[inline]
    pub fn total_field_count(&self) -> usize {
        self.total_field_count
    }

    pub fn auto_value(&self) -> &Value {
        &self.auto_value
    }

    pub fn auto_values(&self) -> &[Value] {
        &self.auto_values
    }

    pub fn inspector(&self) -> &Inspector {
        &self.inspector
    }

    pub fn is_prefab(&self) -> bool {
        matches!(self.inspector, Inspector::Prefab)
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self.inspector, Inspector::Opaque(_))
    }

    pub fn immutables(&self) -> &[usize] {
        &self.immutables
    }

    pub fn is_immutable(&self, field: usize) -> bool {
        self.immutables.binary_search(&field).is_ok()
    }

    pub fn guard(&self) -> Option<&Value> {
        self.guard.as_ref()
    }

    pub fn constructor_name(&self) -> &Symbol {
        &self.constructor_name
    }

    /// Number of constructor arguments: every init field along the chain.
    pub fn constructor_arity(&self) -> usize {
        self.ancestry().map(|ty| ty.init_field_count).sum()
    }

    /// Base offset of `ty`'s own fields inside an instance of this exact
    /// type, or `None` when `ty` is not this type or one of its ancestors.
    #[inline]
    pub fn offset_of(&self, ty: &StructType) -> Option<usize> {
        self.offset_of_id(ty.id)
    }

    #[inline]
    pub fn offset_of_id(&self, id: StructTypeId) -> Option<usize> {
        self.offsets.get(&id).copied()
    }

    /// This type followed by its ancestors, most derived first.
    pub fn ancestry(&self) -> impl Iterator<Item = &StructType> {
        std::iter::successors(Some(self), |ty| ty.super_type.as_deref())
    }

    pub fn is_subtype_of(&self, other: &StructType) -> bool {
        self.ancestry().any(|ty| ty.ptr_eq(other))
    }

    #[inline]
    pub fn ptr_eq(&self, other: &StructType) -> bool {
        std::ptr::eq(self, other)
    }

    #[inline]
    pub(crate) fn address(&self) -> usize {
        self as *const Self as usize
    }

    /// Whether the attachment protocol has completed for this type.
    pub fn is_finalized(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// Resolved properties, inherited ones included. Empty while the type
    /// is still pending.
    pub fn properties(&self) -> &[(Arc<StructProperty>, Value)] {
        match self.resolved.get() {
            Some(resolved) => &resolved.properties,
            None => &[],
        }
    }

    pub fn property_value(&self, property: &StructProperty) -> Option<&Value> {
        self.properties()
            .iter()
            .find(|(p, _)| std::ptr::eq(&**p, property))
            .map(|(_, value)| value)
    }

    pub fn procedure(&self) -> Option<&ProcedureBinding> {
        self.resolved.get()?.procedure.as_ref()
    }

    /// Publishes the protocol result. Only the first publication wins.
    pub(crate) fn publish(&self, resolved: ResolvedProperties) -> bool {
        self.resolved.set(resolved).is_ok()
    }

    pub fn constructor(self: &Arc<Self>) -> Constructor {
        Constructor::new(self.clone())
    }

    pub fn predicate(self: &Arc<Self>) -> Predicate {
        Predicate::new(self.clone())
    }

    pub fn accessor(self: &Arc<Self>) -> Accessor {
        Accessor::new(self.clone())
    }

    pub fn mutator(self: &Arc<Self>) -> Mutator {
        Mutator::new(self.clone())
    }

    pub fn definition(self: &Arc<Self>) -> StructTypeDefinition {
        StructTypeDefinition {
            struct_type: self.clone(),
            constructor: self.constructor(),
            predicate: self.predicate(),
            accessor: self.accessor(),
            mutator: self.mutator(),
        }
    }

    /// Reflective view handed to property guards.
    ///
    /// `super_type` is always the direct super and `skipped` is always
    /// false: the inspector chain is not walked.
    pub fn reflective_info(self: &Arc<Self>) -> StructTypeInfo {
        StructTypeInfo {
            name: self.name.clone(),
            init_field_count: self.init_field_count,
            auto_field_count: self.auto_field_count,
            accessor: self.accessor(),
            mutator: self.mutator(),
            immutables: self.immutables.clone(),
            super_type: self.super_type.clone(),
            skipped: false,
        }
    }
}

impl fmt::Debug for StructType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<struct-type:{}>", self.name)
    }
}

#[derive(Debug, Clone)]
pub struct StructTypeInfo {
    pub name: Symbol,
    pub init_field_count: usize,
    pub auto_field_count: usize,
    pub accessor: Accessor,
    pub mutator: Mutator,
    pub immutables: Vec<usize>,
    pub super_type: Option<Arc<StructType>>,
    pub skipped: bool,
}

impl StructTypeInfo {
    pub fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Symbol(self.name.clone()),
            Value::Fixnum(self.init_field_count as i64),
            Value::Fixnum(self.auto_field_count as i64),
            self.accessor.clone().into(),
            self.mutator.clone().into(),
            Value::list(self.immutables.iter().map(|&i| Value::Fixnum(i as i64))),
            self.super_type
                .clone()
                .map_or(Value::FALSE, Value::StructType),
            Value::Bool(self.skipped),
        ]
    }
}

/// The five results of a type definition.
#[derive(Debug, Clone)]
pub struct StructTypeDefinition {
    pub struct_type: Arc<StructType>,
    pub constructor: Constructor,
    pub predicate: Predicate,
    pub accessor: Accessor,
    pub mutator: Mutator,
}

impl StructTypeDefinition {
    pub fn to_values(&self) -> Vec<Value> {
        vec![
            Value::StructType(self.struct_type.clone()),
            self.constructor.clone().into(),
            self.predicate.clone().into(),
            self.accessor.clone().into(),
            self.mutator.clone().into(),
        ]
    }

    pub fn from_values(values: &[Value]) -> Result<Self> {
        match values {
            [Value::StructType(ty), ..] if values.len() == 5 => Ok(ty.definition()),
            _ => Err(StructError::ResultCount {
                context: "make-struct-type".into(),
                expected: 5,
                given: values.len(),
            }),
        }
    }
}
