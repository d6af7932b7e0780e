use std::{
    fmt,
    sync::{Arc, LazyLock},
};

use crate::{Procedure, StructError, Symbol, Value, error::Result};

/// A named, inheritable capability attachable to struct types.
///
/// `supers` lists the properties this one also implies, each with the
/// procedure deriving the super property's value from this one's.
pub struct StructProperty {
    name: Symbol,
    guard: Option<Value>,
    supers: Vec<(Arc<StructProperty>, Value)>,
    can_impersonate: bool,
}

impl StructProperty {
    pub fn new(
        name: &str,
        guard: Option<Value>,
        supers: Vec<(Arc<StructProperty>, Value)>,
        can_impersonate: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: Symbol::intern(name),
            guard,
            supers,
            can_impersonate,
        })
    }

    /// The property together with its predicate and accessor procedures.
    pub fn make(
        name: &str,
        guard: Option<Value>,
        supers: Vec<(Arc<StructProperty>, Value)>,
        can_impersonate: bool,
    ) -> (Arc<Self>, Procedure, Procedure) {
        let property = Self::new(name, guard, supers, can_impersonate);
        let predicate = Procedure::PropertyPredicate(property.clone());
        let accessor = Procedure::PropertyAccessor(property.clone());
        (property, predicate, accessor)
    }

    fn builtin(name: &str) -> Arc<Self> {
        Self::new(name, None, Vec::new(), false)
    }

    pub fn name(&self) -> &Symbol {
        &self.name
    }

    pub fn guard(&self) -> Option<&Value> {
        self.guard.as_ref()
    }

    pub fn supers(&self) -> &[(Arc<StructProperty>, Value)] {
        &self.supers
    }

    pub fn can_impersonate(&self) -> bool {
        self.can_impersonate
    }

    /// True if `self` is `other` or transitively implies it.
    pub fn is_a(&self, other: &StructProperty) -> bool {
        std::ptr::eq(self, other)
            || self.supers.iter().any(|(sup, _)| sup.is_a(other))
    }

    pub fn is_held_by(&self, value: &Value) -> bool {
        value
            .as_struct()
            .is_some_and(|instance| instance.get_prop(self).is_ok())
    }

    pub fn value_of(&self, value: &Value) -> Result<Value> {
        match value.as_struct() {
            Some(instance) => instance.get_prop(self),
            None => Err(StructError::MissingProperty {
                property: self.name.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

impl fmt::Debug for StructProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<struct-type-property:{}>", self.name)
    }
}

pub static PROP_PROCEDURE: LazyLock<Arc<StructProperty>> =
    LazyLock::new(|| StructProperty::builtin("prop:procedure"));
pub static PROP_CHECKED_PROCEDURE: LazyLock<Arc<StructProperty>> =
    LazyLock::new(|| StructProperty::builtin("prop:checked-procedure"));
pub static PROP_ARITY_STRING: LazyLock<Arc<StructProperty>> =
    LazyLock::new(|| StructProperty::builtin("prop:arity-string"));
pub static PROP_CUSTOM_WRITE: LazyLock<Arc<StructProperty>> =
    LazyLock::new(|| StructProperty::builtin("prop:custom-write"));
/// Reserved for the generic equality subsystem, which lives outside this
/// crate.
pub static PROP_EQUAL_HASH: LazyLock<Arc<StructProperty>> =
    LazyLock::new(|| StructProperty::builtin("prop:equal+hash"));
pub static PROP_CHAPERONE_UNSAFE_UNDEFINED: LazyLock<Arc<StructProperty>> =
    LazyLock::new(|| StructProperty::builtin("prop:chaperone-unsafe-undefined"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_a_follows_supers_transitively() {
        let identity = Value::Void;
        let base = StructProperty::new("base", None, vec![], false);
        let middle =
            StructProperty::new("middle", None, vec![(base.clone(), identity.clone())], false);
        let leaf = StructProperty::new("leaf", None, vec![(middle.clone(), identity)], false);

        assert!(leaf.is_a(&leaf));
        assert!(leaf.is_a(&middle));
        assert!(leaf.is_a(&base));
        assert!(!base.is_a(&leaf));
        assert!(!leaf.is_a(&PROP_PROCEDURE));
    }

    #[test]
    fn builtins_are_distinct_identities() {
        assert!(!PROP_PROCEDURE.is_a(&PROP_CHECKED_PROCEDURE));
        assert!(PROP_EQUAL_HASH.is_a(&PROP_EQUAL_HASH));
        assert_eq!(PROP_ARITY_STRING.name().as_str(), "prop:arity-string");
    }

    #[test]
    fn accessor_rejects_non_structs() {
        let (_, predicate, accessor) = StructProperty::make("prop:color", None, vec![], false);
        let step = predicate.apply(vec![Value::Fixnum(1)]).unwrap();
        assert!(matches!(step, crate::Step::Return(ref v) if v[0] == Value::FALSE));
        assert!(matches!(
            accessor.apply(vec![Value::Fixnum(1)]),
            Err(StructError::MissingProperty { .. })
        ));
    }
}
