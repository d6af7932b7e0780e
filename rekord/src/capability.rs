use std::{fmt, sync::Arc};

use crate::{Procedure, StructError, StructType, Symbol, Value, error::Result};

macro_rules! capability {
    ($name:ident, $variant:ident) => {
        #[derive(Clone)]
        pub struct $name(Arc<StructType>);

        impl $name {
            pub(crate) fn new(struct_type: Arc<StructType>) -> Self {
                Self(struct_type)
            }

            #[inline]
            pub fn struct_type(&self) -> &Arc<StructType> {
                &self.0
            }
        }

        impl From<$name> for Value {
            fn from(value: $name) -> Self {
                Value::Procedure(Procedure::$variant(value))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "#<procedure:{}>", self.name())
            }
        }
    };
}

capability!(Predicate, Predicate);
capability!(Accessor, Accessor);
capability!(Mutator, Mutator);

fn expect_struct<'a>(
    procedure: &str,
    ty: &StructType,
    value: &'a Value,
) -> Result<&'a Arc<crate::StructInstance>> {
    value
        .as_struct()
        .ok_or_else(|| StructError::contract(procedure, format!("{}?", ty.name()), value))
}

impl Predicate {
    pub fn name(&self) -> String {
        format!("{}?", self.0.name())
    }

    /// True iff `value` is an instance of this type or of a subtype.
    pub fn test(&self, value: &Value) -> bool {
        value
            .as_struct()
            .is_some_and(|instance| instance.struct_type().is_subtype_of(&self.0))
    }
}

impl Accessor {
    pub fn name(&self) -> String {
        format!("{}-ref", self.0.name())
    }

    pub fn access(&self, value: &Value, field: usize) -> Result<Value> {
        expect_struct(&self.name(), &self.0, value)?.get(&self.0, field)
    }

    /// Binds this accessor to one field.
    pub fn field(&self, field: usize, field_name: Option<Symbol>) -> Result<FieldAccessor> {
        check_field(&self.0, field)?;
        Ok(FieldAccessor {
            accessor: self.clone(),
            field,
            field_name,
        })
    }
}

impl Mutator {
    pub fn name(&self) -> String {
        format!("{}-set!", self.0.name())
    }

    pub fn mutate(&self, value: &Value, field: usize, new_value: Value) -> Result<()> {
        let instance = expect_struct(&self.name(), &self.0, value)?;
        if self.0.is_immutable(field) {
            return Err(StructError::ImmutableField {
                type_name: self.0.name().to_string(),
                index: field,
            });
        }
        instance.set(&self.0, field, new_value)
    }

    /// Binds this mutator to one field.
    pub fn field(&self, field: usize, field_name: Option<Symbol>) -> Result<FieldMutator> {
        check_field(&self.0, field)?;
        Ok(FieldMutator {
            mutator: self.clone(),
            field,
            field_name,
        })
    }
}

fn check_field(ty: &StructType, field: usize) -> Result<()> {
    if field < ty.own_field_count() {
        Ok(())
    } else {
        Err(StructError::FieldIndexOutOfRange {
            type_name: ty.name().to_string(),
            index: field,
            count: ty.own_field_count(),
        })
    }
}

fn field_label(field: usize, field_name: &Option<Symbol>) -> String {
    match field_name {
        Some(name) => name.to_string(),
        None => format!("field{field}"),
    }
}

#[derive(Clone)]
pub struct FieldAccessor {
    accessor: Accessor,
    field: usize,
    field_name: Option<Symbol>,
}

impl FieldAccessor {
    pub fn name(&self) -> String {
        format!(
            "{}-{}",
            self.accessor.struct_type().name(),
            field_label(self.field, &self.field_name)
        )
    }

    pub fn struct_type(&self) -> &Arc<StructType> {
        self.accessor.struct_type()
    }

    pub fn field(&self) -> usize {
        self.field
    }

    pub fn access(&self, value: &Value) -> Result<Value> {
        self.accessor.access(value, self.field)
    }
}

#[derive(Clone)]
pub struct FieldMutator {
    mutator: Mutator,
    field: usize,
    field_name: Option<Symbol>,
}

impl FieldMutator {
    pub fn name(&self) -> String {
        format!(
            "{}-{}!",
            self.mutator.struct_type().name(),
            field_label(self.field, &self.field_name)
        )
    }

    pub fn struct_type(&self) -> &Arc<StructType> {
        self.mutator.struct_type()
    }

    pub fn field(&self) -> usize {
        self.field
    }

    pub fn mutate(&self, value: &Value, new_value: Value) -> Result<()> {
        self.mutator.mutate(value, self.field, new_value)
    }
}

impl From<FieldAccessor> for Value {
    fn from(value: FieldAccessor) -> Self {
        Value::Procedure(Procedure::FieldAccessor(value))
    }
}

impl From<FieldMutator> for Value {
    fn from(value: FieldMutator) -> Self {
        Value::Procedure(Procedure::FieldMutator(value))
    }
}

impl fmt::Debug for FieldAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<procedure:{}>", self.name())
    }
}

impl fmt::Debug for FieldMutator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<procedure:{}>", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StructInstance, StructTypeDescriptor};

    fn point() -> Arc<StructType> {
        let mut desc = StructTypeDescriptor::new("point", None, 2, 0);
        desc.immutables = vec![1];
        StructType::skeleton(&desc).unwrap()
    }

    #[test]
    fn names_follow_the_type() {
        let ty = point();
        assert_eq!(ty.predicate().name(), "point?");
        assert_eq!(ty.accessor().name(), "point-ref");
        assert_eq!(ty.mutator().name(), "point-set!");
        let x = ty.accessor().field(0, Some(Symbol::intern("x"))).unwrap();
        assert_eq!(x.name(), "point-x");
        let y = ty.mutator().field(1, None).unwrap();
        assert_eq!(y.name(), "point-field1!");
    }

    #[test]
    fn mutator_refuses_immutable_fields() {
        let ty = point();
        let p = Value::Struct(
            StructInstance::make(ty.clone(), vec![Value::Fixnum(1), Value::Fixnum(2)]).unwrap(),
        );
        ty.mutator().mutate(&p, 0, Value::Fixnum(7)).unwrap();
        assert_eq!(ty.accessor().access(&p, 0), Ok(Value::Fixnum(7)));
        assert_eq!(
            ty.mutator().mutate(&p, 1, Value::Fixnum(7)),
            Err(StructError::ImmutableField {
                type_name: "point".into(),
                index: 1
            })
        );
    }

    #[test]
    fn field_capabilities_check_their_index() {
        let ty = point();
        assert!(ty.accessor().field(2, None).is_err());
    }

    #[test]
    fn accessor_rejects_non_instances() {
        let ty = point();
        assert!(matches!(
            ty.accessor().access(&Value::Fixnum(1), 0),
            Err(StructError::ContractViolation { .. })
        ));
        assert!(!ty.predicate().test(&Value::Fixnum(1)));
    }
}
