use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use crate::{
    Accessor, Arity, Constructor, FieldAccessor, FieldMutator, Mutator,
    Predicate, Step, StructError, StructProperty, Value, error::Result,
};

pub type NativeBody = dyn Fn(&[Value]) -> Result<Vec<Value>> + Send + Sync;

/// A procedure implemented in Rust, standing in for host-level user code.
pub struct NativeProcedure {
    name: String,
    arity: Arity,
    body: Box<NativeBody>,
}

impl NativeProcedure {
    pub fn new(
        name: impl Into<String>,
        arity: Arity,
        body: impl Fn(&[Value]) -> Result<Vec<Value>> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            arity,
            body: Box::new(body),
        })
    }

    /// Shorthand wrapping the procedure straight into a [`Value`].
    pub fn value(
        name: impl Into<String>,
        arity: Arity,
        body: impl Fn(&[Value]) -> Result<Vec<Value>> + Send + Sync + 'static,
    ) -> Value {
        Value::Procedure(Procedure::Native(Self::new(name, arity, body)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Vec<Value>> {
        (self.body)(args)
    }
}

impl fmt::Debug for NativeProcedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeProcedure")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Every callable this layer hands out.
#[derive(Clone)]
pub enum Procedure {
    Native(Arc<NativeProcedure>),
    Constructor(Constructor),
    Predicate(Predicate),
    Accessor(Accessor),
    Mutator(Mutator),
    FieldAccessor(FieldAccessor),
    FieldMutator(FieldMutator),
    PropertyPredicate(Arc<StructProperty>),
    PropertyAccessor(Arc<StructProperty>),
}

impl Procedure {
    pub fn name(&self) -> String {
        match self {
            Procedure::Native(native) => native.name().to_owned(),
            Procedure::Constructor(c) => c.name(),
            Procedure::Predicate(p) => p.name(),
            Procedure::Accessor(a) => a.name(),
            Procedure::Mutator(m) => m.name(),
            Procedure::FieldAccessor(a) => a.name(),
            Procedure::FieldMutator(m) => m.name(),
            Procedure::PropertyPredicate(property) => {
                format!("{}?", property.name())
            }
            Procedure::PropertyAccessor(property) => {
                format!("{}-accessor", property.name())
            }
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Procedure::Native(native) => native.arity(),
            Procedure::Constructor(c) => c.arity(),
            Procedure::Predicate(_)
            | Procedure::FieldAccessor(_)
            | Procedure::PropertyPredicate(_)
            | Procedure::PropertyAccessor(_) => Arity::exactly(1),
            Procedure::Accessor(_) | Procedure::FieldMutator(_) => {
                Arity::exactly(2)
            }
            Procedure::Mutator(_) => Arity::exactly(3),
        }
    }

    fn check_arity(&self, given: usize) -> Result<()> {
        let arity = self.arity();
        if arity.accepts(given) {
            Ok(())
        } else {
            Err(StructError::ArityMismatch {
                procedure: self.name(),
                expected: arity.to_string(),
                given,
            })
        }
    }

    pub fn apply(&self, args: Vec<Value>) -> Result<Step> {
        self.check_arity(args.len())?;
        match self {
            Procedure::Native(native) => Ok(Step::Return(native.invoke(&args)?)),
            Procedure::Constructor(c) => c.construct(args),
            Procedure::Predicate(p) => Ok(Step::value(p.test(&args[0]).into())),
            Procedure::Accessor(a) => {
                let field = field_index(&a.name(), &args[1])?;
                Ok(Step::value(a.access(&args[0], field)?))
            }
            Procedure::Mutator(m) => {
                let field = field_index(&m.name(), &args[1])?;
                m.mutate(&args[0], field, args[2].clone())?;
                Ok(Step::value(Value::Void))
            }
            Procedure::FieldAccessor(a) => Ok(Step::value(a.access(&args[0])?)),
            Procedure::FieldMutator(m) => {
                m.mutate(&args[0], args[1].clone())?;
                Ok(Step::value(Value::Void))
            }
            Procedure::PropertyPredicate(property) => {
                Ok(Step::value(property.is_held_by(&args[0]).into()))
            }
            Procedure::PropertyAccessor(property) => {
                Ok(Step::value(property.value_of(&args[0])?))
            }
        }
    }

    fn identity(&self) -> usize {
        match self {
            Procedure::Native(native) => Arc::as_ptr(native) as *const u8 as usize,
            Procedure::Constructor(c) => c.struct_type().address(),
            Procedure::Predicate(p) => p.struct_type().address(),
            Procedure::Accessor(a) => a.struct_type().address(),
            Procedure::Mutator(m) => m.struct_type().address(),
            Procedure::FieldAccessor(a) => a.struct_type().address() ^ a.field(),
            Procedure::FieldMutator(m) => m.struct_type().address() ^ m.field(),
            Procedure::PropertyPredicate(property)
            | Procedure::PropertyAccessor(property) => {
                Arc::as_ptr(property) as usize
            }
        }
    }
}

fn field_index(procedure: &str, value: &Value) -> Result<usize> {
    value
        .as_index()
        .ok_or_else(|| StructError::contract(procedure, "exact-nonnegative-integer?", value))
}

impl PartialEq for Procedure {
    fn eq(&self, other: &Self) -> bool {
        use Procedure::*;
        match (self, other) {
            (Native(a), Native(b)) => Arc::ptr_eq(a, b),
            (Constructor(a), Constructor(b)) => a.struct_type().ptr_eq(b.struct_type()),
            (Predicate(a), Predicate(b)) => a.struct_type().ptr_eq(b.struct_type()),
            (Accessor(a), Accessor(b)) => a.struct_type().ptr_eq(b.struct_type()),
            (Mutator(a), Mutator(b)) => a.struct_type().ptr_eq(b.struct_type()),
            (FieldAccessor(a), FieldAccessor(b)) => {
                a.struct_type().ptr_eq(b.struct_type()) && a.field() == b.field()
            }
            (FieldMutator(a), FieldMutator(b)) => {
                a.struct_type().ptr_eq(b.struct_type()) && a.field() == b.field()
            }
            (PropertyPredicate(a), PropertyPredicate(b))
            | (PropertyAccessor(a), PropertyAccessor(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Procedure {}

impl Hash for Procedure {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        self.identity().hash(state);
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<procedure:{}>", self.name())
    }
}
