use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{
    InternedId, InternedStrings, Procedure, StructError, StructInstance,
    StructProperty, StructType, error::Result,
};

/// An interned symbol. Equality is id equality.
#[derive(Clone)]
pub struct Symbol {
    id: InternedId,
    name: Arc<str>,
}

impl Symbol {
    pub fn intern(name: &str) -> Self {
        let (id, name) = InternedStrings::global().add(name);
        Self { id, name }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn id(&self) -> InternedId {
        self.id
    }
}

impl PartialEq for Symbol {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}", self.name)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self::intern(value)
    }
}

/// A mutable box around a field value. Every holder of a clone observes the
/// same writes.
#[derive(Clone)]
pub struct Cell(Arc<Mutex<Value>>);

impl Cell {
    pub fn new(value: Value) -> Self {
        Self(Arc::new(Mutex::new(value)))
    }

    #[inline]
    pub fn get(&self) -> Value {
        self.0.lock().clone()
    }

    #[inline]
    pub fn set(&self, value: Value) {
        *self.0.lock() = value;
    }

    pub fn ptr_eq(&self, other: &Cell) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cell").field(&*self.0.lock()).finish()
    }
}

/// Accepted argument counts of a procedure: `min..=max`, unbounded when
/// `max` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    pub const fn exactly(n: usize) -> Self {
        Self {
            min: n,
            max: Some(n),
        }
    }

    pub const fn at_least(n: usize) -> Self {
        Self { min: n, max: None }
    }

    #[inline]
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min && self.max.is_none_or(|max| count <= max)
    }

    /// The arity seen by callers once an implicit first argument is supplied.
    pub fn drop_first(self) -> Self {
        Self {
            min: self.min.saturating_sub(1),
            max: self.max.map(|max| max.saturating_sub(1)),
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{}", self.min),
            Some(max) => write!(f, "{} to {}", self.min, max),
            None => write!(f, "at least {}", self.min),
        }
    }
}

/// Dynamic values as far as struct fields, property values and printed
/// keys need them.
#[derive(Clone)]
pub enum Value {
    Void,
    Bool(bool),
    Fixnum(i64),
    Symbol(Symbol),
    String(Arc<str>),
    List(Arc<[Value]>),
    Vector(Arc<[Value]>),
    Procedure(Procedure),
    Struct(Arc<StructInstance>),
    StructType(Arc<StructType>),
    Property(Arc<StructProperty>),
}

impl Value {
    pub const FALSE: Value = Value::Bool(false);
    pub const TRUE: Value = Value::Bool(true);

    pub fn null() -> Self {
        Value::List(Arc::from(Vec::new()))
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }

    pub fn vector(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Vector(items.into_iter().collect())
    }

    pub fn symbol(name: &str) -> Self {
        Value::Symbol(Symbol::intern(name))
    }

    pub fn string(text: &str) -> Self {
        Value::String(Arc::from(text))
    }

    #[inline]
    pub fn is_false(&self) -> bool {
        matches!(self, Value::Bool(false))
    }

    pub fn as_fixnum(&self) -> Option<i64> {
        match self {
            Value::Fixnum(n) => Some(*n),
            _ => None,
        }
    }

    /// A non-negative fixnum, as used for field indices and counts.
    pub fn as_index(&self) -> Option<usize> {
        self.as_fixnum().and_then(|n| usize::try_from(n).ok())
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Value::Symbol(symbol) => Some(symbol),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Arc<StructInstance>> {
        match self {
            Value::Struct(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        match self {
            Value::Procedure(_) => true,
            Value::Struct(instance) => instance.is_callable(),
            _ => false,
        }
    }

    /// Arity if statically known. Structs whose procedure lives in a field
    /// only know it once the field is read.
    pub fn arity(&self) -> Option<Arity> {
        match self {
            Value::Procedure(procedure) => Some(procedure.arity()),
            Value::Struct(instance) => instance.arity(),
            _ => None,
        }
    }

    /// Starts applying this value to `args`, returning the first step.
    pub fn apply(&self, args: Vec<Value>) -> Result<crate::Step> {
        match self {
            Value::Procedure(procedure) => procedure.apply(args),
            Value::Struct(instance) if instance.is_callable() => {
                instance.call(args)
            }
            other => Err(StructError::NotCallable {
                value: other.to_string(),
            }),
        }
    }

    fn address(&self) -> usize {
        match self {
            Value::Struct(instance) => Arc::as_ptr(instance) as usize,
            Value::StructType(ty) => Arc::as_ptr(ty) as usize,
            Value::Property(property) => Arc::as_ptr(property) as usize,
            _ => 0,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Void, Void) => true,
            (Bool(a), Bool(b)) => a == b,
            (Fixnum(a), Fixnum(b)) => a == b,
            (Symbol(a), Symbol(b)) => a == b,
            (String(a), String(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Vector(a), Vector(b)) => a == b,
            (Procedure(a), Procedure(b)) => a == b,
            (Struct(a), Struct(b)) => Arc::ptr_eq(a, b),
            (StructType(a), StructType(b)) => Arc::ptr_eq(a, b),
            (Property(a), Property(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Void => {}
            Value::Bool(b) => b.hash(state),
            Value::Fixnum(n) => n.hash(state),
            Value::Symbol(symbol) => symbol.hash(state),
            Value::String(text) => text.hash(state),
            Value::List(items) | Value::Vector(items) => items.hash(state),
            Value::Procedure(procedure) => procedure.hash(state),
            Value::Struct(_) | Value::StructType(_) | Value::Property(_) => {
                self.address().hash(state)
            }
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Fixnum(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Symbol> for Value {
    fn from(value: Symbol) -> Self {
        Value::Symbol(value)
    }
}

impl From<Procedure> for Value {
    fn from(value: Procedure) -> Self {
        Value::Procedure(value)
    }
}

fn write_sequence(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    items: &[Value],
) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(")")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("#<void>"),
            Value::Bool(true) => f.write_str("#t"),
            Value::Bool(false) => f.write_str("#f"),
            Value::Fixnum(n) => write!(f, "{n}"),
            Value::Symbol(symbol) => write!(f, "{symbol}"),
            Value::String(text) => write!(f, "{text:?}"),
            Value::List(items) => write_sequence(f, "(", items),
            Value::Vector(items) => write_sequence(f, "#(", items),
            Value::Procedure(procedure) => {
                write!(f, "#<procedure:{}>", procedure.name())
            }
            Value::Struct(instance) => write!(f, "{instance}"),
            Value::StructType(ty) => {
                write!(f, "#<struct-type:{}>", ty.name())
            }
            Value::Property(property) => {
                write!(f, "#<struct-type-property:{}>", property.name())
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
