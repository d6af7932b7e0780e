//! Instance construction.
//!
//! A constructor receives the init-field arguments of the whole chain. The
//! exact type's guard (if any) sees all of them plus the type name and may
//! replace them; the leading part then goes to the super type's constructor
//! in "super mode", which answers with the super's complete storage (its
//! auto fields included). This type's own init arguments and auto values
//! are appended behind it, which yields exactly the layout
//! [`StructType::offset_of`] describes.

use std::{fmt, sync::Arc};

use crate::{
    Arity, Continuation, Procedure, Resume, Step, StructError, StructInstance,
    StructType, Value, error::Result,
};

#[derive(Clone)]
pub struct Constructor(Arc<StructType>);

impl Constructor {
    pub(crate) fn new(struct_type: Arc<StructType>) -> Self {
        Self(struct_type)
    }

    #[inline]
    pub fn struct_type(&self) -> &Arc<StructType> {
        &self.0
    }

    pub fn name(&self) -> String {
        self.0.constructor_name().to_string()
    }

    pub fn arity(&self) -> Arity {
        Arity::exactly(self.0.constructor_arity())
    }

    /// First step of building an instance from constructor arguments. The
    /// step suspends once per guard along the chain.
    pub fn construct(&self, args: Vec<Value>) -> Result<Step> {
        let expected = self.0.constructor_arity();
        if args.len() != expected {
            return Err(StructError::ArityMismatch {
                procedure: self.name(),
                expected: expected.to_string(),
                given: args.len(),
            });
        }
        build(self.0.clone(), args, false)
    }
}

impl From<Constructor> for Value {
    fn from(value: Constructor) -> Self {
        Value::Procedure(Procedure::Constructor(value))
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<procedure:{}>", self.name())
    }
}

fn build(ty: Arc<StructType>, args: Vec<Value>, as_super: bool) -> Result<Step> {
    let Some(guard) = ty.guard().cloned() else {
        return assemble(ty, args, as_super);
    };
    log::trace!("running constructor guard of {}", ty.name());
    let mut guard_args = Vec::with_capacity(args.len() + 1);
    guard_args.extend(args.iter().cloned());
    guard_args.push(Value::Symbol(ty.name().clone()));
    Ok(Step::call(
        guard,
        guard_args,
        GuardChecked {
            ty,
            args,
            as_super,
        },
    ))
}

/// Resumes construction with the guard's replacement arguments.
struct GuardChecked {
    ty: Arc<StructType>,
    args: Vec<Value>,
    as_super: bool,
}

impl Resume for GuardChecked {
    fn resume(self: Box<Self>, results: Vec<Value>) -> Result<Step> {
        let GuardChecked { ty, args, as_super } = *self;
        let args = if results.is_empty() {
            args
        } else if results.len() == args.len() {
            results
        } else {
            return Err(StructError::ResultCount {
                context: format!("{} guard", ty.name()),
                expected: args.len(),
                given: results.len(),
            });
        };
        assemble(ty, args, as_super)
    }
}

fn assemble(ty: Arc<StructType>, mut args: Vec<Value>, as_super: bool) -> Result<Step> {
    let Some(super_type) = ty.super_type().cloned() else {
        return finish(ty, args, as_super);
    };
    let own = args.split_off(args.len() - ty.init_field_count());
    let next: Continuation = Box::new(move |mut storage: Vec<Value>| -> Result<Step> {
        storage.extend(own);
        finish(ty, storage, as_super)
    });
    build(super_type, args, true)?.and_then(next)
}

fn finish(ty: Arc<StructType>, mut storage: Vec<Value>, as_super: bool) -> Result<Step> {
    storage.extend_from_slice(ty.auto_values());
    if as_super {
        return Ok(Step::Return(storage));
    }
    Ok(Step::value(Value::Struct(StructInstance::make(ty, storage)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DirectHost, Host, NativeProcedure, StructTypeDescriptor};

    fn ty(desc: StructTypeDescriptor) -> Arc<StructType> {
        let ty = StructType::skeleton(&desc).unwrap();
        ty.publish(Default::default());
        ty
    }

    fn construct(ty: &Arc<StructType>, args: Vec<Value>) -> Result<Arc<StructInstance>> {
        let results = DirectHost.run(ty.constructor().construct(args)?)?;
        match results.as_slice() {
            [Value::Struct(instance)] => Ok(instance.clone()),
            _ => panic!("constructor must return one instance"),
        }
    }

    #[test]
    fn auto_fields_land_behind_each_level() {
        let mut a = StructTypeDescriptor::new("a", None, 1, 1);
        a.auto_value = Value::symbol("a-auto");
        let a = ty(a);
        let mut b = StructTypeDescriptor::new("b", Some(a.clone()), 1, 2);
        b.auto_value = Value::symbol("b-auto");
        let b = ty(b);
        let c = ty(StructTypeDescriptor::new("c", Some(b.clone()), 2, 0));

        let instance =
            construct(&c, vec![Value::Fixnum(1), Value::Fixnum(2), Value::Fixnum(3), Value::Fixnum(4)])
                .unwrap();
        assert_eq!(
            instance.values(),
            vec![
                Value::Fixnum(1),
                Value::symbol("a-auto"),
                Value::Fixnum(2),
                Value::symbol("b-auto"),
                Value::symbol("b-auto"),
                Value::Fixnum(3),
                Value::Fixnum(4),
            ]
        );
        assert_eq!(instance.get(&b, 0), Ok(Value::Fixnum(2)));
        assert_eq!(instance.get(&c, 1), Ok(Value::Fixnum(4)));
    }

    #[test]
    fn guards_run_subtype_first_and_may_replace_arguments() {
        let double = NativeProcedure::value("double", Arity::at_least(1), |args| {
            let (name, fields) = args.split_last().unwrap();
            assert!(matches!(name, Value::Symbol(_)));
            Ok(fields
                .iter()
                .map(|v| Value::Fixnum(v.as_fixnum().unwrap() * 2))
                .collect())
        });
        let mut base = StructTypeDescriptor::new("base", None, 1, 0);
        base.guard = Some(double.clone());
        let base = ty(base);
        let mut derived = StructTypeDescriptor::new("derived", Some(base.clone()), 1, 0);
        derived.guard = Some(double);
        let derived = ty(derived);

        let instance = construct(&derived, vec![Value::Fixnum(1), Value::Fixnum(5)]).unwrap();
        // base field passes both guards, derived field only its own
        assert_eq!(instance.values(), vec![Value::Fixnum(4), Value::Fixnum(10)]);
    }

    #[test]
    fn guard_returning_wrong_count_fails_without_instance() {
        let bad = NativeProcedure::value("bad", Arity::at_least(0), |_| {
            Ok(vec![Value::Void, Value::Void, Value::Void])
        });
        let mut desc = StructTypeDescriptor::new("p", None, 1, 0);
        desc.guard = Some(bad);
        let p = ty(desc);
        assert!(matches!(
            construct(&p, vec![Value::Fixnum(1)]),
            Err(StructError::ResultCount { expected: 1, given: 3, .. })
        ));
    }

    #[test]
    fn wrong_argument_count_is_an_arity_error() {
        let point = ty(StructTypeDescriptor::new("point", None, 2, 0));
        assert!(matches!(
            point.constructor().construct(vec![Value::Fixnum(1)]),
            Err(StructError::ArityMismatch { given: 1, .. })
        ));
    }
}
