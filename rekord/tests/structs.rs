use std::sync::Arc;

use rekord::{
    Arity, DirectHost, Host, Inspector, NativeProcedure, PROP_ARITY_STRING, Runtime,
    StructError, StructProperty, StructTypeDefinition, StructTypeDescriptor, Value,
    shape::{CachingMapId, CachingMapTable, MapId, MapTable},
};

fn define(runtime: &Runtime, desc: StructTypeDescriptor) -> StructTypeDefinition {
    runtime.define_struct_type(desc, &mut DirectHost).unwrap()
}

fn construct(def: &StructTypeDefinition, args: &[i64]) -> Value {
    let args = args.iter().copied().map(Value::Fixnum).collect();
    let results = DirectHost.run(def.constructor.construct(args).unwrap()).unwrap();
    rekord::single_value("constructor", results).unwrap()
}

fn call(procedure: &Value, args: Vec<Value>) -> Result<Vec<Value>, StructError> {
    DirectHost.apply(procedure, args)
}

#[test]
fn point_accessors_and_predicate() {
    let runtime = Runtime::default();
    let point = define(&runtime, StructTypeDescriptor::new("point", None, 2, 0));
    let other = define(&runtime, StructTypeDescriptor::new("other", None, 0, 0));

    let p = construct(&point, &[3, 4]);
    let accessor: Value = point.accessor.clone().into();
    let predicate: Value = point.predicate.clone().into();

    assert_eq!(call(&accessor, vec![p.clone(), Value::Fixnum(0)]), Ok(vec![Value::Fixnum(3)]));
    assert_eq!(call(&accessor, vec![p.clone(), Value::Fixnum(1)]), Ok(vec![Value::Fixnum(4)]));
    assert_eq!(call(&predicate, vec![p]), Ok(vec![Value::TRUE]));
    assert_eq!(call(&predicate, vec![construct(&other, &[])]), Ok(vec![Value::FALSE]));
}

#[test]
fn point3d_layout() {
    let runtime = Runtime::default();
    let point = define(&runtime, StructTypeDescriptor::new("point", None, 2, 0));
    let point3d = define(
        &runtime,
        StructTypeDescriptor::new("point3d", Some(point.struct_type.clone()), 1, 0),
    );
    let ty = &point3d.struct_type;
    assert_eq!(ty.offset_of(&point.struct_type), Some(0));
    assert_eq!(ty.offset_of(ty), Some(2));
    assert_eq!(
        ty.total_field_count(),
        point.struct_type.total_field_count() + 1
    );

    let p = construct(&point3d, &[3, 4, 5]);
    assert_eq!(point3d.accessor.access(&p, 0), Ok(Value::Fixnum(5)));
    assert_eq!(point.accessor.access(&p, 1), Ok(Value::Fixnum(4)));
    assert!(point.predicate.test(&p));

    let flat = construct(&point, &[1, 2]);
    assert!(matches!(
        point3d.accessor.access(&flat, 0),
        Err(StructError::UnboundFieldOffset { .. })
    ));
}

#[test]
fn guarded_property_keeps_the_guard_result() {
    let runtime = Runtime::default();
    let guard = NativeProcedure::value("negate", Arity::exactly(2), |args| {
        Ok(vec![Value::Fixnum(-args[0].as_fixnum().unwrap_or(0))])
    });
    let (prop, prop_p, prop_ref) = StructProperty::make("prop:weight", Some(guard), vec![], false);
    let mut desc = StructTypeDescriptor::new("box", None, 1, 0);
    desc.properties = vec![(prop.clone(), Value::Fixnum(5))];
    let def = define(&runtime, desc);

    assert_eq!(def.struct_type.property_value(&prop), Some(&Value::Fixnum(-5)));
    let b = construct(&def, &[0]);
    assert_eq!(call(&prop_p.into(), vec![b.clone()]), Ok(vec![Value::TRUE]));
    assert_eq!(call(&prop_ref.into(), vec![b]), Ok(vec![Value::Fixnum(-5)]));
}

#[test]
fn prefab_paths_agree() {
    let runtime = Runtime::default();
    let mut desc = StructTypeDescriptor::new("cell", None, 2, 1);
    desc.inspector = Inspector::Prefab;
    desc.auto_value = Value::Fixnum(0);
    desc.immutables = vec![0];

    let a = define(&runtime, desc.clone());
    let b = define(&runtime, desc);
    assert!(Arc::ptr_eq(&a.struct_type, &b.struct_type));

    let key = runtime.prefab_key_of(&a.struct_type).unwrap();
    assert_eq!(key.to_datum().to_string(), "(cell 2 (1 0) #(1))");
    let from_key = runtime.prefab_key_to_type(&key.to_datum(), 0).unwrap();
    assert!(Arc::ptr_eq(&a.struct_type, &from_key));

    let literal = runtime
        .make_prefab_struct(
            &key.to_short_datum(),
            vec![Value::Fixnum(1), Value::Fixnum(2), Value::Fixnum(0)],
        )
        .unwrap();
    assert!(Arc::ptr_eq(literal.struct_type(), &a.struct_type));
    assert_eq!(literal.to_string(), "#s((cell (1 0) #(1)) 1 2 0)");
}

#[test]
fn mutation_is_shared_by_every_holder() {
    let runtime = Runtime::default();
    let mut desc = StructTypeDescriptor::new("counter", None, 1, 1);
    desc.auto_value = Value::symbol("fresh");
    let counter = define(&runtime, desc);

    let c = construct(&counter, &[0]);
    let alias = c.clone();
    assert_eq!(counter.accessor.access(&c, 1), Ok(Value::symbol("fresh")));

    counter.mutator.mutate(&c, 0, Value::Fixnum(1)).unwrap();
    assert_eq!(counter.accessor.access(&alias, 0), Ok(Value::Fixnum(1)));

    let cell = c.as_struct().unwrap().cell(&counter.struct_type, 0).unwrap();
    counter.mutator.mutate(&alias, 0, Value::Fixnum(2)).unwrap();
    assert_eq!(cell.get(), Value::Fixnum(2));
}

#[test]
fn applicable_struct_reports_custom_arity() {
    let runtime = Runtime::default();
    let render = NativeProcedure::value("render", Arity::exactly(1), |_| {
        Ok(vec![Value::string("exactly one thing")])
    });
    let mut desc = StructTypeDescriptor::new("adder", None, 1, 0);
    desc.proc_spec = Some(Value::Fixnum(0));
    desc.properties = vec![(PROP_ARITY_STRING.clone(), render)];
    let adder = define(&runtime, desc);

    let add1 = NativeProcedure::value("add1", Arity::exactly(1), |args| {
        Ok(vec![Value::Fixnum(args[0].as_fixnum().unwrap_or(0) + 1)])
    });
    let results = DirectHost
        .run(adder.constructor.construct(vec![add1]).unwrap())
        .unwrap();
    let a = rekord::single_value("make-adder", results).unwrap();

    assert_eq!(call(&a, vec![Value::Fixnum(41)]), Ok(vec![Value::Fixnum(42)]));
    assert_eq!(
        call(&a, vec![]),
        Err(StructError::ArityMismatch {
            procedure: "adder".into(),
            expected: "exactly one thing".into(),
            given: 0,
        })
    );
    // the procedure field is implicitly immutable
    assert!(matches!(
        adder.mutator.mutate(&a, 0, Value::Void),
        Err(StructError::ImmutableField { .. })
    ));
}

#[test]
fn shapes_converge_and_compare() {
    let maps = MapTable::new();
    let first = maps.path(["a", "b"]).unwrap();
    let second = maps.extend(MapId::EMPTY, "a").and_then(|a| maps.extend(a, "b")).unwrap();
    let swapped = maps.path(["b", "a"]).unwrap();
    assert_eq!(first, second);
    assert_ne!(first, swapped);

    let caching: CachingMapTable<&str, i64> = CachingMapTable::new();
    let x = caching
        .extend_dynamic(CachingMapId::EMPTY, "a")
        .and_then(|m| caching.extend_dynamic(m, "b"))
        .unwrap();
    let y = caching
        .extend_dynamic(CachingMapId::EMPTY, "b")
        .and_then(|m| caching.extend_dynamic(m, "a"))
        .unwrap();
    assert!(caching.has_same_shape(x, x));
    assert_eq!(caching.has_same_shape(x, y), caching.has_same_shape(y, x));
    assert!(caching.has_same_shape(x, y));
}

fn add1() -> Value {
    NativeProcedure::value("add1", Arity::exactly(1), |args| {
        Ok(vec![Value::Fixnum(args[0].as_fixnum().unwrap_or(0) + 1)])
    })
}

#[test]
fn literal_procedure_receives_the_instance_first() {
    let runtime = Runtime::default();
    let echo = NativeProcedure::value("echo", Arity::exactly(2), |args| {
        Ok(vec![Value::list(args.iter().cloned())])
    });
    let mut desc = StructTypeDescriptor::new("widget", None, 1, 0);
    desc.proc_spec = Some(echo);
    let widget = define(&runtime, desc);

    let w = construct(&widget, &[7]);
    assert_eq!(w.arity(), Some(Arity::exactly(1)));
    let results = call(&w, vec![Value::symbol("x")]).unwrap();
    assert_eq!(results, vec![Value::list([w.clone(), Value::symbol("x")])]);
    assert_eq!(results[0].to_string(), "((widget 7) x)");
}

#[test]
fn arity_error_hides_the_implicit_instance() {
    let runtime = Runtime::default();
    let echo = NativeProcedure::value("echo", Arity::exactly(2), |args| Ok(args.to_vec()));
    let mut desc = StructTypeDescriptor::new("widget", None, 0, 0);
    desc.proc_spec = Some(echo);
    let widget = define(&runtime, desc);

    let w = construct(&widget, &[]);
    assert_eq!(
        call(&w, vec![]),
        Err(StructError::ArityMismatch {
            procedure: "widget".into(),
            expected: "1".into(),
            given: 0,
        })
    );
}

#[test]
fn field_procedure_without_arity_string_reports_its_arity() {
    let runtime = Runtime::default();
    let mut desc = StructTypeDescriptor::new("adder", None, 1, 0);
    desc.proc_spec = Some(Value::Fixnum(0));
    let adder = define(&runtime, desc);

    let results = DirectHost
        .run(adder.constructor.construct(vec![add1()]).unwrap())
        .unwrap();
    let a = rekord::single_value("make-adder", results).unwrap();
    assert_eq!(
        call(&a, vec![Value::Fixnum(1), Value::Fixnum(2)]),
        Err(StructError::ArityMismatch {
            procedure: "adder".into(),
            expected: "1".into(),
            given: 2,
        })
    );
}

#[test]
fn subtype_calls_the_procedure_field_of_its_super() {
    let runtime = Runtime::default();
    let mut base = StructTypeDescriptor::new("base", None, 2, 0);
    base.proc_spec = Some(Value::Fixnum(1));
    let base = define(&runtime, base);
    let sub = define(
        &runtime,
        StructTypeDescriptor::new("sub", Some(base.struct_type.clone()), 2, 0),
    );

    let negate = NativeProcedure::value("negate", Arity::exactly(1), |args| {
        Ok(vec![Value::Fixnum(-args[0].as_fixnum().unwrap_or(0))])
    });
    // own field 1 of sub holds a different procedure; only base's field 1
    // is designated
    let args = vec![Value::Void, add1(), Value::Void, negate];
    let results = DirectHost.run(sub.constructor.construct(args).unwrap()).unwrap();
    let s = rekord::single_value("make-sub", results).unwrap();

    assert!(s.is_callable());
    assert_eq!(call(&s, vec![Value::Fixnum(41)]), Ok(vec![Value::Fixnum(42)]));
}
