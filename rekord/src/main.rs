use clap::{Parser, ValueEnum};
use std::process;

use rekord::{
    Arity, DirectHost, Host, Inspector, NativeProcedure, Runtime, RuntimeCreateInfo, StructError,
    StructProperty, StructTypeDescriptor, Symbol, Value,
    shape::{CachingMapId, CachingMapTable, CompositeMapTable, MapId, MapTable, ShapeError},
};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Demo {
    Points,
    Prefab,
    Properties,
    Shapes,
    All,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Scenario to run
    #[arg(long, value_enum, default_value_t = Demo::All)]
    demo: Demo,

    /// More log output, repeatable
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn demo_points(runtime: &Runtime) -> Result<(), StructError> {
    let point = runtime.define_struct_type(
        StructTypeDescriptor::new("point", None, 2, 0),
        &mut DirectHost,
    )?;
    let point3d = runtime.define_struct_type(
        StructTypeDescriptor::new("point3d", Some(point.struct_type.clone()), 1, 0),
        &mut DirectHost,
    )?;

    let p = DirectHost.run(
        point3d
            .constructor
            .construct(vec![Value::Fixnum(3), Value::Fixnum(4), Value::Fixnum(5)])?,
    )?;
    let p = rekord::single_value("make-point3d", p)?;
    let x = point.accessor.field(0, Some(Symbol::intern("x")))?;
    let z = point3d.accessor.field(0, Some(Symbol::intern("z")))?;

    println!("{p}");
    println!("  {} => {}", x.name(), x.access(&p)?);
    println!("  {} => {}", z.name(), z.access(&p)?);
    println!("  point? => {}", point.predicate.test(&p));

    point.mutator.mutate(&p, 1, Value::Fixnum(40))?;
    println!("  after point-set! => {p}");
    Ok(())
}

fn demo_prefab(runtime: &Runtime) -> Result<(), StructError> {
    let mut desc = StructTypeDescriptor::new("pair", None, 2, 0);
    desc.inspector = Inspector::Prefab;
    desc.immutables = vec![0, 1];
    let a = runtime.define_struct_type(desc.clone(), &mut DirectHost)?;
    let b = runtime.define_struct_type(desc, &mut DirectHost)?;

    let literal = runtime.make_prefab_struct(
        &Value::symbol("pair"),
        vec![Value::Fixnum(1), Value::Fixnum(2)],
    )?;
    println!("{literal}");
    println!(
        "  definitions share a type => {}",
        a.struct_type.ptr_eq(&b.struct_type)
    );
    println!(
        "  literal shares it too => {}",
        literal.struct_type().ptr_eq(&a.struct_type)
    );
    if let Some(key) = runtime.prefab_key_of(&a.struct_type) {
        println!("  key => {}", key.to_datum());
    }
    Ok(())
}

fn demo_properties(runtime: &Runtime) -> Result<(), StructError> {
    let upcase = NativeProcedure::value("upcase-guard", Arity::exactly(2), |args| match &args[0] {
        Value::String(text) => Ok(vec![Value::string(&text.to_uppercase())]),
        other => Err(StructError::contract("upcase-guard", "string?", other)),
    });
    let (label, _, label_ref) = StructProperty::make("prop:label", Some(upcase), vec![], false);

    let mut desc = StructTypeDescriptor::new("widget", None, 1, 0);
    desc.properties = vec![(label, Value::string("button"))];
    desc.proc_spec = Some(NativeProcedure::value("widget-call", Arity::exactly(2), |args| {
        Ok(vec![Value::list(args.iter().cloned())])
    }));
    let widget = runtime.define_struct_type(desc, &mut DirectHost)?;

    let w = DirectHost.run(widget.constructor.construct(vec![Value::Fixnum(7)])?)?;
    let w = rekord::single_value("make-widget", w)?;
    let label = DirectHost.run(label_ref.apply(vec![w.clone()])?)?;
    let called = DirectHost.apply(&w, vec![Value::symbol("click")])?;
    println!("{w}");
    println!("  prop:label => {}", Value::list(label));
    println!("  (w 'click) => {}", Value::list(called));
    Ok(())
}

fn shapes() -> Result<(), ShapeError> {
    let layouts = MapTable::new();
    let handlers: CachingMapTable<Symbol, Value> = CachingMapTable::new();
    let composites = CompositeMapTable::new();

    let ab = layouts.path(["a", "b"])?;
    let again = layouts.extend(MapId::EMPTY, "a").and_then(|a| layouts.extend(a, "b"))?;
    let ba = layouts.path(["b", "a"])?;
    println!("a.b == a.b => {}", ab == again);
    println!("a.b == b.a => {}", ab == ba);

    let get = Symbol::intern("get");
    let set = Symbol::intern("set");
    let one = handlers
        .extend_static(CachingMapId::EMPTY, get.clone(), Value::TRUE)
        .and_then(|m| handlers.extend_dynamic(m, set.clone()))?;
    let two = handlers
        .extend_dynamic(CachingMapId::EMPTY, set)
        .and_then(|m| handlers.extend_static(m, get, Value::FALSE))?;
    println!("same handler shape => {}", handlers.has_same_shape(one, two));

    let c1 = composites.instantiate((ab, one));
    let c2 = composites.instantiate((again, one));
    println!("composites shared => {}", c1 == c2);
    Ok(())
}

fn demo_shapes() -> Result<(), StructError> {
    if let Err(err) = shapes() {
        eprintln!("shape error: {err}");
    }
    Ok(())
}

fn run(demo: Demo, runtime: &Runtime) -> Result<(), StructError> {
    match demo {
        Demo::Points => demo_points(runtime),
        Demo::Prefab => demo_prefab(runtime),
        Demo::Properties => demo_properties(runtime),
        Demo::Shapes => demo_shapes(),
        Demo::All => {
            for demo in [Demo::Points, Demo::Prefab, Demo::Properties, Demo::Shapes] {
                println!("== {demo:?} ==");
                run(demo, runtime)?;
            }
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => None,
        1 => Some(log::LevelFilter::Debug),
        _ => Some(log::LevelFilter::Trace),
    };
    let mut logger = env_logger::Builder::from_default_env();
    if let Some(level) = level {
        logger.filter_level(level);
    }
    logger.init();

    let runtime = Runtime::new(RuntimeCreateInfo {
        prefab_capacity: Some(16),
        ..Default::default()
    });

    if let Err(err) = run(cli.demo, &runtime) {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}
