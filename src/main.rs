//! End-to-end walk through the winrt-bind crates
//!
//! 1. Load a type catalog (a directory of JSON records given on the command
//!    line, or the bundled foundation catalog)
//! 2. Run the generation pass: projections, identifiers and vtable slots
//! 3. Project `EventHandler<Int32>` by hand, back it with a Rust closure and
//!    call it through its vtable
//!
//! Set `RUST_LOG=debug` to follow the projection closure round by round.

use std::error::Error;

use indexmap::IndexMap;
use log::info;
use winrt_abi::{ComObject, Runtime, Value};
use winrt_projection::{
    Catalog, GenerationOptions, IdentifierGenerator, Resolver, TypeReference, generate, project,
};

const BUNDLED_CATALOG: &str =
    include_str!("../crates/winrt-projection/tests/fixtures/foundation.json");

fn load_catalog() -> Result<Catalog, Box<dyn Error>> {
    match std::env::args().nth(1) {
        Some(dir) => {
            info!("loading catalog from {dir}");
            Ok(Catalog::load_dir(dir)?)
        }
        None => Ok(Catalog::from_json_str(BUNDLED_CATALOG)?),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    // =========================================================================
    // Generation pass
    // =========================================================================

    let catalog = load_catalog()?;
    println!("catalog: {} entities", catalog.len());

    let output = generate(&catalog, &GenerationOptions::default())?;
    println!();
    println!("{} projections in {} rounds:", output.projections.len(), output.rounds);
    for projection in &output.projections {
        println!("  {:<42} {}", projection.entity.name(), projection.iid);
        println!("  {:<42} {}", "", projection.signature);
    }

    println!();
    println!("concrete entities:");
    for entity in &output.entities {
        match entity.iid {
            Some(iid) => println!("  {:<42} {iid}", entity.full_name()),
            None => println!("  {:<42} -", entity.full_name()),
        }
        for method in &entity.methods {
            println!("    [{:>2}] {}", method.slot, method.name);
        }
    }
    for failure in &output.failures {
        println!("  dropped {}: {}", failure.name, failure.error);
    }

    // =========================================================================
    // A native delegate for a projected handler
    // =========================================================================

    let Some(handler) = catalog.get("Windows.Foundation", "EventHandler`1") else {
        println!();
        println!("catalog has no EventHandler`1, skipping the delegate walk");
        return Ok(());
    };

    let int32 = TypeReference::system("Int32");
    let projected = project(handler, &IndexMap::from([("T".to_string(), int32.clone())]))?;
    let ids = IdentifierGenerator::new(Resolver::new(&catalog));
    let reference = TypeReference::generic("Windows.Foundation", "EventHandler`1", [int32]);
    let iid = ids.identifier(&reference)?;
    let Some(invoke) = projected.methods().into_iter().next() else {
        return Ok(());
    };
    let signature = ids.abi_signature(&invoke)?;

    println!();
    println!("{} {iid}", projected.name());

    let runtime = Runtime::in_process();
    let delegate = runtime.create_delegate(iid, signature.clone(), |args| {
        let sender = match &args[0] {
            Value::Object(object) if object.is_bound() => "an object",
            _ => "nobody",
        };
        println!("  handler called by {sender} with {:?}", args[1]);
        Ok(Value::Unit)
    })?;

    // SAFETY: the delegate outlives the handle
    let object = unsafe { delegate.to_object() };
    for value in [7, 42] {
        runtime.invoke_delegate(
            &object,
            &signature,
            &mut [Value::Object(ComObject::unbound()), Value::I32(value)],
        )?;
    }
    drop(object);
    println!("  references left: {}", delegate.ref_count());

    Ok(())
}
