#![forbid(unsafe_code)]

//! Reference scenario: move, undo, redo, transactions and a deferred layout.
//!
//! Run with `RUST_LOG=commander=debug` to see the dispatch pipeline.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use commander_harness::{
    DisplayQuery, MoveCommand, Moveable, Point, ShapeHandle, UpdateTitleCommand, Vector,
    layout_command,
};
use commander_runtime::{Engine, EngineConfig, Invocation, TextSink};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() -> Result<(), Box<dyn Error>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut engine = Engine::new(EngineConfig::default())?;
    let log = TextSink::new();
    engine.logger().set_sink(log.clone());

    let shape = ShapeHandle::with_title("square");
    let step = Vector::new(10.0, 5.0);
    engine.invoke(Arc::new(MoveCommand::new(shape.as_moveable(), step)));
    engine.invoke(Arc::new(MoveCommand::new(shape.as_moveable(), step)));
    tracing::info!(center = %shape.center(), "moved twice");

    engine.undo(1)?;
    tracing::info!(center = %shape.center(), "after undo");
    engine.redo(1)?;
    tracing::info!(center = %shape.center(), "after redo");

    engine.dispatcher().with_transaction(|d| {
        d.invoke(Arc::new(UpdateTitleCommand::new(shape.as_displayable(), "renamed")));
        d.invoke(Arc::new(MoveCommand::to_target(shape.as_moveable(), Point::ZERO)));
    });
    tracing::info!(%shape, "transaction applied");
    engine.undo(1)?;
    tracing::info!(%shape, "transaction undone");

    let shapes: Vec<ShapeHandle> = (0..10)
        .map(|index| ShapeHandle::with_title(&format!("#{index}")))
        .collect();
    let moveables = shapes.iter().map(ShapeHandle::as_moveable).collect();
    let layout = layout_command(moveables, Point::ZERO, engine.queue_handle());
    engine.invoke(Arc::new(layout));
    if !engine.queue().wait_idle(Duration::from_secs(5)) {
        tracing::warn!("layout did not settle in time");
    }
    for shape in &shapes {
        tracing::info!(%shape, "after layout");
    }
    engine.undo(1)?;
    tracing::info!(
        all_at_origin = shapes.iter().all(|shape| shape.center() == Point::ZERO),
        "layout undone"
    );

    let display_output = TextSink::new();
    engine.invoke(Invocation::query(Arc::new(DisplayQuery::new(
        shape.as_displayable(),
        display_output.clone(),
    ))));

    print!("{}", display_output.contents());
    println!("--- dispatch log ---");
    print!("{}", log.contents());
    println!("--- undo history ---");
    for description in engine.undo_manager().undo_descriptions(usize::MAX) {
        println!("{description}");
    }
    Ok(())
}
