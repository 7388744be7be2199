//! Batched Example - Coalescing bursts until the next frame
//!
//! Several mutation bursts arrive between two frames. With batching enabled
//! they are diffed together, so a marker removed in one burst and re-added in
//! the next is reported as a change, not a remove plus an add.
//!
//! Run with: RUST_LOG=keyed_sync=debug cargo run --example batched

use keyed_sync::tree::{deliver_mutations, Node};
use keyed_sync::{frame, Options, Reconciler};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    println!("=== keyed-sync Batched Example ===\n");

    let root = Node::element("div");
    let options = Options::from_json(r#"{"key": "data-id", "watch": ["data-color"], "batch": true}"#)?;
    let reconciler = Reconciler::create(&root, options)?;

    reconciler.on("add", |event| {
        println!("  add    {:?}", event.entries().iter().map(|e| &e.key).collect::<Vec<_>>());
        Ok(())
    })?;
    reconciler.on("remove", |event| {
        println!("  remove {:?}", event.entries().iter().map(|e| &e.key).collect::<Vec<_>>());
        Ok(())
    })?;
    reconciler.on("change", |event| {
        for change in event.changes() {
            println!("  change {} {:?} -> {:?}", change.key, change.from, change.to);
        }
        Ok(())
    })?;

    let marker = Node::element("span")
        .with_attribute("data-id", "a")
        .with_attribute("data-color", "red");
    root.append_child(&marker)?;
    root.append_child(&Node::element("span").with_attribute("data-id", "b"))?;
    deliver_mutations();
    println!("frame 1 ({} bursts pending):", reconciler.pending_bursts());
    frame::run_frame();

    marker.remove();
    deliver_mutations();
    root.append_child(
        &Node::element("span")
            .with_attribute("data-id", "a")
            .with_attribute("data-color", "blue"),
    )?;
    deliver_mutations();
    println!("\nframe 2 ({} bursts pending):", reconciler.pending_bursts());
    frame::run_frame();

    root.set_inner_markup("")?;
    deliver_mutations();
    reconciler.disconnect();
    println!("\nframe 3 after disconnect ({} callbacks):", frame::pending_frames());
    frame::run_frame();

    println!("\n=== Example Complete ===");
    Ok(())
}
