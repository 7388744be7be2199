//! Swap Example - Markup swaps mirrored into a plain-data registry
//!
//! A list of map markers is re-rendered wholesale, the way a server response
//! would replace it. The mirror only sees what actually changed.
//!
//! Run with: RUST_LOG=keyed_sync=debug cargo run --example swap

use keyed_sync::tree::{deliver_mutations, Node};
use keyed_sync::{Mirror, Options, Reconciler};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    println!("=== keyed-sync Swap Example ===\n");

    let root = Node::element("ul");
    root.set_inner_markup(concat!(
        r#"<li data-id="paris" data-lat="48.85" data-lng="2.35">Paris</li>"#,
        r#"<li data-id="rome" data-lat="41.90" data-lng="12.49">Rome</li>"#,
    ))?;

    let options = Options::new("data-id").with_watch(["data-lat", "data-lng"]);
    let reconciler = Reconciler::create(&root, options)?;
    let mirror = Mirror::attach(&reconciler)?;

    reconciler.on_add(|entries| {
        for entry in entries {
            println!("  + {}", entry.key);
        }
        Ok(())
    })?;
    reconciler.on_remove(|entries| {
        for entry in entries {
            println!("  - {}", entry.key);
        }
        Ok(())
    })?;
    reconciler.on_change(|changes| {
        for change in changes {
            println!(
                "  ~ {} {}: {:?} -> {:?}",
                change.key, change.attribute, change.from, change.to
            );
        }
        Ok(())
    })?;

    println!("scan:");
    reconciler.scan();

    println!("\nswap (rome moves, berlin arrives):");
    root.set_inner_markup(concat!(
        r#"<li data-id="paris" data-lat="48.85" data-lng="2.35">Paris</li>"#,
        r#"<li data-id="rome" data-lat="41.89" data-lng="12.49">Rome</li>"#,
        r#"<li data-id="berlin" data-lat="52.52" data-lng="13.40">Berlin</li>"#,
    ))?;
    deliver_mutations();

    println!("\nswap (paris leaves):");
    root.set_inner_markup(concat!(
        r#"<li data-id="rome" data-lat="41.89" data-lng="12.49">Rome</li>"#,
        r#"<li data-id="berlin" data-lat="52.52" data-lng="13.40">Berlin</li>"#,
    ))?;
    deliver_mutations();

    println!("\nidentical swap (nothing):");
    root.set_inner_markup(concat!(
        r#"<li data-id="rome" data-lat="41.89" data-lng="12.49">Rome</li>"#,
        r#"<li data-id="berlin" data-lat="52.52" data-lng="13.40">Berlin</li>"#,
    ))?;
    deliver_mutations();

    println!("\nmirror: {}", mirror.to_json()?);

    reconciler.disconnect();
    println!("\n=== Example Complete ===");
    Ok(())
}
