//! Walkthrough of a full minimap session on the in-memory host.
//!
//! Builds a tall synthetic grid, creates a minimap beside it, scrolls,
//! clicks, mutates the content, and tears everything down.
//!
//! Run with: cargo run --example memory_demo

use std::sync::Arc;
use std::time::Duration;

use dom_minimap::host::memory::{MemoryDom, MemoryElement, MemoryMutations, MemoryRasterizer};
use dom_minimap::host::{Element, ElementHandle, Event, ScrollMetrics};
use dom_minimap::indicator::INDICATOR_CLASS;
use dom_minimap::{MapWidth, Minimap, MinimapConfig};

#[tokio::main]
async fn main() -> dom_minimap::Result<()> {
    let dom = MemoryDom::new();
    dom.set_window(800.0, 3000.0);

    // A tall scrollable grid and a pre-existing surface element.
    let grid = MemoryElement::new("grid");
    grid.set_metrics(ScrollMetrics {
        scroll_top: 0.0,
        scroll_height: 3000.0,
        client_height: 600.0,
        client_width: 400.0,
    });
    dom.register(".grid", grid.clone());

    let surface = MemoryElement::new("minimap");
    surface.set_metrics(ScrollMetrics {
        scroll_top: 0.0,
        scroll_height: 600.0,
        client_height: 600.0,
        client_width: 150.0,
    });
    dom.register("#minimap", surface.clone());

    let config = MinimapConfig::from_json(
        r##"{
            "target": ".grid",
            "container": "#minimap",
            "styles": { "width": 150, "height": 600.0 }
        }"##,
    )?;

    let rasterizer = MemoryRasterizer::new(400, 3000);
    let mutations = MemoryMutations::new();
    let minimap = Minimap::new(config, dom.clone(), rasterizer.clone(), mutations.clone())?;

    minimap.create().await?;
    println!("created minimap v{}", minimap.version());
    println!("surface children after create: {}", surface.child_count());

    let indicator = dom
        .created_with_class(INDICATOR_CLASS)
        .expect("indicator present");
    println!("indicator height: {:?}", indicator.style("height"));

    // Scroll the grid and let the indicator follow.
    grid.set_metrics(ScrollMetrics {
        scroll_top: 1200.0,
        scroll_height: 3000.0,
        client_height: 600.0,
        client_width: 400.0,
    });
    dom.dispatch_window(&Event::scroll());
    println!("indicator top after scrolling: {:?}", indicator.style("top"));

    // Click near the bottom of the minimap.
    surface.dispatch(&Event::click(500.0));
    println!(
        "grid scroll position after click: {}",
        grid.scroll_metrics().scroll_top
    );

    // Mutate the content; the refresh settles after the quiet period.
    let grid_handle: ElementHandle = grid.clone();
    mutations.notify(&grid_handle, 12);
    tokio::time::sleep(Duration::from_millis(600)).await;
    println!("captures after mutation settled: {}", rasterizer.capture_count());

    minimap.destroy()?;
    println!(
        "surface children after destroy: {} (root is {:?})",
        surface.child_count(),
        minimap.root().map(|_| "present")
    );
    Ok(())
}
