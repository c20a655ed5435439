//! dockyard: a 3D scene planner for drone docking operations
//!
//! Edit mode places and arranges drones, docking stations and route
//! waypoints; run mode locks the scene behind a snapshot and previews
//! flights, cargo hand-off and the station lifts. Leaving run mode
//! restores the scene exactly as it was.

/// Version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod app;
mod sim;
mod storage;
mod viewport;

use macroquad::prelude::*;

use app::AppState;
use storage::DirStore;

fn window_conf() -> Conf {
    Conf {
        window_title: format!("dockyard v{}", VERSION),
        window_width: 1280,
        window_height: 800,
        window_resizable: true,
        high_dpi: true,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    let store = DirStore::new("projects");
    let mut app = AppState::new("default", store);

    loop {
        let now = get_time();
        app.handle_input(now);
        app.sim.tick(now);
        viewport::draw(&app, now);
        next_frame().await
    }
}
