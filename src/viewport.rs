//! 3D viewport and HUD
//!
//! Pure presentation: reads the scene store and status projection and
//! draws them with macroquad's immediate-mode primitives. Nothing here
//! mutates simulation state.

use macroquad::prelude::*;

use crate::app::AppState;
use crate::sim::lift::platform_surface;
use crate::sim::scene::{EntityKind, WaypointKind};
use crate::sim::Mode;

const GROUND_COLOR: Color = Color::new(0.16, 0.17, 0.20, 1.0);
const SELECT_COLOR: Color = YELLOW;

fn to_mq(v: crate::sim::math::Vec3) -> Vec3 {
    vec3(v.x, v.y, v.z)
}

fn camera(app: &AppState) -> Camera3D {
    let d = app.cam_distance;
    Camera3D {
        position: vec3(app.cam_yaw.sin() * d, d * 0.6, app.cam_yaw.cos() * d),
        up: vec3(0.0, 1.0, 0.0),
        target: vec3(0.0, 0.0, 0.0),
        ..Default::default()
    }
}

pub fn draw(app: &AppState, now: f64) {
    clear_background(GROUND_COLOR);
    set_camera(&camera(app));

    draw_grid(40, 1.0, DARKGRAY, GRAY);

    let selected = app.sim.scene.selected();

    for station in app.sim.scene.stations() {
        let base = to_mq(station.position);
        // Housing column, then the platform at its current lift height
        draw_cube(base + vec3(0.0, 1.5, 0.0), vec3(2.0, 3.0, 2.0), None, DARKGRAY);
        draw_cube_wires(base + vec3(0.0, 1.5, 0.0), vec3(2.0, 3.0, 2.0), LIGHTGRAY);
        let platform = to_mq(platform_surface(station));
        draw_cube(platform, vec3(1.8, 0.1, 1.8), None, SKYBLUE);
        if selected == Some((EntityKind::Station, station.id)) {
            draw_cube_wires(base + vec3(0.0, 1.5, 0.0), vec3(2.4, 3.4, 2.4), SELECT_COLOR);
        }
    }

    for drone in app.sim.scene.drones() {
        let pos = to_mq(drone.position);
        let body = if drone.propellers_active { ORANGE } else { BLUE };
        draw_cube(pos, vec3(0.8, 0.3, 0.8), None, body);
        if drone.propellers_active {
            // Rotor disc markers at the corners
            for (dx, dz) in [(-0.4, -0.4), (-0.4, 0.4), (0.4, -0.4), (0.4, 0.4)] {
                draw_sphere(pos + vec3(dx, 0.2, dz), 0.12, None, LIGHTGRAY);
            }
        }
        if selected == Some((EntityKind::Drone, drone.id)) {
            draw_cube_wires(pos, vec3(1.1, 0.6, 1.1), SELECT_COLOR);
        }
    }

    for waypoint in app.sim.scene.waypoints() {
        let pos = to_mq(waypoint.position);
        let color = match waypoint.kind {
            WaypointKind::Landing => GREEN,
            WaypointKind::Hover => SKYBLUE,
        };
        draw_sphere(pos, 0.3, None, color);
        draw_line_3d(pos, vec3(pos.x, 0.0, pos.z), color);
        if selected == Some((EntityKind::Waypoint, waypoint.id)) {
            draw_cube_wires(pos, vec3(0.9, 0.9, 0.9), SELECT_COLOR);
        }
    }

    for cargo in app.sim.scene.cargo_items() {
        draw_cube(to_mq(cargo.position), vec3(0.4, 0.4, 0.4), None, GOLD);
    }

    // Placement cursor
    let cursor = to_mq(app.cursor);
    draw_line_3d(cursor - vec3(0.4, 0.0, 0.0), cursor + vec3(0.4, 0.0, 0.0), WHITE);
    draw_line_3d(cursor - vec3(0.0, 0.0, 0.4), cursor + vec3(0.0, 0.0, 0.4), WHITE);
    if app.placing.is_some() {
        draw_cube_wires(cursor, vec3(1.0, 1.0, 1.0), WHITE);
    }

    set_default_camera();
    draw_hud(app, now);
}

fn draw_hud(app: &AppState, now: f64) {
    let mode = match app.sim.mode() {
        Mode::Edit => "EDIT",
        Mode::Run => "RUN",
    };
    draw_text(&format!("[{}] dockyard", mode), 12.0, 24.0, 24.0, WHITE);

    if let Some(kind) = app.placing {
        draw_text(
            &format!("placing {} - Enter to confirm, Esc to cancel", kind.label()),
            12.0,
            46.0,
            18.0,
            LIGHTGRAY,
        );
    }
    if let Some(buffer) = &app.name_buffer {
        draw_text(&format!("rename: {}_", buffer), 12.0, 46.0, 18.0, LIGHTGRAY);
    }

    // Property panel for the current selection
    let mut y = 80.0;
    for field in &app.sim.status.fields {
        draw_text(&format!("{}: {}", field.label, field.value), 12.0, y, 18.0, LIGHTGRAY);
        y += 20.0;
    }

    if app.status_visible(now) {
        draw_text(&app.message, 12.0, screen_height() - 40.0, 20.0, YELLOW);
    }

    let help = match app.sim.mode() {
        Mode::Edit => "1/2/3 place  Tab select  M move  N rename  K type  B bind  V unbind  Del delete  Space run",
        Mode::Run => "Tab select  T takeoff  G dispatch  X release  U/J lift  1/2 lift level  Space stop",
    };
    draw_text(help, 12.0, screen_height() - 16.0, 16.0, GRAY);
}
