//! Application state and input handling
//!
//! Owns the simulation facade, the on-disk project store and the small
//! pile of frontend-only state: the placement cursor, the rename buffer
//! and the transient status message. Keyboard input is translated here
//! into edit events and run-mode commands; nothing in this module
//! touches simulation internals directly.

use macroquad::input::{
    get_char_pressed, is_key_pressed, mouse_wheel, KeyCode,
};

use crate::sim::math::Vec3;
use crate::sim::scene::{EntityId, EntityKind, TransformPatch, WaypointKind};
use crate::sim::{EditEvent, Mode, Simulation};
use crate::storage::{self, DirStore};

/// Grid step for cursor movement
const CURSOR_STEP: f32 = 0.5;
/// How long status messages stay on screen
const MESSAGE_SECS: f64 = 3.0;

pub struct AppState {
    pub sim: Simulation,
    store: DirStore,
    project_id: String,
    /// Where the next placement lands
    pub cursor: Vec3,
    /// Entity kind being placed, if a placement is in progress
    pub placing: Option<EntityKind>,
    /// Rename-in-progress buffer; while active, most shortcuts are
    /// suppressed so typed letters land in the name
    pub name_buffer: Option<String>,
    pub message: String,
    message_until: f64,
    /// Camera orbit around the scene center
    pub cam_yaw: f32,
    pub cam_distance: f32,
    /// Next waypoint (by list order) a takeoff targets
    route_cursor: usize,
}

impl AppState {
    pub fn new(project_id: &str, store: DirStore) -> Self {
        let sim = match storage::load_project(&store, project_id) {
            Ok(Some(scene)) => {
                log::info!("loaded project '{}'", project_id);
                Simulation::with_scene(scene)
            }
            Ok(None) => Simulation::new(1),
            Err(e) => {
                log::warn!("failed to load project '{}': {}", project_id, e);
                Simulation::new(1)
            }
        };
        Self {
            sim,
            store,
            project_id: project_id.to_string(),
            cursor: Vec3::ZERO,
            placing: None,
            name_buffer: None,
            message: String::new(),
            message_until: 0.0,
            cam_yaw: 0.8,
            cam_distance: 24.0,
            route_cursor: 0,
        }
    }

    pub fn set_status(&mut self, text: impl Into<String>, now: f64) {
        self.message = text.into();
        self.message_until = now + MESSAGE_SECS;
    }

    pub fn status_visible(&self, now: f64) -> bool {
        !self.message.is_empty() && now < self.message_until
    }

    /// One frame of input handling. `now` is the shared simulation clock.
    pub fn handle_input(&mut self, now: f64) {
        self.handle_camera();

        if self.name_buffer.is_some() {
            self.handle_rename(now);
            return;
        }
        // Drain typed characters so they don't leak into a later rename
        while get_char_pressed().is_some() {}

        if is_key_pressed(KeyCode::Space) {
            let mode = self.sim.toggle_run_mode(now);
            self.placing = None;
            match mode {
                Mode::Run => self.set_status("Run mode: edits locked", now),
                Mode::Edit => self.set_status("Edit mode: scene restored", now),
            }
            return;
        }

        match self.sim.mode() {
            Mode::Edit => self.handle_edit_keys(now),
            Mode::Run => self.handle_run_keys(now),
        }
    }

    // =========================================================================
    // Edit mode
    // =========================================================================

    fn handle_edit_keys(&mut self, now: f64) {
        self.handle_cursor_keys();

        if is_key_pressed(KeyCode::Key1) {
            self.placing = Some(EntityKind::Drone);
        } else if is_key_pressed(KeyCode::Key2) {
            self.placing = Some(EntityKind::Station);
        } else if is_key_pressed(KeyCode::Key3) {
            self.placing = Some(EntityKind::Waypoint);
        }

        if is_key_pressed(KeyCode::Escape) {
            if self.placing.take().is_none() {
                self.apply(EditEvent::ClearSelection, now);
            }
            return;
        }

        if is_key_pressed(KeyCode::Enter) {
            if let Some(kind) = self.placing.take() {
                let position = self.cursor;
                if let Some(id) = self.apply(EditEvent::Place { kind, position }, now) {
                    self.apply(EditEvent::Select { id, kind }, now);
                    self.set_status(format!("Placed {}", kind.label()), now);
                }
            }
            return;
        }

        if is_key_pressed(KeyCode::Tab) {
            self.select_next(now);
        }

        if is_key_pressed(KeyCode::M) {
            if let Some((kind, id)) = self.sim.scene.selected() {
                let patch = TransformPatch::position(self.cursor);
                self.apply(EditEvent::Transform { id, kind, patch }, now);
            }
        }

        if is_key_pressed(KeyCode::N) {
            if self.sim.scene.selected().is_some() {
                while get_char_pressed().is_some() {}
                self.name_buffer = Some(String::new());
            }
        }

        if is_key_pressed(KeyCode::K) {
            self.toggle_waypoint_kind(now);
        }

        if is_key_pressed(KeyCode::B) {
            self.bind_selected_station(now);
        }
        if is_key_pressed(KeyCode::V) {
            if let Some((EntityKind::Station, id)) = self.sim.scene.selected() {
                self.apply(EditEvent::Unbind { station: id }, now);
                self.set_status("Unbound", now);
            }
        }

        if is_key_pressed(KeyCode::Delete) || is_key_pressed(KeyCode::Backspace) {
            if let Some((kind, id)) = self.sim.scene.selected() {
                self.apply(EditEvent::Delete { id, kind }, now);
                self.set_status(format!("Deleted {}", kind.label()), now);
            }
        }
    }

    fn handle_cursor_keys(&mut self) {
        if is_key_pressed(KeyCode::Left) {
            self.cursor.x -= CURSOR_STEP;
        }
        if is_key_pressed(KeyCode::Right) {
            self.cursor.x += CURSOR_STEP;
        }
        if is_key_pressed(KeyCode::Up) {
            self.cursor.z -= CURSOR_STEP;
        }
        if is_key_pressed(KeyCode::Down) {
            self.cursor.z += CURSOR_STEP;
        }
        if is_key_pressed(KeyCode::R) {
            self.cursor.y += CURSOR_STEP;
        }
        if is_key_pressed(KeyCode::F) {
            self.cursor.y = (self.cursor.y - CURSOR_STEP).max(0.0);
        }
    }

    fn handle_rename(&mut self, now: f64) {
        while let Some(c) = get_char_pressed() {
            if !c.is_control() {
                if let Some(buffer) = self.name_buffer.as_mut() {
                    buffer.push(c);
                }
            }
        }
        if is_key_pressed(KeyCode::Backspace) {
            if let Some(buffer) = self.name_buffer.as_mut() {
                buffer.pop();
            }
        }
        if is_key_pressed(KeyCode::Escape) {
            self.name_buffer = None;
        }
        if is_key_pressed(KeyCode::Enter) {
            let Some(name) = self.name_buffer.take() else {
                return;
            };
            let trimmed = name.trim().to_string();
            if trimmed.is_empty() {
                self.set_status("Name cannot be empty", now);
                return;
            }
            if let Some((kind, id)) = self.sim.scene.selected() {
                self.apply(EditEvent::Rename { id, kind, name: trimmed.clone() }, now);
                self.set_status(format!("Renamed to '{}'", trimmed), now);
            }
        }
    }

    /// Tab-cycle through every entity, drones first, then stations,
    /// then waypoints.
    fn select_next(&mut self, now: f64) {
        let mut order: Vec<(EntityKind, EntityId)> = Vec::new();
        order.extend(self.sim.scene.drones().iter().map(|d| (EntityKind::Drone, d.id)));
        order.extend(self.sim.scene.stations().iter().map(|s| (EntityKind::Station, s.id)));
        order.extend(self.sim.scene.waypoints().iter().map(|w| (EntityKind::Waypoint, w.id)));
        if order.is_empty() {
            return;
        }
        let next = match self.sim.scene.selected() {
            Some(current) => {
                let at = order.iter().position(|entry| *entry == current);
                match at {
                    Some(i) => order[(i + 1) % order.len()],
                    None => order[0],
                }
            }
            None => order[0],
        };
        self.apply(EditEvent::Select { id: next.1, kind: next.0 }, now);
    }

    fn toggle_waypoint_kind(&mut self, now: f64) {
        let Some((EntityKind::Waypoint, id)) = self.sim.scene.selected() else {
            return;
        };
        let Some(current) = self.sim.scene.waypoint(id).map(|w| w.kind) else {
            return;
        };
        let kind = match current {
            WaypointKind::Landing => WaypointKind::Hover,
            WaypointKind::Hover => WaypointKind::Landing,
        };
        self.apply(EditEvent::SetWaypointKind { id, kind }, now);
        self.set_status(format!("Waypoint type: {}", kind.label()), now);
    }

    /// Bind the selected station to the nearest landing waypoint.
    fn bind_selected_station(&mut self, now: f64) {
        let Some((EntityKind::Station, station)) = self.sim.scene.selected() else {
            return;
        };
        let Some(origin) = self.sim.scene.station(station).map(|s| s.position) else {
            return;
        };
        let nearest = self
            .sim
            .scene
            .waypoints()
            .iter()
            .filter(|w| w.kind == WaypointKind::Landing)
            .min_by(|a, b| {
                let da = a.position.horizontal_distance(origin);
                let db = b.position.horizontal_distance(origin);
                da.total_cmp(&db)
            })
            .map(|w| w.id);
        let Some(waypoint) = nearest else {
            self.set_status("No landing waypoint to bind", now);
            return;
        };
        match self.sim.apply_edit(EditEvent::Bind { station, waypoint }, now) {
            Ok(_) => {
                self.persist();
                self.set_status("Bound to nearest landing waypoint", now);
            }
            Err(e) => self.set_status(e.to_string(), now),
        }
    }

    // =========================================================================
    // Run mode
    // =========================================================================

    fn handle_run_keys(&mut self, now: f64) {
        // Selection stays available so commands can pick their target
        if is_key_pressed(KeyCode::Tab) {
            self.select_next(now);
        }
        if is_key_pressed(KeyCode::T) {
            self.takeoff_selected(now);
        }
        if is_key_pressed(KeyCode::G) {
            if let Some((EntityKind::Drone, id)) = self.sim.scene.selected() {
                self.sim.dispatch_cargo(id, now);
                self.set_status("Cargo dispatched", now);
            }
        }
        if is_key_pressed(KeyCode::X) {
            if let Some((EntityKind::Drone, id)) = self.sim.scene.selected() {
                match self.sim.remove_cargo(id, now) {
                    Ok(()) => self.set_status("Cargo released", now),
                    Err(e) => self.set_status(e.to_string(), now),
                }
            }
        }
        if let Some((EntityKind::Station, id)) = self.sim.scene.selected() {
            if is_key_pressed(KeyCode::U) {
                self.sim.drive_lift(id, true, now);
            }
            if is_key_pressed(KeyCode::J) {
                self.sim.drive_lift(id, false, now);
            }
            if is_key_pressed(KeyCode::Key1) {
                self.sim.drive_lift_to_level(id, 1, now);
            }
            if is_key_pressed(KeyCode::Key2) {
                self.sim.drive_lift_to_level(id, 2, now);
            }
        }
    }

    /// Send the selected drone to the next waypoint in list order,
    /// wrapping around.
    fn takeoff_selected(&mut self, now: f64) {
        let Some((EntityKind::Drone, drone)) = self.sim.scene.selected() else {
            self.set_status("Select a drone first", now);
            return;
        };
        let waypoints = self.sim.scene.waypoints();
        if waypoints.is_empty() {
            self.set_status("No waypoints placed", now);
            return;
        }
        let target = waypoints[self.route_cursor % waypoints.len()].id;
        self.route_cursor = (self.route_cursor + 1) % waypoints.len();
        self.sim.take_off(drone, target, now);
        self.set_status("Takeoff", now);
    }

    // =========================================================================
    // Shared plumbing
    // =========================================================================

    fn handle_camera(&mut self) {
        if is_key_pressed(KeyCode::Q) {
            self.cam_yaw -= 0.2;
        }
        if is_key_pressed(KeyCode::E) {
            self.cam_yaw += 0.2;
        }
        let scroll = mouse_wheel().1;
        if scroll != 0.0 {
            self.cam_distance = (self.cam_distance - scroll * 2.0).clamp(6.0, 60.0);
        }
    }

    /// Apply an edit and persist on success. Run-mode rejection surfaces
    /// as a status message rather than an error path.
    fn apply(&mut self, event: EditEvent, now: f64) -> Option<EntityId> {
        match self.sim.apply_edit(event, now) {
            Ok(created) => {
                self.persist();
                created
            }
            Err(e) => {
                self.set_status(e.to_string(), now);
                None
            }
        }
    }

    /// Fire-and-forget save. Run mode never persists: the snapshot is
    /// the authoritative editable state while it is held.
    fn persist(&mut self) {
        if self.sim.mode() == Mode::Run {
            return;
        }
        if let Err(e) = storage::save_project(&mut self.store, &self.project_id, &self.sim.scene) {
            log::warn!("save of '{}' failed: {}", self.project_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::error::SimError;
    use crate::storage::{KvStore, MemoryStore};

    /// Input-free shadow of `apply` for testing the persistence rule.
    fn apply_and_save(
        sim: &mut Simulation,
        store: &mut MemoryStore,
        event: EditEvent,
        now: f64,
    ) -> Result<Option<EntityId>, SimError> {
        let created = sim.apply_edit(event, now)?;
        if sim.mode() == Mode::Edit {
            storage::save_project(store, "p", &sim.scene).unwrap();
        }
        Ok(created)
    }

    #[test]
    fn test_edit_persists_run_does_not() {
        let mut sim = Simulation::new(1);
        let mut store = MemoryStore::new();

        apply_and_save(
            &mut sim,
            &mut store,
            EditEvent::Place { kind: EntityKind::Drone, position: Vec3::ZERO },
            0.0,
        )
        .unwrap();
        let saved = store.read("p").unwrap().unwrap();

        sim.toggle_run_mode(0.0);
        let err = apply_and_save(
            &mut sim,
            &mut store,
            EditEvent::Place { kind: EntityKind::Drone, position: Vec3::ZERO },
            0.0,
        )
        .unwrap_err();
        assert_eq!(err, SimError::EditLocked);
        // Store untouched by the rejected edit
        assert_eq!(store.read("p").unwrap().unwrap(), saved);
    }
}
