//! Run-mode simulation core
//!
//! Everything the viewport and panels consume lives under here: the scene
//! store, the edit/run snapshot contract, the phase scheduler, the lift
//! actuator, cargo transfer and the status projection. No macroquad types;
//! tick time is an `f64` seconds value supplied by the caller, so the
//! whole core runs headless under test.

pub mod cargo;
pub mod error;
pub mod lift;
pub mod math;
pub mod motion;
pub mod scene;
pub mod snapshot;
pub mod status;

use std::collections::HashMap;

use error::SimError;
use lift::LiftBank;
use math::Vec3;
use motion::{MotionScheduler, PhaseAction};
use scene::{EntityId, EntityKind, SceneStore, TransformPatch, WaypointKind, CARGO_CARRY_OFFSET};
use snapshot::SceneSnapshot;
use status::{DroneActivity, StatusProjector};

/// Editor mode. Run mode holds a snapshot and locks out edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Edit,
    Run,
}

/// Edit-path mutations, produced by the placement/selection boundary.
/// All of them are rejected while run mode is active.
#[derive(Debug, Clone)]
pub enum EditEvent {
    Place { kind: EntityKind, position: Vec3 },
    Select { id: EntityId, kind: EntityKind },
    ClearSelection,
    Transform { id: EntityId, kind: EntityKind, patch: TransformPatch },
    Delete { id: EntityId, kind: EntityKind },
    Rename { id: EntityId, kind: EntityKind, name: String },
    SetWaypointKind { id: EntityId, kind: WaypointKind },
    Bind { station: EntityId, waypoint: EntityId },
    Unbind { station: EntityId },
}

/// Work scheduled for a later tick; drained by `tick()` once due. No OS
/// timers involved.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Deferred {
    RaiseLift { station: EntityId },
}

/// The simulation facade the frontend drives: one entry point for edit
/// events, one for the per-frame tick, plus the run-mode commands.
pub struct Simulation {
    pub scene: SceneStore,
    pub status: StatusProjector,
    pub(crate) mode: Mode,
    pub(crate) snapshot: Option<SceneSnapshot>,
    pub(crate) scheduler: MotionScheduler,
    pub(crate) lifts: LiftBank,
    pub(crate) deferred: Vec<(f64, Deferred)>,
    /// Pre-dispatch origin per drone, for the return flight
    pub(crate) origins: HashMap<EntityId, Vec3>,
}

impl Simulation {
    pub fn new(project_number: u32) -> Self {
        Self::with_scene(SceneStore::new(project_number))
    }

    pub fn with_scene(scene: SceneStore) -> Self {
        Self {
            scene,
            status: StatusProjector::new(),
            mode: Mode::Edit,
            snapshot: None,
            scheduler: MotionScheduler::new(),
            lifts: LiftBank::new(),
            deferred: Vec::new(),
            origins: HashMap::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// True when no motion, lift drive or deferred work is pending.
    /// Carried cargo alone does not count: it only moves when its drone
    /// does.
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle() && self.lifts.is_idle() && self.deferred.is_empty()
    }

    /// Toggle between edit and run mode. Exactly one transition per call,
    /// so rapid double-invocation is safe. Returns the new mode.
    pub fn toggle_run_mode(&mut self, now: f64) -> Mode {
        match self.mode {
            Mode::Edit => {
                self.snapshot = Some(SceneSnapshot::capture(&self.scene));
                self.mode = Mode::Run;
            }
            Mode::Run => {
                // Cancel everything in flight first; phases hold no
                // resources, so this needs no handshake.
                self.scheduler = MotionScheduler::new();
                self.lifts = LiftBank::new();
                self.deferred.clear();
                self.origins.clear();
                self.status.reset();
                if let Some(snapshot) = self.snapshot.take() {
                    snapshot.restore(&mut self.scene);
                }
                self.mode = Mode::Edit;
            }
        }
        self.refresh_panel(now);
        self.mode
    }

    /// Apply one edit-path mutation. Rejected with `EditLocked` while a
    /// run-mode snapshot is held. Returns the created entity id for
    /// placements.
    pub fn apply_edit(&mut self, event: EditEvent, now: f64) -> Result<Option<EntityId>, SimError> {
        // Selection is view state, not scene content: it stays legal in
        // run mode so commands can target entities, and the snapshot
        // restore re-applies whatever is selected at exit.
        let is_selection = matches!(event, EditEvent::Select { .. } | EditEvent::ClearSelection);
        if self.mode == Mode::Run && !is_selection {
            return Err(SimError::EditLocked);
        }
        let created = match event {
            EditEvent::Place { kind, position } => Some(self.scene.create(kind, position)),
            EditEvent::Select { id, kind } => {
                self.scene.select(id, kind);
                None
            }
            EditEvent::ClearSelection => {
                self.scene.clear_selection();
                None
            }
            EditEvent::Transform { id, kind, patch } => {
                self.scene.transform(id, kind, patch);
                None
            }
            EditEvent::Delete { id, kind } => {
                self.scene.delete(id, kind);
                None
            }
            EditEvent::Rename { id, kind, name } => {
                self.scene.rename(id, kind, name);
                None
            }
            EditEvent::SetWaypointKind { id, kind } => {
                self.scene.set_waypoint_kind(id, kind);
                None
            }
            EditEvent::Bind { station, waypoint } => {
                self.scene.bind_station(station, waypoint)?;
                None
            }
            EditEvent::Unbind { station } => {
                self.scene.unbind_station(station);
                None
            }
        };
        self.refresh_panel(now);
        Ok(created)
    }

    /// Advance the simulation one frame. Never fails; a vanished entity
    /// just drops its motion.
    pub fn tick(&mut self, now: f64) {
        let mut status_dirty = false;

        if !self.scheduler.is_idle() {
            let result = self.scheduler.advance(&mut self.scene, now);
            status_dirty |= result.status_dirty;
            for action in result.actions {
                self.handle_phase_action(action);
            }
        }

        if !self.lifts.is_idle() {
            let result = self.lifts.advance(&mut self.scene, now);
            status_dirty |= result.status_dirty;
            for done in result.completed {
                self.handle_lift_done(done, now);
            }
        }

        if !self.deferred.is_empty() {
            let mut due = Vec::new();
            self.deferred.retain(|(at, action)| {
                if *at <= now {
                    due.push(*action);
                    false
                } else {
                    true
                }
            });
            for action in due {
                match action {
                    Deferred::RaiseLift { station } => {
                        self.lifts.drive_to_extreme(&self.scene, station, true, now);
                    }
                }
            }
        }

        self.update_carried_cargo();

        if status_dirty {
            self.refresh_panel(now);
        }
    }

    /// Carried cargo has no independent ground truth: recompute it from
    /// the drone position every tick. The stored field only matters once
    /// the cargo is detached.
    fn update_carried_cargo(&mut self) {
        let carried: Vec<(EntityId, EntityId)> = self
            .scene
            .cargo_items()
            .iter()
            .filter_map(|c| c.drone_id.map(|d| (c.id, d)))
            .collect();
        for (cargo_id, drone_id) in carried {
            let Some(position) = self.scene.drone(drone_id).map(|d| d.position) else {
                continue;
            };
            let below = position - Vec3::new(0.0, CARGO_CARRY_OFFSET, 0.0);
            self.scene.transform(cargo_id, EntityKind::Cargo, TransformPatch::position(below));
        }
    }

    fn handle_phase_action(&mut self, action: PhaseAction) {
        match action {
            PhaseAction::None => {}
            PhaseAction::FlightArrived { drone, waypoint } => {
                let kind = self
                    .scene
                    .waypoint(waypoint)
                    .map(|w| w.kind)
                    .unwrap_or(WaypointKind::Landing);
                let Some(d) = self.scene.drone_mut(drone) else {
                    return;
                };
                match kind {
                    WaypointKind::Landing => {
                        d.propellers_active = false;
                        d.hovering = false;
                        self.status.set_activity(drone, DroneActivity::Landed);
                    }
                    WaypointKind::Hover => {
                        d.propellers_active = true;
                        d.hovering = true;
                        self.status.set_activity(drone, DroneActivity::Hovering);
                    }
                }
            }
            PhaseAction::ReturnCompleted { drone } => {
                if let Some(d) = self.scene.drone_mut(drone) {
                    d.propellers_active = false;
                    d.hovering = false;
                }
                self.status.set_activity(drone, DroneActivity::Returned);
            }
        }
    }

    pub(crate) fn refresh_panel(&mut self, now: f64) {
        self.status.refresh(&self.scene, &self.scheduler, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 1.0 / 60.0;

    /// Tick until all motion settles; returns the final clock value.
    fn settle(sim: &mut Simulation, mut now: f64) -> f64 {
        let mut guard = 0;
        while !sim.is_idle() {
            now += DT;
            sim.tick(now);
            guard += 1;
            assert!(guard < 120_000, "simulation did not settle");
        }
        now
    }

    #[test]
    fn test_toggle_is_one_transition_per_call() {
        let mut sim = Simulation::new(1);
        assert_eq!(sim.toggle_run_mode(0.0), Mode::Run);
        assert_eq!(sim.mode(), Mode::Run);
        assert_eq!(sim.toggle_run_mode(0.0), Mode::Edit);
        assert_eq!(sim.mode(), Mode::Edit);
    }

    #[test]
    fn test_edits_rejected_in_run_mode() {
        let mut sim = Simulation::new(1);
        sim.toggle_run_mode(0.0);
        let err = sim
            .apply_edit(
                EditEvent::Place { kind: EntityKind::Drone, position: Vec3::ZERO },
                0.0,
            )
            .unwrap_err();
        assert_eq!(err, SimError::EditLocked);
        assert!(sim.scene.drones().is_empty());
    }

    #[test]
    fn test_selection_allowed_in_run_mode() {
        let mut sim = Simulation::new(1);
        let d = sim.scene.create_drone(Vec3::ZERO);
        sim.toggle_run_mode(0.0);
        sim.apply_edit(EditEvent::Select { id: d, kind: EntityKind::Drone }, 0.0)
            .unwrap();
        assert_eq!(sim.scene.selected(), Some((EntityKind::Drone, d)));
    }

    #[test]
    fn test_enter_exit_with_no_actions_restores_scene() {
        let mut sim = Simulation::new(1);
        sim.apply_edit(
            EditEvent::Place { kind: EntityKind::Drone, position: Vec3::new(1.0, 0.0, 2.0) },
            0.0,
        )
        .unwrap();
        sim.apply_edit(
            EditEvent::Place { kind: EntityKind::Station, position: Vec3::new(4.0, 0.0, 4.0) },
            0.0,
        )
        .unwrap();
        let before = sim.scene.collections_cloned();

        sim.toggle_run_mode(0.0);
        sim.toggle_run_mode(1.0);

        let after = sim.scene.collections_cloned();
        assert_eq!(before.0, after.0);
        assert_eq!(before.1, after.1);
        assert_eq!(before.2, after.2);
    }

    #[test]
    fn test_takeoff_to_landing_waypoint() {
        let mut sim = Simulation::new(1);
        let d = sim.scene.create_drone(Vec3::ZERO);
        let w = sim.scene.create_waypoint(Vec3::new(10.0, 0.0, 10.0));

        sim.toggle_run_mode(0.0);
        sim.take_off(d, w, 0.0);
        assert!(sim.scene.drone(d).unwrap().propellers_active);
        settle(&mut sim, 0.0);

        let drone = sim.scene.drone(d).unwrap();
        assert_eq!(drone.position, Vec3::new(10.0, 0.0, 10.0));
        assert!(!drone.propellers_active);
        assert!(!drone.hovering);
        assert_eq!(sim.status.activity(d), DroneActivity::Landed);
    }

    #[test]
    fn test_takeoff_to_hover_waypoint_keeps_propellers() {
        let mut sim = Simulation::new(1);
        let d = sim.scene.create_drone(Vec3::ZERO);
        let w = sim.scene.create_waypoint(Vec3::new(5.0, 3.0, 0.0));
        sim.scene.set_waypoint_kind(w, WaypointKind::Hover);

        sim.toggle_run_mode(0.0);
        sim.take_off(d, w, 0.0);
        settle(&mut sim, 0.0);

        let drone = sim.scene.drone(d).unwrap();
        assert!(drone.propellers_active);
        assert!(drone.hovering);
        assert_eq!(sim.status.activity(d), DroneActivity::Hovering);
    }

    #[test]
    fn test_takeoff_mid_flight_is_ignored() {
        let mut sim = Simulation::new(1);
        let d = sim.scene.create_drone(Vec3::ZERO);
        let w1 = sim.scene.create_waypoint(Vec3::new(10.0, 0.0, 0.0));
        let w2 = sim.scene.create_waypoint(Vec3::new(0.0, 0.0, 10.0));

        sim.toggle_run_mode(0.0);
        sim.take_off(d, w1, 0.0);
        sim.tick(0.5);
        // Second command while airborne: quiet no-op
        sim.take_off(d, w2, 0.5);
        settle(&mut sim, 0.5);
        assert_eq!(sim.scene.drone(d).unwrap().position, Vec3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn test_run_mode_motion_reverted_on_exit() {
        let mut sim = Simulation::new(1);
        let d = sim.scene.create_drone(Vec3::ZERO);
        let w = sim.scene.create_waypoint(Vec3::new(10.0, 0.0, 10.0));
        let before = sim.scene.collections_cloned();

        sim.toggle_run_mode(0.0);
        sim.take_off(d, w, 0.0);
        let now = settle(&mut sim, 0.0);
        sim.dispatch_cargo(d, now);
        sim.toggle_run_mode(now);

        let after = sim.scene.collections_cloned();
        assert_eq!(before.0, after.0);
        assert_eq!(before.2, after.2);
        assert!(sim.scene.cargo_items().is_empty());
    }
}
