//! Derived status and property projection
//!
//! Panels never compute display state themselves: the projector derives
//! it here after every relevant mutation and pushes a flat ordered field
//! list they render verbatim. Edits made through a field go back through
//! the store's own operations.

use std::collections::HashMap;

use super::lift::lift_status;
use super::math::Vec3;
use super::motion::MotionScheduler;
use super::scene::{EntityId, EntityKind, SceneStore, WaypointKind};

/// What a drone is currently doing, as far as the display is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DroneActivity {
    #[default]
    Idle,
    Flying,
    Returning,
    Hovering,
    Landed,
    Returned,
}

/// One row of the properties panel. `options` is set for enumerated
/// fields (the panel renders those as a picker).
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyField {
    pub label: &'static str,
    pub value: String,
    pub options: Option<Vec<&'static str>>,
}

impl PropertyField {
    fn text(label: &'static str, value: impl Into<String>) -> Self {
        Self { label, value: value.into(), options: None }
    }
}

fn format_position(p: Vec3) -> String {
    format!("{:.1}, {:.1}, {:.1}", p.x, p.y, p.z)
}

/// Holds per-drone activity plus the cached panel fields for whichever
/// entity is selected. Consumers read, never write.
#[derive(Default)]
pub struct StatusProjector {
    activities: HashMap<EntityId, DroneActivity>,
    /// Ordered field list for the selected entity; empty when nothing
    /// is selected
    pub fields: Vec<PropertyField>,
}

impl StatusProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_activity(&mut self, drone: EntityId, activity: DroneActivity) {
        self.activities.insert(drone, activity);
    }

    pub fn activity(&self, drone: EntityId) -> DroneActivity {
        self.activities.get(&drone).copied().unwrap_or_default()
    }

    /// Forget run-mode state (activities reset with the scene on exit).
    pub fn reset(&mut self) {
        self.activities.clear();
    }

    /// Status line for one drone, with live progress while in flight.
    pub fn drone_status(
        &self,
        drone: EntityId,
        scheduler: &MotionScheduler,
        now: f64,
    ) -> String {
        let percent = scheduler
            .progress(EntityKind::Drone, drone, now)
            .map(|p| (p * 100.0).round() as i32);
        match (self.activity(drone), percent) {
            (DroneActivity::Flying, Some(p)) => format!("flying ({}%)", p),
            (DroneActivity::Returning, Some(p)) => format!("returning ({}%)", p),
            (DroneActivity::Flying, None) => "arrived".to_string(),
            (DroneActivity::Returning, None) => "returning".to_string(),
            (DroneActivity::Returned, _) => "returned".to_string(),
            (DroneActivity::Hovering, _) => "hovering".to_string(),
            (DroneActivity::Landed, _) => "landed".to_string(),
            (DroneActivity::Idle, _) => "idle".to_string(),
        }
    }

    /// Recompute the panel fields for the current selection.
    pub fn refresh(&mut self, scene: &SceneStore, scheduler: &MotionScheduler, now: f64) {
        self.fields = match scene.selected() {
            Some((EntityKind::Drone, id)) => self.drone_fields(scene, scheduler, id, now),
            Some((EntityKind::Station, id)) => self.station_fields(scene, id),
            Some((EntityKind::Waypoint, id)) => self.waypoint_fields(scene, id),
            _ => Vec::new(),
        };
    }

    fn drone_fields(
        &self,
        scene: &SceneStore,
        scheduler: &MotionScheduler,
        id: EntityId,
        now: f64,
    ) -> Vec<PropertyField> {
        let Some(drone) = scene.drone(id) else {
            return Vec::new();
        };
        let cargo = match drone.cargo_id.and_then(|c| scene.cargo(c)) {
            Some(c) => c.asset_id.clone(),
            None => "none".to_string(),
        };
        vec![
            PropertyField::text("Name", drone.display_name.clone()),
            PropertyField::text("Asset ID", drone.asset_id.clone()),
            PropertyField::text("Position", format_position(drone.position)),
            PropertyField::text("Hovering", if drone.hovering { "yes" } else { "no" }),
            PropertyField::text(
                "Propellers",
                if drone.propellers_active { "active" } else { "stopped" },
            ),
            PropertyField::text("Cargo", cargo),
            PropertyField::text("Status", self.drone_status(id, scheduler, now)),
        ]
    }

    fn station_fields(&self, scene: &SceneStore, id: EntityId) -> Vec<PropertyField> {
        let Some(station) = scene.station(id) else {
            return Vec::new();
        };
        let bound = match station.bound_waypoint_id.and_then(|w| scene.waypoint(w)) {
            Some(w) => w.display_name.clone(),
            None => "none".to_string(),
        };
        vec![
            PropertyField::text("Name", station.display_name.clone()),
            PropertyField::text("Asset ID", station.asset_id.clone()),
            PropertyField::text("Position", format_position(station.position)),
            PropertyField::text("Lift", lift_status(station.lift_position)),
            PropertyField::text("Bound waypoint", bound),
            PropertyField::text(
                "Shelves",
                format!("{} / 4 occupied", station.occupied_count()),
            ),
        ]
    }

    fn waypoint_fields(&self, scene: &SceneStore, id: EntityId) -> Vec<PropertyField> {
        let Some(waypoint) = scene.waypoint(id) else {
            return Vec::new();
        };
        vec![
            PropertyField::text("Name", waypoint.display_name.clone()),
            PropertyField::text("Asset ID", waypoint.asset_id.clone()),
            PropertyField::text("Position", format_position(waypoint.position)),
            PropertyField {
                label: "Type",
                value: waypoint.kind.label().to_string(),
                options: Some(WaypointKind::ALL.iter().map(|k| k.label()).collect()),
            },
            PropertyField::text("Sequence #", waypoint.sequence_number.to_string()),
        ]
    }
}
