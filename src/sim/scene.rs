//! Scene entity store
//!
//! Single source of truth for everything placed in the scene: drones,
//! docking stations, waypoints and cargo. All mutation goes through the
//! closed set of operations here - nothing outside the store writes entity
//! fields directly, which is what makes the run-mode snapshot contract
//! (see `snapshot`) and the reference invariants enforceable.
//!
//! Entity ids are monotonic and never reused; the counter lives outside
//! the collections so restoring a snapshot cannot rewind it.

use serde::{Serialize, Deserialize};
use super::math::Vec3;
use super::error::SimError;

/// Number of shelf slots per docking station (2 levels x 2 lateral positions)
pub const SHELF_SLOTS: usize = 4;

/// Vertical offset of a carried cargo below its drone
pub const CARGO_CARRY_OFFSET: f32 = 0.6;

/// A unique, stable identifier for a scene entity. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

/// The entity collections the store manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Drone,
    Station,
    Waypoint,
    Cargo,
}

impl EntityKind {
    /// Three-letter prefix used in externally visible asset ids
    pub fn asset_code(&self) -> &'static str {
        match self {
            EntityKind::Drone => "DRN",
            EntityKind::Station => "DCK",
            EntityKind::Waypoint => "WPT",
            EntityKind::Cargo => "CRG",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Drone => "Drone",
            EntityKind::Station => "Docking Station",
            EntityKind::Waypoint => "Waypoint",
            EntityKind::Cargo => "Cargo",
        }
    }
}

/// Waypoint behavior on drone arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WaypointKind {
    #[default]
    Landing,
    Hover,
}

impl WaypointKind {
    pub const ALL: [WaypointKind; 2] = [WaypointKind::Landing, WaypointKind::Hover];

    pub fn label(&self) -> &'static str {
        match self {
            WaypointKind::Landing => "Landing",
            WaypointKind::Hover => "Hover",
        }
    }
}

/// Partial transform update; `None` fields are left untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformPatch {
    pub position: Option<Vec3>,
    pub rotation: Option<Vec3>,
    pub scale: Option<Vec3>,
}

impl TransformPatch {
    pub fn position(position: Vec3) -> Self {
        Self { position: Some(position), ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drone {
    pub id: EntityId,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    pub selected: bool,
    pub display_name: String,
    pub asset_id: String,
    pub hovering: bool,
    pub propellers_active: bool,
    /// Carried cargo; kept in sync with `Cargo::drone_id` at all times
    pub cargo_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockingStation {
    pub id: EntityId,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    pub selected: bool,
    pub display_name: String,
    pub asset_id: String,
    /// Normalized platform position: 0 = lowest, 1 = highest (continuous)
    pub lift_position: f32,
    /// Exclusive association: a waypoint is bound by at most one station
    pub bound_waypoint_id: Option<EntityId>,
    /// Slot order: level1-left, level1-right, level2-left, level2-right
    pub shelf_occupancy: [bool; SHELF_SLOTS],
}

impl DockingStation {
    pub fn occupied_count(&self) -> usize {
        self.shelf_occupancy.iter().filter(|s| **s).count()
    }

    /// Lowest-index free shelf slot, if any
    pub fn first_free_slot(&self) -> Option<usize> {
        self.shelf_occupancy.iter().position(|s| !*s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub id: EntityId,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    pub selected: bool,
    pub display_name: String,
    pub asset_id: String,
    pub kind: WaypointKind,
    /// Assigned at creation, never reused
    pub sequence_number: u32,
}

/// Cargo exists only during run mode and is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cargo {
    pub id: EntityId,
    /// Authoritative only while resting; while carried it is recomputed
    /// every tick from the drone position and used as a fallback on detach
    pub position: Vec3,
    pub display_name: String,
    pub asset_id: String,
    /// Carrying drone; kept in sync with `Drone::cargo_id` at all times
    pub drone_id: Option<EntityId>,
}

/// Serializable projection of the editable scene (cargo excluded)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneDocument {
    pub project_number: u32,
    pub next_id: u32,
    pub next_waypoint_seq: u32,
    pub drones: Vec<Drone>,
    pub stations: Vec<DockingStation>,
    pub waypoints: Vec<Waypoint>,
}

/// The authoritative scene state.
pub struct SceneStore {
    project_number: u32,
    drones: Vec<Drone>,
    stations: Vec<DockingStation>,
    waypoints: Vec<Waypoint>,
    cargo: Vec<Cargo>,
    next_id: u32,
    next_waypoint_seq: u32,
    /// Per-kind asset-sequence high-water marks (drone, station,
    /// waypoint, cargo). Deleting the newest entity must not free its
    /// number, so the scan alone is not enough within a session.
    asset_seq: [u32; 4],
}

impl SceneStore {
    pub fn new(project_number: u32) -> Self {
        Self {
            project_number,
            drones: Vec::new(),
            stations: Vec::new(),
            waypoints: Vec::new(),
            cargo: Vec::new(),
            next_id: 1,
            next_waypoint_seq: 1,
            asset_seq: [0; 4],
        }
    }

    fn alloc_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Allocate the externally visible asset id for a new entity.
    ///
    /// Format: `<TYPE><projectNumber><5-digit-seq>`. Scans existing entities
    /// of the same type for the highest sequence and combines that with the
    /// session high-water mark, so loading tolerates gaps while deleting the
    /// newest entity never frees its number.
    fn alloc_asset_id(&mut self, kind: EntityKind) -> String {
        let prefix = format!("{}{}", kind.asset_code(), self.project_number);
        let existing: Vec<&str> = match kind {
            EntityKind::Drone => self.drones.iter().map(|d| d.asset_id.as_str()).collect(),
            EntityKind::Station => self.stations.iter().map(|s| s.asset_id.as_str()).collect(),
            EntityKind::Waypoint => self.waypoints.iter().map(|w| w.asset_id.as_str()).collect(),
            EntityKind::Cargo => self.cargo.iter().map(|c| c.asset_id.as_str()).collect(),
        };
        let max_seq = existing
            .iter()
            .filter_map(|id| id.strip_prefix(&prefix))
            .filter_map(|seq| seq.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        let slot = &mut self.asset_seq[Self::kind_slot(kind)];
        let seq = max_seq.max(*slot) + 1;
        *slot = seq;
        format!("{}{:05}", prefix, seq)
    }

    fn kind_slot(kind: EntityKind) -> usize {
        match kind {
            EntityKind::Drone => 0,
            EntityKind::Station => 1,
            EntityKind::Waypoint => 2,
            EntityKind::Cargo => 3,
        }
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Create an entity of the given kind at a position; returns its id.
    pub fn create(&mut self, kind: EntityKind, position: Vec3) -> EntityId {
        match kind {
            EntityKind::Drone => self.create_drone(position),
            EntityKind::Station => self.create_station(position),
            EntityKind::Waypoint => self.create_waypoint(position),
            EntityKind::Cargo => self.create_cargo(position),
        }
    }

    pub fn create_drone(&mut self, position: Vec3) -> EntityId {
        let id = self.alloc_id();
        let asset_id = self.alloc_asset_id(EntityKind::Drone);
        self.drones.push(Drone {
            id,
            position,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            selected: false,
            display_name: format!("Drone {}", self.drones.len() + 1),
            asset_id,
            hovering: false,
            propellers_active: false,
            cargo_id: None,
        });
        id
    }

    pub fn create_station(&mut self, position: Vec3) -> EntityId {
        let id = self.alloc_id();
        let asset_id = self.alloc_asset_id(EntityKind::Station);
        self.stations.push(DockingStation {
            id,
            position,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            selected: false,
            display_name: format!("Station {}", self.stations.len() + 1),
            asset_id,
            lift_position: 1.0,
            bound_waypoint_id: None,
            shelf_occupancy: [false; SHELF_SLOTS],
        });
        id
    }

    pub fn create_waypoint(&mut self, position: Vec3) -> EntityId {
        let id = self.alloc_id();
        let asset_id = self.alloc_asset_id(EntityKind::Waypoint);
        let seq = self.next_waypoint_seq;
        self.next_waypoint_seq += 1;
        self.waypoints.push(Waypoint {
            id,
            position,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            selected: false,
            display_name: format!("Waypoint {}", seq),
            asset_id,
            kind: WaypointKind::default(),
            sequence_number: seq,
        });
        id
    }

    pub fn create_cargo(&mut self, position: Vec3) -> EntityId {
        let id = self.alloc_id();
        let asset_id = self.alloc_asset_id(EntityKind::Cargo);
        self.cargo.push(Cargo {
            id,
            position,
            display_name: format!("Cargo {}", id.0),
            asset_id,
            drone_id: None,
        });
        id
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Delete an entity. Missing ids are a quiet no-op. Back-references are
    /// always cleaned up: a deleted drone releases its cargo at the cargo's
    /// last absolute position, a deleted cargo clears the carrier's
    /// `cargo_id`, and a deleted waypoint unbinds any station bound to it.
    pub fn delete(&mut self, id: EntityId, kind: EntityKind) {
        match kind {
            EntityKind::Drone => {
                let Some(drone) = self.drones.iter().find(|d| d.id == id) else {
                    return;
                };
                if let Some(cargo_id) = drone.cargo_id {
                    if let Some(cargo) = self.cargo.iter_mut().find(|c| c.id == cargo_id) {
                        cargo.drone_id = None;
                    }
                }
                self.drones.retain(|d| d.id != id);
            }
            EntityKind::Station => {
                self.stations.retain(|s| s.id != id);
            }
            EntityKind::Waypoint => {
                for station in &mut self.stations {
                    if station.bound_waypoint_id == Some(id) {
                        station.bound_waypoint_id = None;
                    }
                }
                self.waypoints.retain(|w| w.id != id);
            }
            EntityKind::Cargo => {
                let Some(cargo) = self.cargo.iter().find(|c| c.id == id) else {
                    return;
                };
                if let Some(drone_id) = cargo.drone_id {
                    if let Some(drone) = self.drones.iter_mut().find(|d| d.id == drone_id) {
                        drone.cargo_id = None;
                    }
                }
                self.cargo.retain(|c| c.id != id);
            }
        }
    }

    // =========================================================================
    // Selection
    // =========================================================================

    /// Select one entity, clearing every other selection.
    pub fn select(&mut self, id: EntityId, kind: EntityKind) {
        self.clear_selection();
        match kind {
            EntityKind::Drone => {
                if let Some(d) = self.drones.iter_mut().find(|d| d.id == id) {
                    d.selected = true;
                }
            }
            EntityKind::Station => {
                if let Some(s) = self.stations.iter_mut().find(|s| s.id == id) {
                    s.selected = true;
                }
            }
            EntityKind::Waypoint => {
                if let Some(w) = self.waypoints.iter_mut().find(|w| w.id == id) {
                    w.selected = true;
                }
            }
            // Cargo exists only in run mode and is not selectable
            EntityKind::Cargo => {}
        }
    }

    pub fn clear_selection(&mut self) {
        for d in &mut self.drones {
            d.selected = false;
        }
        for s in &mut self.stations {
            s.selected = false;
        }
        for w in &mut self.waypoints {
            w.selected = false;
        }
    }

    /// The currently selected entity, if any (at most one scene-wide).
    pub fn selected(&self) -> Option<(EntityKind, EntityId)> {
        if let Some(d) = self.drones.iter().find(|d| d.selected) {
            return Some((EntityKind::Drone, d.id));
        }
        if let Some(s) = self.stations.iter().find(|s| s.selected) {
            return Some((EntityKind::Station, s.id));
        }
        if let Some(w) = self.waypoints.iter().find(|w| w.selected) {
            return Some((EntityKind::Waypoint, w.id));
        }
        None
    }

    // =========================================================================
    // Transform / rename
    // =========================================================================

    /// Apply a partial transform. Missing ids are a quiet no-op.
    pub fn transform(&mut self, id: EntityId, kind: EntityKind, patch: TransformPatch) {
        let (position, rotation, scale) = match kind {
            EntityKind::Drone => match self.drones.iter_mut().find(|d| d.id == id) {
                Some(d) => (&mut d.position, &mut d.rotation, &mut d.scale),
                None => return,
            },
            EntityKind::Station => match self.stations.iter_mut().find(|s| s.id == id) {
                Some(s) => (&mut s.position, &mut s.rotation, &mut s.scale),
                None => return,
            },
            EntityKind::Waypoint => match self.waypoints.iter_mut().find(|w| w.id == id) {
                Some(w) => (&mut w.position, &mut w.rotation, &mut w.scale),
                None => return,
            },
            EntityKind::Cargo => match self.cargo.iter_mut().find(|c| c.id == id) {
                Some(c) => {
                    if let Some(p) = patch.position {
                        c.position = p;
                    }
                    return;
                }
                None => return,
            },
        };
        if let Some(p) = patch.position {
            *position = p;
        }
        if let Some(r) = patch.rotation {
            *rotation = r;
        }
        if let Some(s) = patch.scale {
            *scale = s;
        }
    }

    pub fn rename(&mut self, id: EntityId, kind: EntityKind, name: String) {
        match kind {
            EntityKind::Drone => {
                if let Some(d) = self.drones.iter_mut().find(|d| d.id == id) {
                    d.display_name = name;
                }
            }
            EntityKind::Station => {
                if let Some(s) = self.stations.iter_mut().find(|s| s.id == id) {
                    s.display_name = name;
                }
            }
            EntityKind::Waypoint => {
                if let Some(w) = self.waypoints.iter_mut().find(|w| w.id == id) {
                    w.display_name = name;
                }
            }
            EntityKind::Cargo => {
                if let Some(c) = self.cargo.iter_mut().find(|c| c.id == id) {
                    c.display_name = name;
                }
            }
        }
    }

    // =========================================================================
    // Station binding / waypoint type
    // =========================================================================

    /// Bind a station to a waypoint. A waypoint can be bound by at most one
    /// station, and only Landing waypoints are bindable.
    pub fn bind_station(
        &mut self,
        station_id: EntityId,
        waypoint_id: EntityId,
    ) -> Result<(), SimError> {
        let Some(waypoint) = self.waypoints.iter().find(|w| w.id == waypoint_id) else {
            log::debug!("bind_station: waypoint {:?} missing", waypoint_id);
            return Ok(());
        };
        if waypoint.kind != WaypointKind::Landing {
            return Err(SimError::WaypointNotLandable {
                waypoint: waypoint.display_name.clone(),
            });
        }
        let bound_elsewhere = self
            .stations
            .iter()
            .any(|s| s.id != station_id && s.bound_waypoint_id == Some(waypoint_id));
        if bound_elsewhere {
            return Err(SimError::WaypointAlreadyBound {
                waypoint: waypoint.display_name.clone(),
            });
        }
        if let Some(station) = self.stations.iter_mut().find(|s| s.id == station_id) {
            station.bound_waypoint_id = Some(waypoint_id);
        }
        Ok(())
    }

    pub fn unbind_station(&mut self, station_id: EntityId) {
        if let Some(station) = self.stations.iter_mut().find(|s| s.id == station_id) {
            station.bound_waypoint_id = None;
        }
    }

    /// Change a waypoint's type and revalidate station bindings: a station
    /// may only stay bound to a Landing waypoint.
    pub fn set_waypoint_kind(&mut self, waypoint_id: EntityId, kind: WaypointKind) {
        let Some(waypoint) = self.waypoints.iter_mut().find(|w| w.id == waypoint_id) else {
            return;
        };
        waypoint.kind = kind;
        if kind != WaypointKind::Landing {
            for station in &mut self.stations {
                if station.bound_waypoint_id == Some(waypoint_id) {
                    log::warn!(
                        "waypoint {} became non-landable, unbinding station {}",
                        waypoint_id.0,
                        station.display_name
                    );
                    station.bound_waypoint_id = None;
                }
            }
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn drone(&self, id: EntityId) -> Option<&Drone> {
        self.drones.iter().find(|d| d.id == id)
    }

    pub fn drone_mut(&mut self, id: EntityId) -> Option<&mut Drone> {
        self.drones.iter_mut().find(|d| d.id == id)
    }

    pub fn station(&self, id: EntityId) -> Option<&DockingStation> {
        self.stations.iter().find(|s| s.id == id)
    }

    pub fn station_mut(&mut self, id: EntityId) -> Option<&mut DockingStation> {
        self.stations.iter_mut().find(|s| s.id == id)
    }

    pub fn waypoint(&self, id: EntityId) -> Option<&Waypoint> {
        self.waypoints.iter().find(|w| w.id == id)
    }

    pub fn cargo(&self, id: EntityId) -> Option<&Cargo> {
        self.cargo.iter().find(|c| c.id == id)
    }

    pub fn cargo_mut(&mut self, id: EntityId) -> Option<&mut Cargo> {
        self.cargo.iter_mut().find(|c| c.id == id)
    }

    pub fn drones(&self) -> &[Drone] {
        &self.drones
    }

    pub fn stations(&self) -> &[DockingStation] {
        &self.stations
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn cargo_items(&self) -> &[Cargo] {
        &self.cargo
    }

    /// Generic position read for the motion scheduler
    pub fn position_of(&self, kind: EntityKind, id: EntityId) -> Option<Vec3> {
        match kind {
            EntityKind::Drone => self.drone(id).map(|d| d.position),
            EntityKind::Station => self.station(id).map(|s| s.position),
            EntityKind::Waypoint => self.waypoint(id).map(|w| w.position),
            EntityKind::Cargo => self.cargo(id).map(|c| c.position),
        }
    }

    /// Generic position commit for the motion scheduler
    pub fn set_position(&mut self, kind: EntityKind, id: EntityId, position: Vec3) {
        self.transform(id, kind, TransformPatch::position(position));
    }

    /// The station (if any) whose bound waypoint lies within `radius`
    /// horizontal units of `position`.
    pub fn bound_station_near(&self, position: Vec3, radius: f32) -> Option<EntityId> {
        self.stations
            .iter()
            .filter_map(|s| {
                let waypoint = self.waypoint(s.bound_waypoint_id?)?;
                let dist = position.horizontal_distance(waypoint.position);
                (dist <= radius).then_some((s.id, dist))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    // =========================================================================
    // Snapshot / persistence plumbing
    // =========================================================================

    pub(crate) fn collections_cloned(
        &self,
    ) -> (Vec<Drone>, Vec<DockingStation>, Vec<Waypoint>, Vec<Cargo>) {
        (
            self.drones.clone(),
            self.stations.clone(),
            self.waypoints.clone(),
            self.cargo.clone(),
        )
    }

    pub(crate) fn replace_collections(
        &mut self,
        drones: Vec<Drone>,
        stations: Vec<DockingStation>,
        waypoints: Vec<Waypoint>,
        cargo: Vec<Cargo>,
    ) {
        self.drones = drones;
        self.stations = stations;
        self.waypoints = waypoints;
        self.cargo = cargo;
    }

    pub(crate) fn push_drone(&mut self, drone: Drone) {
        self.drones.push(drone);
    }

    pub(crate) fn push_station(&mut self, station: DockingStation) {
        self.stations.push(station);
    }

    pub(crate) fn push_waypoint(&mut self, waypoint: Waypoint) {
        self.waypoints.push(waypoint);
    }

    /// Serializable edit-mode projection. Cargo is intentionally excluded.
    pub fn to_document(&self) -> SceneDocument {
        SceneDocument {
            project_number: self.project_number,
            next_id: self.next_id,
            next_waypoint_seq: self.next_waypoint_seq,
            drones: self.drones.clone(),
            stations: self.stations.clone(),
            waypoints: self.waypoints.clone(),
        }
    }

    pub fn from_document(doc: SceneDocument) -> Self {
        Self {
            project_number: doc.project_number,
            drones: doc.drones,
            stations: doc.stations,
            waypoints: doc.waypoints,
            cargo: Vec::new(),
            next_id: doc.next_id,
            next_waypoint_seq: doc.next_waypoint_seq,
            asset_seq: [0; 4],
        }
    }
}
