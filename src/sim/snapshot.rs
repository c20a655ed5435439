//! Edit/run mode snapshot
//!
//! Entering run mode captures a deep copy of the scene collections;
//! leaving run mode puts the editable state back exactly as it was,
//! no matter which motions ran in between. Cargo never survives the
//! return to edit mode.

use super::scene::{Cargo, DockingStation, Drone, EntityId, SceneStore, Waypoint};

/// Deep copy of the scene taken at run-mode entry.
pub struct SceneSnapshot {
    drones: Vec<Drone>,
    stations: Vec<DockingStation>,
    waypoints: Vec<Waypoint>,
    /// Captured with the rest; run-mode exit discards all cargo
    #[allow(dead_code)]
    cargo: Vec<Cargo>,
}

impl SceneSnapshot {
    pub fn capture(scene: &SceneStore) -> Self {
        let (drones, stations, waypoints, cargo) = scene.collections_cloned();
        Self { drones, stations, waypoints, cargo }
    }

    /// Restore the editable state, consuming the snapshot.
    ///
    /// Rules:
    /// - Drones, stations and waypoints revert to their captured fields.
    /// - Entities created during run mode (disallowed by policy, but must
    ///   not crash) are kept as-is, appended after the restored set.
    /// - All cargo is discarded and every drone's `cargo_id` cleared.
    /// - The selection current at exit time survives; everything else is
    ///   bit-for-bit the pre-capture state.
    pub fn restore(self, scene: &mut SceneStore) {
        let selected = scene.selected();

        let known_drones: Vec<EntityId> = self.drones.iter().map(|d| d.id).collect();
        let known_stations: Vec<EntityId> = self.stations.iter().map(|s| s.id).collect();
        let known_waypoints: Vec<EntityId> = self.waypoints.iter().map(|w| w.id).collect();

        let (live_drones, live_stations, live_waypoints, _live_cargo) =
            scene.collections_cloned();

        let mut drones = self.drones;
        for drone in &mut drones {
            drone.cargo_id = None;
        }
        scene.replace_collections(drones, self.stations, self.waypoints, Vec::new());

        // Run-created strays: keep them rather than fail
        for drone in live_drones {
            if !known_drones.contains(&drone.id) {
                log::warn!("drone {} created during run mode, keeping", drone.display_name);
                let mut drone = drone;
                drone.cargo_id = None;
                scene.push_drone(drone);
            }
        }
        for station in live_stations {
            if !known_stations.contains(&station.id) {
                scene.push_station(station);
            }
        }
        for waypoint in live_waypoints {
            if !known_waypoints.contains(&waypoint.id) {
                scene.push_waypoint(waypoint);
            }
        }

        scene.clear_selection();
        if let Some((kind, id)) = selected {
            scene.select(id, kind);
        }
    }
}
