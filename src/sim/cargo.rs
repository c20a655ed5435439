//! Cargo transfer and drone flight commands
//!
//! The per-drone hand-off state machine: dispatch creates and attaches a
//! cargo, takeoff flies the drone out, and remove either stores the cargo
//! at a bound docking station (shelf-slot allocation, lift choreography,
//! concurrent return flight) or abandons it. All commands are run-mode
//! only and resolve their errors at the call boundary - nothing here can
//! fail inside a tick.

use super::error::SimError;
use super::lift::{self, LiftDone};
use super::math::Vec3;
use super::motion::{flight_phases, PhaseAction};
use super::scene::{EntityId, EntityKind, TransformPatch, CARGO_CARRY_OFFSET};
use super::status::DroneActivity;
use super::{Deferred, Mode, Simulation};

/// Horizontal radius within which a bound waypoint accepts a cargo drop
pub const STORE_RADIUS: f32 = 2.0;
/// Pause on the shelf level before the lift returns to the top
pub const LIFT_SETTLE_DELAY: f64 = 1.5;

impl Simulation {
    /// Fly a drone to a waypoint along the standard three-phase plan.
    /// Valid only from the ground; a command while airborne is a quiet
    /// no-op.
    pub fn take_off(&mut self, drone: EntityId, waypoint: EntityId, now: f64) {
        if self.mode != Mode::Run {
            log::debug!("take_off outside run mode ignored");
            return;
        }
        if self.scheduler.is_active(EntityKind::Drone, drone) {
            log::debug!("take_off for drone {} ignored: already in flight", drone.0);
            return;
        }
        let Some(target) = self.scene.waypoint(waypoint).map(|w| w.position) else {
            return;
        };
        let Some(d) = self.scene.drone_mut(drone) else {
            return;
        };
        d.propellers_active = true;
        let from = d.position;
        self.status.set_activity(drone, DroneActivity::Flying);
        self.scheduler.start(
            EntityKind::Drone,
            drone,
            flight_phases(from, target, PhaseAction::FlightArrived { drone, waypoint }),
            &self.scene,
            now,
        );
        self.refresh_panel(now);
    }

    /// Create a cargo slightly below the drone and attach it. Remembers
    /// the drone's position as the origin for the later return flight.
    /// Dispatch while already carrying is a quiet no-op.
    pub fn dispatch_cargo(&mut self, drone: EntityId, now: f64) {
        if self.mode != Mode::Run {
            log::debug!("dispatch_cargo outside run mode ignored");
            return;
        }
        let Some(d) = self.scene.drone(drone) else {
            return;
        };
        if d.cargo_id.is_some() {
            log::debug!("drone {} already carrying, dispatch ignored", d.display_name);
            return;
        }
        let origin = d.position;
        let cargo = self
            .scene
            .create_cargo(origin - Vec3::new(0.0, CARGO_CARRY_OFFSET, 0.0));
        if let Some(c) = self.scene.cargo_mut(cargo) {
            c.drone_id = Some(drone);
        }
        if let Some(d) = self.scene.drone_mut(drone) {
            d.cargo_id = Some(cargo);
        }
        self.origins.insert(drone, origin);
        self.refresh_panel(now);
    }

    /// Drop the drone's cargo.
    ///
    /// Near a station's bound waypoint the cargo goes onto the lowest
    /// free shelf slot: detach, land on the platform surface, drive the
    /// lift to the slot's level, teleport onto the shelf on arrival (the
    /// last leg is intentionally instantaneous), then raise the lift
    /// again after a settle delay. The drone flies back to its
    /// pre-dispatch origin concurrently. With no station in range the
    /// cargo is abandoned and deleted.
    pub fn remove_cargo(&mut self, drone: EntityId, now: f64) -> Result<(), SimError> {
        if self.mode != Mode::Run {
            log::debug!("remove_cargo outside run mode ignored");
            return Ok(());
        }
        let Some(d) = self.scene.drone(drone) else {
            return Ok(());
        };
        let Some(cargo) = d.cargo_id else {
            log::debug!("drone {} has no cargo to remove", d.display_name);
            return Ok(());
        };
        let drone_pos = d.position;

        let Some(station_id) = self.scene.bound_station_near(drone_pos, STORE_RADIUS) else {
            log::debug!("no bound station in range, abandoning cargo {}", cargo.0);
            self.scene.delete(cargo, EntityKind::Cargo);
            self.refresh_panel(now);
            return Ok(());
        };

        let Some(station) = self.scene.station(station_id) else {
            return Ok(());
        };
        let Some(slot) = station.first_free_slot() else {
            return Err(SimError::ShelfFull { station: station.display_name.clone() });
        };
        let surface = lift::platform_surface(station);

        // Detach both sides atomically, cargo rests on the platform
        if let Some(d) = self.scene.drone_mut(drone) {
            d.cargo_id = None;
        }
        if let Some(c) = self.scene.cargo_mut(cargo) {
            c.drone_id = None;
        }
        self.scene
            .transform(cargo, EntityKind::Cargo, TransformPatch::position(surface));

        let level = (slot / 2) as u8 + 1;
        let done = LiftDone::StoreCargo { station: station_id, slot, cargo };
        if let Some(done) = self.lifts.drive_to_level(&self.scene, station_id, level, done, now) {
            // Lift already at the level: store immediately
            self.handle_lift_done(done, now);
        }

        // Return flight runs concurrently with the store sequence
        let origin = self.origins.remove(&drone).unwrap_or(drone_pos);
        if let Some(d) = self.scene.drone_mut(drone) {
            d.propellers_active = true;
        }
        self.status.set_activity(drone, DroneActivity::Returning);
        self.scheduler.start(
            EntityKind::Drone,
            drone,
            flight_phases(drone_pos, origin, PhaseAction::ReturnCompleted { drone }),
            &self.scene,
            now,
        );
        self.refresh_panel(now);
        Ok(())
    }

    /// Drive a station's lift toward an extreme. Run-mode command.
    pub fn drive_lift(&mut self, station: EntityId, up: bool, now: f64) {
        if self.mode != Mode::Run {
            log::debug!("drive_lift outside run mode ignored");
            return;
        }
        self.lifts.drive_to_extreme(&self.scene, station, up, now);
    }

    /// Drive a station's lift to a discrete shelf level. Run-mode command.
    pub fn drive_lift_to_level(&mut self, station: EntityId, level: u8, now: f64) {
        if self.mode != Mode::Run {
            log::debug!("drive_lift_to_level outside run mode ignored");
            return;
        }
        self.lifts
            .drive_to_level(&self.scene, station, level, LiftDone::None, now);
    }

    pub(crate) fn handle_lift_done(&mut self, done: LiftDone, now: f64) {
        match done {
            LiftDone::None => {}
            LiftDone::StoreCargo { station, slot, cargo } => {
                let Some(s) = self.scene.station(station) else {
                    return;
                };
                let shelf = lift::shelf_slot_position(s, slot);
                self.scene
                    .transform(cargo, EntityKind::Cargo, TransformPatch::position(shelf));
                if let Some(s) = self.scene.station_mut(station) {
                    s.shelf_occupancy[slot] = true;
                }
                self.deferred
                    .push((now + LIFT_SETTLE_DELAY, Deferred::RaiseLift { station }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::lift::{shelf_slot_position, COMPARTMENT_HEIGHT, LEVEL1_POSITION, LIFT_TRAVEL};

    const DT: f64 = 1.0 / 60.0;

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

    /// Drone bound-station fixture: station at the waypoint, drone landed
    /// there carrying a freshly dispatched cargo.
    fn delivery_fixture() -> (Simulation, EntityId, EntityId, f64) {
        let mut sim = Simulation::new(1);
        let d = sim.scene.create_drone(Vec3::ZERO);
        let w = sim.scene.create_waypoint(Vec3::new(10.0, 0.0, 10.0));
        let s = sim.scene.create_station(Vec3::new(11.0, 0.0, 10.0));
        sim.scene.bind_station(s, w).unwrap();

        sim.toggle_run_mode(0.0);
        sim.dispatch_cargo(d, 0.0);
        sim.take_off(d, w, 0.0);
        let now = settle(&mut sim, 0.0);
        (sim, d, s, now)
    }

    #[test]
    fn test_dispatch_creates_attached_cargo() {
        let mut sim = Simulation::new(1);
        let d = sim.scene.create_drone(Vec3::new(0.0, 2.0, 0.0));
        sim.toggle_run_mode(0.0);
        sim.dispatch_cargo(d, 0.0);

        let cargo_id = sim.scene.drone(d).unwrap().cargo_id.unwrap();
        let cargo = sim.scene.cargo(cargo_id).unwrap();
        assert_eq!(cargo.drone_id, Some(d));
        assert_eq!(cargo.position, Vec3::new(0.0, 2.0 - CARGO_CARRY_OFFSET, 0.0));
    }

    #[test]
    fn test_dispatch_while_carrying_is_noop() {
        let mut sim = Simulation::new(1);
        let d = sim.scene.create_drone(Vec3::ZERO);
        sim.toggle_run_mode(0.0);
        sim.dispatch_cargo(d, 0.0);
        sim.dispatch_cargo(d, 0.0);
        assert_eq!(sim.scene.cargo_items().len(), 1);
    }

    #[test]
    fn test_carried_cargo_follows_drone_each_tick() {
        let mut sim = Simulation::new(1);
        let d = sim.scene.create_drone(Vec3::ZERO);
        let w = sim.scene.create_waypoint(Vec3::new(6.0, 0.0, 0.0));
        sim.toggle_run_mode(0.0);
        sim.dispatch_cargo(d, 0.0);
        sim.take_off(d, w, 0.0);
        let cargo_id = sim.scene.drone(d).unwrap().cargo_id.unwrap();

        sim.tick(1.0);
        let drone_pos = sim.scene.drone(d).unwrap().position;
        let cargo_pos = sim.scene.cargo(cargo_id).unwrap().position;
        assert!(drone_pos.y > 0.0);
        assert_eq!(cargo_pos, drone_pos - Vec3::new(0.0, CARGO_CARRY_OFFSET, 0.0));
    }

    #[test]
    fn test_store_at_bound_station() {
        let (mut sim, d, s, now) = delivery_fixture();
        let cargo_id = sim.scene.drone(d).unwrap().cargo_id.unwrap();

        sim.remove_cargo(d, now).unwrap();
        let end = settle(&mut sim, now);

        let station = sim.scene.station(s).unwrap();
        assert_eq!(station.shelf_occupancy, [true, false, false, false]);
        // Lift raised back to the top after the settle delay
        assert_eq!(station.lift_position, 1.0);
        assert!(end > now + LIFT_SETTLE_DELAY);

        let cargo = sim.scene.cargo(cargo_id).unwrap();
        assert_eq!(cargo.drone_id, None);
        assert_eq!(cargo.position, shelf_slot_position(station, 0));

        let drone = sim.scene.drone(d).unwrap();
        assert_eq!(drone.cargo_id, None);
        assert_eq!(drone.position, Vec3::ZERO);
        assert!(!drone.propellers_active);
        assert!(!drone.hovering);
    }

    #[test]
    fn test_store_fills_last_free_slot() {
        let (mut sim, d, s, now) = delivery_fixture();
        sim.scene.station_mut(s).unwrap().shelf_occupancy = [true, true, true, false];

        sim.remove_cargo(d, now).unwrap();
        settle(&mut sim, now);

        let station = sim.scene.station(s).unwrap();
        assert_eq!(station.occupied_count(), 4);
        assert_eq!(sim.scene.drone(d).unwrap().cargo_id, None);
    }

    #[test]
    fn test_store_rejected_when_shelves_full() {
        let (mut sim, d, s, now) = delivery_fixture();
        sim.scene.station_mut(s).unwrap().shelf_occupancy = [true; 4];
        let cargo_id = sim.scene.drone(d).unwrap().cargo_id.unwrap();

        let err = sim.remove_cargo(d, now).unwrap_err();
        assert!(matches!(err, SimError::ShelfFull { .. }));
        // No state change on rejection
        assert_eq!(sim.scene.station(s).unwrap().shelf_occupancy, [true; 4]);
        assert_eq!(sim.scene.drone(d).unwrap().cargo_id, Some(cargo_id));
        assert_eq!(sim.scene.cargo(cargo_id).unwrap().drone_id, Some(d));
    }

    #[test]
    fn test_abandon_away_from_stations() {
        let mut sim = Simulation::new(1);
        let d = sim.scene.create_drone(Vec3::ZERO);
        sim.toggle_run_mode(0.0);
        sim.dispatch_cargo(d, 0.0);
        let cargo_id = sim.scene.drone(d).unwrap().cargo_id.unwrap();

        sim.remove_cargo(d, 0.0).unwrap();
        assert!(sim.scene.cargo(cargo_id).is_none());
        assert_eq!(sim.scene.drone(d).unwrap().cargo_id, None);
        // No lift/shelf interaction and no return flight
        assert!(sim.is_idle());
    }

    #[test]
    fn test_second_level_slot_drives_lift_to_level_two() {
        let (mut sim, d, s, now) = delivery_fixture();
        sim.scene.station_mut(s).unwrap().shelf_occupancy = [true, true, false, false];

        sim.remove_cargo(d, now).unwrap();
        // The store sequence targets level 2 for slot index 2
        let mut t = now;
        let mut lowest = f32::MAX;
        let mut guard = 0;
        while !sim.is_idle() {
            t += DT;
            sim.tick(t);
            lowest = lowest.min(sim.scene.station(s).unwrap().lift_position);
            guard += 1;
            assert!(guard < 120_000, "simulation did not settle");
        }
        let level2 = LEVEL1_POSITION + COMPARTMENT_HEIGHT / LIFT_TRAVEL;
        assert!((lowest - level2).abs() < 0.001);
        assert_eq!(sim.scene.station(s).unwrap().shelf_occupancy, [true, true, true, false]);
    }

    #[test]
    fn test_remove_without_cargo_is_noop() {
        let mut sim = Simulation::new(1);
        let d = sim.scene.create_drone(Vec3::ZERO);
        sim.toggle_run_mode(0.0);
        sim.remove_cargo(d, 0.0).unwrap();
        assert!(sim.scene.cargo_items().is_empty());
    }
}
