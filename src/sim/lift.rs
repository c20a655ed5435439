//! Docking-station lift actuator
//!
//! The platform is a continuous normalized position in [0,1] driven by a
//! fixed-increment timer, not an eased tween: it must support preemption
//! mid-travel, report progress on every step, and snap exactly onto its
//! target without overshoot. Keep this separate from the phase scheduler -
//! they are genuinely different primitives.

use super::math::Vec3;
use super::scene::{DockingStation, EntityId, SceneStore};

/// Normalized distance covered per step
pub const LIFT_STEP: f32 = 0.02;
/// Seconds between steps
pub const LIFT_STEP_INTERVAL: f64 = 0.08;
/// `drive_to_level` is a no-op within this distance of the target
pub const LIFT_LEVEL_TOLERANCE: f32 = 0.05;
/// Positions this close to 0 or 1 are displayed as the exact extreme
pub const LIFT_SNAP_EPSILON: f32 = 0.01;

/// Full platform travel in world units (normalized 0..1 maps onto this)
pub const LIFT_TRAVEL: f32 = 3.0;
/// Height of one shelf compartment in world units
pub const COMPARTMENT_HEIGHT: f32 = 1.2;
/// Normalized platform position for shelf level 1
pub const LEVEL1_POSITION: f32 = 0.1;

/// Lateral offset of the two slots on each shelf level
pub const SHELF_LATERAL_OFFSET: f32 = 0.5;
/// Depth offset of the shelf behind the platform
pub const SHELF_DEPTH_OFFSET: f32 = 0.4;
/// Shelf floor height above the station base for level 1
pub const SHELF_BASE_HEIGHT: f32 = 0.3;

/// Normalized target for a discrete shelf level. Levels outside {1,2}
/// are invalid.
pub fn level_position(level: u8) -> Option<f32> {
    match level {
        1 => Some(LEVEL1_POSITION),
        2 => Some(LEVEL1_POSITION + COMPARTMENT_HEIGHT / LIFT_TRAVEL),
        _ => None,
    }
}

/// World position of the platform surface at the station's current lift
/// position - where a detached cargo first lands.
pub fn platform_surface(station: &DockingStation) -> Vec3 {
    station.position + Vec3::new(0.0, station.lift_position * LIFT_TRAVEL, 0.0)
}

/// Fixed world coordinate of a shelf slot (slot order: level1-left,
/// level1-right, level2-left, level2-right).
pub fn shelf_slot_position(station: &DockingStation, slot: usize) -> Vec3 {
    let lateral = if slot % 2 == 0 {
        -SHELF_LATERAL_OFFSET
    } else {
        SHELF_LATERAL_OFFSET
    };
    let level = (slot / 2) as f32;
    station.position
        + Vec3::new(
            lateral,
            SHELF_BASE_HEIGHT + level * COMPARTMENT_HEIGHT,
            SHELF_DEPTH_OFFSET,
        )
}

/// Display text for a lift position.
pub fn lift_status(position: f32) -> String {
    if position <= LIFT_SNAP_EPSILON {
        "bottom".to_string()
    } else if position >= 1.0 - LIFT_SNAP_EPSILON {
        "top".to_string()
    } else {
        format!("moving ({}%)", (position * 100.0).round() as i32)
    }
}

/// Follow-up the simulation performs when a drive arrives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiftDone {
    None,
    /// Shelf-store flow: teleport the cargo onto its slot and mark it
    StoreCargo {
        station: EntityId,
        slot: usize,
        cargo: EntityId,
    },
}

struct LiftDrive {
    station: EntityId,
    target: f32,
    last_step: f64,
    done: LiftDone,
}

/// Result of one advance step over all drives.
#[derive(Debug, Default)]
pub struct LiftAdvance {
    pub completed: Vec<LiftDone>,
    /// True when any platform stepped (progress must reach the projector)
    pub status_dirty: bool,
}

/// All in-flight lift drives, at most one per station.
#[derive(Default)]
pub struct LiftBank {
    drives: Vec<LiftDrive>,
}

impl LiftBank {
    pub fn new() -> Self {
        Self { drives: Vec::new() }
    }

    pub fn is_idle(&self) -> bool {
        self.drives.is_empty()
    }

    /// Preempt any drive for this station. Safe at any tick boundary.
    pub fn cancel(&mut self, station: EntityId) {
        self.drives.retain(|d| d.station != station);
    }

    fn start(&mut self, station: EntityId, target: f32, done: LiftDone, now: f64) {
        self.cancel(station);
        self.drives.push(LiftDrive { station, target, last_step: now, done });
    }

    /// Drive the platform to an extreme (0 or 1). No-op if already there.
    pub fn drive_to_extreme(&mut self, scene: &SceneStore, station: EntityId, up: bool, now: f64) {
        let Some(s) = scene.station(station) else {
            return;
        };
        let target = if up { 1.0 } else { 0.0 };
        if s.lift_position == target {
            log::debug!("lift {} already at {}", s.display_name, lift_status(target));
            return;
        }
        self.start(station, target, LiftDone::None, now);
    }

    /// Drive the platform to a discrete shelf level.
    ///
    /// Returns the completion tag immediately when the platform is already
    /// within tolerance of the level (the caller treats that as an arrival);
    /// otherwise the tag is emitted by `advance()` on the snapping step.
    pub fn drive_to_level(
        &mut self,
        scene: &SceneStore,
        station: EntityId,
        level: u8,
        done: LiftDone,
        now: f64,
    ) -> Option<LiftDone> {
        let Some(target) = level_position(level) else {
            log::warn!("invalid lift level {}", level);
            return None;
        };
        let Some(s) = scene.station(station) else {
            return None;
        };
        if (s.lift_position - target).abs() <= LIFT_LEVEL_TOLERANCE {
            log::debug!("lift {} already near level {}", s.display_name, level);
            return Some(done);
        }
        self.start(station, target, done, now);
        None
    }

    /// Step every drive that is due. Snaps exactly onto the target on the
    /// final step - never overshoots, never leaves float residue.
    pub fn advance(&mut self, scene: &mut SceneStore, now: f64) -> LiftAdvance {
        let mut result = LiftAdvance::default();
        let mut finished: Vec<usize> = Vec::new();

        for (i, drive) in self.drives.iter_mut().enumerate() {
            let Some(station) = scene.station_mut(drive.station) else {
                finished.push(i);
                continue;
            };
            while now - drive.last_step >= LIFT_STEP_INTERVAL {
                drive.last_step += LIFT_STEP_INTERVAL;
                result.status_dirty = true;

                let delta = drive.target - station.lift_position;
                if delta.abs() <= LIFT_STEP {
                    station.lift_position = drive.target;
                    result.completed.push(drive.done);
                    finished.push(i);
                    break;
                }
                station.lift_position += LIFT_STEP * delta.signum();
            }
        }

        for i in finished.into_iter().rev() {
            self.drives.remove(i);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::scene::SceneStore;

    fn station_scene(lift_position: f32) -> (SceneStore, EntityId) {
        let mut scene = SceneStore::new(1);
        let s = scene.create_station(Vec3::ZERO);
        scene.station_mut(s).unwrap().lift_position = lift_position;
        (scene, s)
    }

    fn run(bank: &mut LiftBank, scene: &mut SceneStore) -> Vec<LiftDone> {
        let mut completed = Vec::new();
        let mut now = 0.0;
        while !bank.is_idle() && now < 60.0 {
            now += 1.0 / 60.0;
            completed.extend(bank.advance(scene, now).completed);
        }
        completed
    }

    #[test]
    fn test_drive_up_terminates_exactly_at_one() {
        for start in [0.0, 0.013, 0.5, 0.987] {
            let (mut scene, s) = station_scene(start);
            let mut bank = LiftBank::new();
            bank.drive_to_extreme(&scene, s, true, 0.0);
            run(&mut bank, &mut scene);
            assert_eq!(scene.station(s).unwrap().lift_position, 1.0, "start {}", start);
        }
    }

    #[test]
    fn test_drive_down_terminates_exactly_at_zero() {
        let (mut scene, s) = station_scene(1.0);
        let mut bank = LiftBank::new();
        bank.drive_to_extreme(&scene, s, false, 0.0);
        run(&mut bank, &mut scene);
        assert_eq!(scene.station(s).unwrap().lift_position, 0.0);
    }

    #[test]
    fn test_drive_to_extreme_is_noop_at_extreme() {
        let (scene, s) = station_scene(1.0);
        let mut bank = LiftBank::new();
        bank.drive_to_extreme(&scene, s, true, 0.0);
        assert!(bank.is_idle());
    }

    #[test]
    fn test_level_targeting_is_deterministic() {
        let (mut scene, s) = station_scene(1.0);
        let mut bank = LiftBank::new();

        bank.drive_to_level(&scene, s, 1, LiftDone::None, 0.0);
        run(&mut bank, &mut scene);
        let first = scene.station(s).unwrap().lift_position;

        bank.drive_to_level(&scene, s, 2, LiftDone::None, 0.0);
        run(&mut bank, &mut scene);
        bank.drive_to_level(&scene, s, 1, LiftDone::None, 0.0);
        run(&mut bank, &mut scene);
        let second = scene.station(s).unwrap().lift_position;

        assert!((first - second).abs() < 0.001);
        assert!((first - LEVEL1_POSITION).abs() < 0.001);
    }

    #[test]
    fn test_drive_to_level_rejects_bad_level() {
        let (scene, s) = station_scene(1.0);
        let mut bank = LiftBank::new();
        assert_eq!(bank.drive_to_level(&scene, s, 3, LiftDone::None, 0.0), None);
        assert!(bank.is_idle());
    }

    #[test]
    fn test_drive_to_level_within_tolerance_reports_arrival() {
        let (scene, s) = station_scene(LEVEL1_POSITION + 0.02);
        let mut bank = LiftBank::new();
        let done = LiftDone::StoreCargo { station: s, slot: 0, cargo: EntityId(99) };
        assert_eq!(bank.drive_to_level(&scene, s, 1, done, 0.0), Some(done));
        assert!(bank.is_idle());
    }

    #[test]
    fn test_preemption_mid_travel() {
        let (mut scene, s) = station_scene(1.0);
        let mut bank = LiftBank::new();
        bank.drive_to_extreme(&scene, s, false, 0.0);
        // A few steps down, then reverse
        bank.advance(&mut scene, 0.5);
        let mid = scene.station(s).unwrap().lift_position;
        assert!(mid < 1.0 && mid > 0.0);
        bank.drive_to_extreme(&scene, s, true, 0.5);
        run(&mut bank, &mut scene);
        assert_eq!(scene.station(s).unwrap().lift_position, 1.0);
    }

    #[test]
    fn test_lift_status_text() {
        assert_eq!(lift_status(0.0), "bottom");
        assert_eq!(lift_status(0.005), "bottom");
        assert_eq!(lift_status(1.0), "top");
        assert_eq!(lift_status(0.995), "top");
        assert_eq!(lift_status(0.62), "moving (62%)");
    }
}
