//! Phase-sequence motion scheduler
//!
//! A cooperative, tick-driven engine: `advance()` runs once per rendering
//! frame while at least one sequence is active and interpolates every
//! active phase toward its target. Phases are explicit records consumed
//! in order - no nested callbacks - so cancellation and "which phase am I
//! in" inspection stay trivial.
//!
//! Commits into the scene store are rate-limited separately for
//! authoritative positions and for derived status text. Both limits are
//! soft: a late tick still commits, it is never skipped indefinitely.

use super::math::Vec3;
use super::scene::{EntityId, EntityKind, SceneStore};

/// Vertical speed while climbing to cruise altitude (units/s)
pub const RISE_RATE: f32 = 2.5;
/// Horizontal speed at cruise altitude (units/s)
pub const TRANSLATE_RATE: f32 = 6.0;
/// Vertical speed while descending onto the destination (units/s)
pub const DESCEND_RATE: f32 = 2.0;
/// Fixed cruise altitude for drone flights
pub const CRUISE_ALTITUDE: f32 = 8.0;

/// Authoritative position commits: at most 60 per second
pub const STATE_COMMIT_INTERVAL: f64 = 1.0 / 60.0;
/// Derived display text: at most 10 updates per second
pub const STATUS_COMMIT_INTERVAL: f64 = 1.0 / 10.0;

/// Easing function applied to a phase's normalized progress.
///
/// Flight phases use ease-out for the climb, ease-in-out for the cruise
/// and ease-in for the descent; this shapes perceived deceleration only,
/// endpoints are always exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
}

impl Easing {
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseIn => t * t,
            Easing::EaseOut => t * (2.0 - t),
            Easing::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
        }
    }
}

/// What the simulation should do when a phase completes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhaseAction {
    None,
    /// Outbound flight reached its target waypoint
    FlightArrived { drone: EntityId, waypoint: EntityId },
    /// Return flight reached the drone's pre-dispatch origin
    ReturnCompleted { drone: EntityId },
}

/// One timed interpolation toward a positional target.
#[derive(Debug, Clone)]
pub struct Phase {
    pub target: Vec3,
    /// Seconds; derived from distance / rate, never from external input
    pub duration: f32,
    pub easing: Easing,
    pub action: PhaseAction,
}

struct ActiveSequence {
    kind: EntityKind,
    id: EntityId,
    phases: Vec<Phase>,
    current: usize,
    /// Tick time at which the current phase began
    phase_start: f64,
    /// Live position captured when the current phase began
    start_position: Vec3,
    last_state_commit: f64,
    last_status_commit: f64,
}

/// Result of one advance step.
#[derive(Debug, Default)]
pub struct AdvanceResult {
    /// Completion actions emitted this tick, in registration order
    pub actions: Vec<PhaseAction>,
    /// True when any sequence crossed its status-text commit interval
    pub status_dirty: bool,
}

/// Drives all active phase sequences. At most one sequence per entity;
/// starting a new one cancels the old immediately (last writer wins).
#[derive(Default)]
pub struct MotionScheduler {
    active: Vec<ActiveSequence>,
}

impl MotionScheduler {
    pub fn new() -> Self {
        Self { active: Vec::new() }
    }

    /// Start a sequence for an entity, replacing any active one. The first
    /// phase starts from the entity's current live position, never from an
    /// old target. A missing entity is a quiet no-op.
    pub fn start(
        &mut self,
        kind: EntityKind,
        id: EntityId,
        phases: Vec<Phase>,
        scene: &SceneStore,
        now: f64,
    ) {
        let Some(start_position) = scene.position_of(kind, id) else {
            log::debug!("motion start for missing entity {:?}/{:?}", kind, id);
            return;
        };
        if phases.is_empty() {
            return;
        }
        self.cancel(kind, id);
        self.active.push(ActiveSequence {
            kind,
            id,
            phases,
            current: 0,
            phase_start: now,
            start_position,
            last_state_commit: now,
            last_status_commit: now,
        });
    }

    /// Drop an entity's active sequence. Always safe: phases hold no
    /// external resources, so no cleanup handshake is needed.
    pub fn cancel(&mut self, kind: EntityKind, id: EntityId) {
        self.active.retain(|s| !(s.kind == kind && s.id == id));
    }

    pub fn is_active(&self, kind: EntityKind, id: EntityId) -> bool {
        self.active.iter().any(|s| s.kind == kind && s.id == id)
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    /// Index of the entity's current phase, if it has an active sequence.
    pub fn current_phase(&self, kind: EntityKind, id: EntityId) -> Option<usize> {
        self.active
            .iter()
            .find(|s| s.kind == kind && s.id == id)
            .map(|s| s.current)
    }

    /// Overall sequence progress in [0,1] for status display.
    pub fn progress(&self, kind: EntityKind, id: EntityId, now: f64) -> Option<f32> {
        let seq = self.active.iter().find(|s| s.kind == kind && s.id == id)?;
        let phase = &seq.phases[seq.current];
        let t = if phase.duration <= 0.0 {
            1.0
        } else {
            (((now - seq.phase_start) as f32) / phase.duration).clamp(0.0, 1.0)
        };
        Some((seq.current as f32 + t) / seq.phases.len() as f32)
    }

    /// Advance every active sequence to `now`, committing interpolated
    /// positions into the store. A sequence whose entity has disappeared
    /// is dropped quietly; a tick never fails.
    pub fn advance(&mut self, scene: &mut SceneStore, now: f64) -> AdvanceResult {
        let mut result = AdvanceResult::default();
        let mut retired: Vec<usize> = Vec::new();

        for (i, seq) in self.active.iter_mut().enumerate() {
            if scene.position_of(seq.kind, seq.id).is_none() {
                log::debug!("entity {:?} vanished mid-animation, dropping sequence", seq.id);
                retired.push(i);
                continue;
            }

            // A very late tick may complete several phases at once.
            loop {
                let phase = &seq.phases[seq.current];
                let elapsed = (now - seq.phase_start) as f32;

                if elapsed >= phase.duration {
                    // Clamp exactly to the target - no float drift at
                    // phase boundaries.
                    scene.set_position(seq.kind, seq.id, phase.target);
                    seq.last_state_commit = now;
                    seq.last_status_commit = now;
                    result.actions.push(phase.action);
                    result.status_dirty = true;

                    seq.phase_start += phase.duration as f64;
                    seq.start_position = phase.target;
                    seq.current += 1;
                    if seq.current >= seq.phases.len() {
                        retired.push(i);
                        break;
                    }
                    continue;
                }

                let t = phase.easing.apply(elapsed / phase.duration);
                let position = seq.start_position.lerp(phase.target, t);
                if now - seq.last_state_commit >= STATE_COMMIT_INTERVAL {
                    scene.set_position(seq.kind, seq.id, position);
                    seq.last_state_commit = now;
                }
                if now - seq.last_status_commit >= STATUS_COMMIT_INTERVAL {
                    seq.last_status_commit = now;
                    result.status_dirty = true;
                }
                break;
            }
        }

        for i in retired.into_iter().rev() {
            self.active.remove(i);
        }
        result
    }
}

/// Build the standard three-phase flight plan: rise to cruise altitude,
/// translate horizontally, descend onto the destination. Durations are
/// per-phase distance over the fixed per-phase rates.
pub fn flight_phases(from: Vec3, to: Vec3, arrival: PhaseAction) -> Vec<Phase> {
    let cruise_from = from.with_y(CRUISE_ALTITUDE);
    let cruise_to = to.with_y(CRUISE_ALTITUDE);
    vec![
        Phase {
            target: cruise_from,
            duration: (CRUISE_ALTITUDE - from.y).abs() / RISE_RATE,
            easing: Easing::EaseOut,
            action: PhaseAction::None,
        },
        Phase {
            target: cruise_to,
            duration: cruise_from.horizontal_distance(cruise_to) / TRANSLATE_RATE,
            easing: Easing::EaseInOut,
            action: PhaseAction::None,
        },
        Phase {
            target: to,
            duration: (CRUISE_ALTITUDE - to.y).abs() / DESCEND_RATE,
            easing: Easing::EaseIn,
            action: arrival,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drone_scene() -> (SceneStore, EntityId) {
        let mut scene = SceneStore::new(1);
        let d = scene.create_drone(Vec3::ZERO);
        (scene, d)
    }

    fn run_until_idle(scheduler: &mut MotionScheduler, scene: &mut SceneStore) -> Vec<PhaseAction> {
        let mut actions = Vec::new();
        let mut now = 0.0;
        while !scheduler.is_idle() && now < 120.0 {
            now += 1.0 / 60.0;
            actions.extend(scheduler.advance(scene, now).actions);
        }
        actions
    }

    #[test]
    fn test_easing_endpoints_are_exact() {
        for easing in [Easing::Linear, Easing::EaseIn, Easing::EaseOut, Easing::EaseInOut] {
            assert_eq!(easing.apply(0.0), 0.0);
            assert_eq!(easing.apply(1.0), 1.0);
        }
    }

    #[test]
    fn test_sequence_ends_exactly_on_target() {
        let (mut scene, d) = drone_scene();
        let mut scheduler = MotionScheduler::new();
        let target = Vec3::new(10.0, 0.0, 10.0);
        scheduler.start(
            EntityKind::Drone,
            d,
            flight_phases(Vec3::ZERO, target, PhaseAction::ReturnCompleted { drone: d }),
            &scene,
            0.0,
        );
        let actions = run_until_idle(&mut scheduler, &mut scene);
        assert_eq!(scene.drone(d).unwrap().position, target);
        assert!(actions.contains(&PhaseAction::ReturnCompleted { drone: d }));
    }

    #[test]
    fn test_rise_phase_reaches_cruise_altitude() {
        let (mut scene, d) = drone_scene();
        let mut scheduler = MotionScheduler::new();
        scheduler.start(
            EntityKind::Drone,
            d,
            flight_phases(Vec3::ZERO, Vec3::new(6.0, 0.0, 0.0), PhaseAction::None),
            &scene,
            0.0,
        );
        // Just past the rise duration: altitude must be clamped to cruise
        let rise_time = (CRUISE_ALTITUDE / RISE_RATE) as f64 + 0.001;
        scheduler.advance(&mut scene, rise_time);
        assert_eq!(scene.drone(d).unwrap().position.y, CRUISE_ALTITUDE);
        assert_eq!(scheduler.current_phase(EntityKind::Drone, d), Some(1));
    }

    #[test]
    fn test_restart_replaces_sequence_from_live_position() {
        let (mut scene, d) = drone_scene();
        let mut scheduler = MotionScheduler::new();
        scheduler.start(
            EntityKind::Drone,
            d,
            vec![Phase {
                target: Vec3::new(100.0, 0.0, 0.0),
                duration: 10.0,
                easing: Easing::Linear,
                action: PhaseAction::None,
            }],
            &scene,
            0.0,
        );
        scheduler.advance(&mut scene, 5.0);
        let live = scene.drone(d).unwrap().position;
        assert!(live.x > 0.0 && live.x < 100.0);

        // New sequence: starts from live position, old target discarded
        scheduler.start(
            EntityKind::Drone,
            d,
            vec![Phase {
                target: live + Vec3::new(0.0, 2.0, 0.0),
                duration: 1.0,
                easing: Easing::Linear,
                action: PhaseAction::None,
            }],
            &scene,
            5.0,
        );
        scheduler.advance(&mut scene, 6.5);
        let pos = scene.drone(d).unwrap().position;
        assert_eq!(pos, live + Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn test_vanished_entity_drops_sequence_without_panic() {
        let (mut scene, d) = drone_scene();
        let mut scheduler = MotionScheduler::new();
        scheduler.start(
            EntityKind::Drone,
            d,
            vec![Phase {
                target: Vec3::new(5.0, 0.0, 0.0),
                duration: 2.0,
                easing: Easing::Linear,
                action: PhaseAction::None,
            }],
            &scene,
            0.0,
        );
        scene.delete(d, EntityKind::Drone);
        scheduler.advance(&mut scene, 1.0);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_late_tick_completes_multiple_phases() {
        let (mut scene, d) = drone_scene();
        let mut scheduler = MotionScheduler::new();
        let target = Vec3::new(3.0, 0.0, 4.0);
        scheduler.start(
            EntityKind::Drone,
            d,
            flight_phases(Vec3::ZERO, target, PhaseAction::None),
            &scene,
            0.0,
        );
        // One giant tick long after every phase duration has elapsed
        let result = scheduler.advance(&mut scene, 1000.0);
        assert!(scheduler.is_idle());
        assert_eq!(result.actions.len(), 3);
        assert_eq!(scene.drone(d).unwrap().position, target);
    }

    #[test]
    fn test_state_commits_are_rate_limited() {
        let (mut scene, d) = drone_scene();
        let mut scheduler = MotionScheduler::new();
        scheduler.start(
            EntityKind::Drone,
            d,
            vec![Phase {
                target: Vec3::new(10.0, 0.0, 0.0),
                duration: 10.0,
                easing: Easing::Linear,
                action: PhaseAction::None,
            }],
            &scene,
            0.0,
        );
        // Sub-interval tick: no commit yet
        scheduler.advance(&mut scene, 0.001);
        assert_eq!(scene.drone(d).unwrap().position.x, 0.0);
        // Past the interval: commit happens
        scheduler.advance(&mut scene, 0.05);
        assert!(scene.drone(d).unwrap().position.x > 0.0);
    }
}
