//! Simulation error types
//!
//! Only user-visible failures become errors; idempotent no-ops (dispatch
//! while carrying, takeoff mid-flight, lift already at target) are logged
//! and swallowed at the operation boundary. Ticks never fail.

use std::fmt;

/// User-visible simulation/editor errors
#[derive(Debug, Clone, PartialEq)]
pub enum SimError {
    /// All four shelf slots at the station are occupied
    ShelfFull { station: String },
    /// The waypoint is already bound to another docking station
    WaypointAlreadyBound { waypoint: String },
    /// Only Landing waypoints can be bound to a docking station
    WaypointNotLandable { waypoint: String },
    /// Edit-path mutation attempted while a run-mode snapshot is held
    EditLocked,
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::ShelfFull { station } => {
                write!(f, "{}: all shelf slots are occupied", station)
            }
            SimError::WaypointAlreadyBound { waypoint } => {
                write!(f, "{} is already bound to another station", waypoint)
            }
            SimError::WaypointNotLandable { waypoint } => {
                write!(f, "{} is not a landing waypoint", waypoint)
            }
            SimError::EditLocked => write!(f, "scene is locked while run mode is active"),
        }
    }
}

impl std::error::Error for SimError {}
