//! Tracking session state machine.
//!
//! A session cycles between two states for the lifetime of the process:
//!
//! ```text
//!            start(mode)                 stop()
//!   Idle  ---------------->  Running(mode)  ------>  Idle
//! ```
//!
//! `start` is the single commit point of the ROI set: it locks the
//! [`RoiStore`] against edits and captures a [`CommittedRoiSet`] snapshot that
//! the tracking pipeline reads for the whole run. `stop` releases the lock.
//! Illegal transitions are reported as errors rather than ignored, so a caller
//! can tell a double start apart from a successful one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::SessionError;
use crate::geometry::FrameBounds;
use crate::roi_store::{Roi, RoiStore};

/// Kind of measurement produced per ROI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    /// Position of the animal within each ROI
    Position,
    /// Distance travelled per ROI
    Distance,
    /// Raw XY coordinates per ROI
    XyCoordinates,
}

impl TrackingMode {
    /// All modes, in the order the view lists them.
    pub const ALL: [TrackingMode; 3] = [
        TrackingMode::Position,
        TrackingMode::Distance,
        TrackingMode::XyCoordinates,
    ];

    /// Configuration/CLI name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingMode::Position => "position",
            TrackingMode::Distance => "distance",
            TrackingMode::XyCoordinates => "xy_coordinates",
        }
    }
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "position" => Ok(TrackingMode::Position),
            "distance" => Ok(TrackingMode::Distance),
            "xy_coordinates" | "xy" => Ok(TrackingMode::XyCoordinates),
            _ => Err(format!(
                "Invalid tracking mode '{}'. Must be one of: position, distance, xy_coordinates",
                s
            )),
        }
    }
}

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "mode", rename_all = "snake_case")]
pub enum SessionStatus {
    /// No session; ROIs may be edited
    Idle,
    /// Tracking with the given mode; ROIs are locked
    Running(TrackingMode),
}

impl SessionStatus {
    /// Whether a session is running.
    pub fn is_running(&self) -> bool {
        matches!(self, SessionStatus::Running(_))
    }
}

/// Start/stop controls derived from the session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenderModel {
    /// Show the start control
    pub can_start: bool,
    /// Show the stop control
    pub can_stop: bool,
    /// Mode to highlight while running
    pub active_mode: Option<TrackingMode>,
}

/// Project a session status onto the controls the view should show.
pub fn render_model(status: SessionStatus) -> RenderModel {
    match status {
        SessionStatus::Idle => RenderModel {
            can_start: true,
            can_stop: false,
            active_mode: None,
        },
        SessionStatus::Running(mode) => RenderModel {
            can_start: false,
            can_stop: true,
            active_mode: Some(mode),
        },
    }
}

/// ROI set frozen at session start, handed to the tracking pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedRoiSet {
    /// Frame the ROIs were validated against
    pub bounds: FrameBounds,
    /// ROIs in store order; index `i` feeds output column `i`
    pub rois: Vec<Roi>,
    /// Mode the session runs in
    pub mode: TrackingMode,
    /// When the session started
    pub started_at: DateTime<Utc>,
}

/// Start/stop state machine for one machine's tracking.
#[derive(Debug, Default)]
pub struct TrackingSession {
    committed: Option<Arc<CommittedRoiSet>>,
    runs: u64,
}

impl TrackingSession {
    /// New idle session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        match &self.committed {
            Some(set) => SessionStatus::Running(set.mode),
            None => SessionStatus::Idle,
        }
    }

    /// Whether the ROI set may currently be edited.
    pub fn edits_permitted(&self) -> bool {
        self.committed.is_none()
    }

    /// Commit the store's ROIs and start tracking in `mode`.
    pub fn start(
        &mut self,
        store: &mut RoiStore,
        mode: TrackingMode,
    ) -> Result<Arc<CommittedRoiSet>, SessionError> {
        if self.committed.is_some() {
            return Err(SessionError::AlreadyRunning);
        }
        if store.is_empty() {
            return Err(SessionError::NoRoisDefined);
        }

        let committed = Arc::new(CommittedRoiSet {
            bounds: store.bounds(),
            rois: store.rois().to_vec(),
            mode,
            started_at: Utc::now(),
        });
        store.lock_edits();
        self.committed = Some(Arc::clone(&committed));
        self.runs += 1;
        Ok(committed)
    }

    /// Stop tracking and release the edit lock.
    pub fn stop(&mut self, store: &mut RoiStore) -> Result<(), SessionError> {
        if self.committed.take().is_none() {
            return Err(SessionError::NotRunning);
        }
        store.unlock_edits();
        Ok(())
    }

    /// Snapshot of the running session, if any.
    pub fn committed(&self) -> Option<Arc<CommittedRoiSet>> {
        self.committed.clone()
    }

    /// When the running session started.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.committed.as_ref().map(|set| set.started_at)
    }

    /// Time since the running session started.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.started_at().map(|start| Utc::now() - start)
    }

    /// Number of sessions started so far.
    pub fn runs(&self) -> u64 {
        self.runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    fn store_with_roi() -> RoiStore {
        let mut store = RoiStore::new(FrameBounds::new(100, 100));
        store
            .add(
                &[
                    Point::new(0.0, 0.0),
                    Point::new(10.0, 0.0),
                    Point::new(5.0, 10.0),
                ],
                None,
            )
            .unwrap();
        store
    }

    #[test]
    fn start_requires_rois() {
        let mut store = RoiStore::new(FrameBounds::new(100, 100));
        let mut session = TrackingSession::new();
        assert_eq!(
            session.start(&mut store, TrackingMode::Position).unwrap_err(),
            SessionError::NoRoisDefined
        );
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(!store.is_locked());
    }

    #[test]
    fn start_locks_and_stop_unlocks() {
        let mut store = store_with_roi();
        let mut session = TrackingSession::new();

        let committed = session.start(&mut store, TrackingMode::Distance).unwrap();
        assert_eq!(committed.rois.len(), 1);
        assert_eq!(session.status(), SessionStatus::Running(TrackingMode::Distance));
        assert!(store.is_locked());
        assert!(!session.edits_permitted());
        assert!(session.started_at().is_some());

        session.stop(&mut store).unwrap();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(!store.is_locked());
        assert!(session.committed().is_none());
    }

    #[test]
    fn double_start_and_idle_stop_are_errors() {
        let mut store = store_with_roi();
        let mut session = TrackingSession::new();

        assert_eq!(session.stop(&mut store), Err(SessionError::NotRunning));

        session.start(&mut store, TrackingMode::Position).unwrap();
        assert_eq!(
            session.start(&mut store, TrackingMode::Distance).unwrap_err(),
            SessionError::AlreadyRunning
        );
        // The first mode stays active.
        assert_eq!(session.status(), SessionStatus::Running(TrackingMode::Position));
        assert_eq!(session.runs(), 1);
    }

    #[test]
    fn session_cycles_indefinitely() {
        let mut store = store_with_roi();
        let mut session = TrackingSession::new();
        for mode in TrackingMode::ALL {
            session.start(&mut store, mode).unwrap();
            session.stop(&mut store).unwrap();
        }
        assert_eq!(session.runs(), 3);
    }

    #[test]
    fn render_model_follows_status() {
        assert_eq!(
            render_model(SessionStatus::Idle),
            RenderModel {
                can_start: true,
                can_stop: false,
                active_mode: None
            }
        );
        assert_eq!(
            render_model(SessionStatus::Running(TrackingMode::XyCoordinates)),
            RenderModel {
                can_start: false,
                can_stop: true,
                active_mode: Some(TrackingMode::XyCoordinates)
            }
        );
    }

    #[test]
    fn tracking_mode_parses_names() {
        assert_eq!("position".parse::<TrackingMode>(), Ok(TrackingMode::Position));
        assert_eq!("Distance".parse::<TrackingMode>(), Ok(TrackingMode::Distance));
        assert_eq!("xy-coordinates".parse::<TrackingMode>(), Ok(TrackingMode::XyCoordinates));
        assert!("speed".parse::<TrackingMode>().is_err());
        for mode in TrackingMode::ALL {
            assert_eq!(mode.to_string().parse::<TrackingMode>(), Ok(mode));
        }
    }

    #[test]
    fn status_serializes_with_tag() {
        let json = serde_json::to_string(&SessionStatus::Running(TrackingMode::Position)).unwrap();
        assert_eq!(json, r#"{"state":"running","mode":"position"}"#);
        let idle = serde_json::to_string(&SessionStatus::Idle).unwrap();
        assert_eq!(idle, r#"{"state":"idle"}"#);
    }
}
