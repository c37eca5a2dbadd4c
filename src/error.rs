//! Error types for ROI authoring and tracking sessions.
//!
//! Each component has its own `thiserror` enum so that callers deep inside the
//! crate match on exactly the failures that component can produce:
//!
//! - **`GeometryError`**: polygon validation failures (degenerate, out of frame,
//!   self-intersecting).
//! - **`SessionError`**: state-machine violations (editing while a session runs,
//!   starting without ROIs, double start, stop while idle).
//! - **`PersistenceError`**: save/load failures, from malformed documents to an
//!   unreachable storage backend.
//! - **`PartitionError`**: an auto-mask grid that cannot be built.
//! - **`StoreError`**: the ROI identity counter has run out.
//!
//! `RoiEditError` combines the failures a single store edit can hit.
//!
//! `PanelError` wraps all of them at the control-panel boundary. Every variant
//! maps to a stable dotted code (see [`PanelError::code`]) so the outer API layer
//! can branch without parsing messages. Only storage unavailability is worth
//! retrying; everything else is a problem with the caller's input or timing.

use serde::Serialize;
use thiserror::Error;

use crate::geometry::{FrameBounds, Point};

/// Convenience alias for results at the control-panel boundary.
pub type PanelResult<T> = std::result::Result<T, PanelError>;

/// Polygon validation failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// Fewer than three distinct points, or all points on one line.
    #[error("Degenerate shape: {distinct} distinct point(s) do not enclose an area")]
    DegenerateShape {
        /// Number of points left after collapsing consecutive duplicates
        distinct: usize,
    },

    /// A vertex lies outside the frame (or is not a finite number).
    #[error("Point {point} lies outside the {bounds} frame")]
    OutOfBounds {
        /// The first offending vertex
        point: Point,
        /// Frame the polygon was checked against
        bounds: FrameBounds,
    },

    /// Two edges cross, touch, or fold back over each other.
    #[error("Polygon edges {first} and {second} intersect")]
    SelfIntersecting {
        /// Index of the first offending edge
        first: usize,
        /// Index of the second offending edge
        second: usize,
    },
}

/// Tracking session state-machine violations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// The ROI set is locked because a tracking session is running.
    #[error("ROIs cannot be edited while a tracking session is running")]
    SessionActive,

    /// `start` was requested with an empty ROI set.
    #[error("No ROIs defined; draw or auto-mask at least one region before starting")]
    NoRoisDefined,

    /// `start` was requested while a session is already running.
    #[error("Tracking session is already running")]
    AlreadyRunning,

    /// `stop` was requested while idle.
    #[error("Tracking session is not running")]
    NotRunning,
}

/// Save/load failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    /// The stored document could not be decoded or is internally inconsistent.
    #[error("Malformed ROI data: {0}")]
    MalformedData(String),

    /// A decoded polygon failed geometry validation.
    #[error("Stored ROI {id} failed validation: {source}")]
    ValidationFailed {
        /// Identity of the offending ROI as stored
        id: u32,
        /// The underlying geometry failure
        #[source]
        source: GeometryError,
    },

    /// The document was authored against a different frame size.
    #[error("ROI set was authored for a {stored} frame but the camera provides {live}")]
    BoundsMismatch {
        /// Bounds recorded in the document header
        stored: FrameBounds,
        /// Bounds of the live camera frame
        live: FrameBounds,
    },

    /// The storage backend (or camera) could not be reached.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Nothing has been saved for this machine yet.
    #[error("No saved ROI set for machine '{0}'")]
    NotFound(String),
}

/// Auto-mask grid construction failures.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionError {
    /// Rows/columns are zero or would produce cells under two pixels wide.
    #[error("Cannot partition a {bounds} frame into {rows} row(s) x {cols} column(s)")]
    InvalidPartition {
        /// Requested row count
        rows: u32,
        /// Requested column count
        cols: u32,
        /// Frame being partitioned
        bounds: FrameBounds,
    },
}

/// ROI store limits.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Assigning `requested` more identities would overflow the counter.
    #[error("ROI identities exhausted: cannot assign {requested} more starting at {next}")]
    IdsExhausted {
        /// Identity the next ROI would have received
        next: u32,
        /// Number of identities the edit needed
        requested: usize,
    },
}

/// Failure of a store edit that checks the lock, validates geometry and
/// assigns identities.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RoiEditError {
    /// Store is locked by a running session.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Outline failed validation.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    /// No identities left to assign.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<RoiEditError> for PanelError {
    fn from(value: RoiEditError) -> Self {
        match value {
            RoiEditError::Session(err) => err.into(),
            RoiEditError::Geometry(err) => err.into(),
            RoiEditError::Store(err) => err.into(),
        }
    }
}

/// Error returned by every control-panel operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PanelError {
    /// Geometry validation failure.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Session state-machine violation.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Persistence failure.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// ROI store limit reached.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Auto-mask partition failure.
    #[error(transparent)]
    Partition(#[from] PartitionError),
}

impl PanelError {
    /// Stable machine-readable code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            PanelError::Geometry(err) => match err {
                GeometryError::DegenerateShape { .. } => "geometry.degenerate_shape",
                GeometryError::OutOfBounds { .. } => "geometry.out_of_bounds",
                GeometryError::SelfIntersecting { .. } => "geometry.self_intersecting",
            },
            PanelError::Session(err) => match err {
                SessionError::SessionActive => "session.session_active",
                SessionError::NoRoisDefined => "session.no_rois_defined",
                SessionError::AlreadyRunning => "session.already_running",
                SessionError::NotRunning => "session.not_running",
            },
            PanelError::Persistence(err) => match err {
                PersistenceError::MalformedData(_) => "persistence.malformed_data",
                PersistenceError::ValidationFailed { .. } => "persistence.validation_failed",
                PersistenceError::BoundsMismatch { .. } => "persistence.bounds_mismatch",
                PersistenceError::StorageUnavailable(_) => "persistence.storage_unavailable",
                PersistenceError::NotFound(_) => "persistence.not_found",
            },
            PanelError::Partition(PartitionError::InvalidPartition { .. }) => "partition.invalid",
            PanelError::Store(StoreError::IdsExhausted { .. }) => "store.ids_exhausted",
        }
    }

    /// Whether the caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PanelError::Persistence(PersistenceError::StorageUnavailable(_))
        )
    }

    /// Serializable summary for the outer API layer.
    pub fn to_failure(&self) -> PanelFailure {
        PanelFailure {
            code: self.code(),
            detail: self.to_string(),
            retryable: self.is_retryable(),
        }
    }
}

/// Typed failure as surfaced to the view/API layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelFailure {
    /// Stable dotted code, e.g. `session.already_running`
    pub code: &'static str,
    /// Human-readable detail
    pub detail: String,
    /// Only true for storage outages
    pub retryable: bool,
}
