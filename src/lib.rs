//! # ROI Tracking Core Library
//!
//! Core of a camera-based insect-tracking control panel: operators outline
//! regions of interest (ROIs) on a camera frame, save and reload them, and start
//! or stop a tracking session over the committed set. The view and the
//! image-processing pipeline are external; this crate owns the geometry, the ROI
//! set, and the session state they depend on.
//!
//! ## Crate Structure
//!
//! - **`geometry`**: points, frame bounds, polygon validation, point-in-polygon
//!   and overlap tests, display-to-frame transforms.
//! - **`roi_store`**: the ordered, validated ROI set of one machine and its
//!   persistence document.
//! - **`auto_mask`**: deterministic grid partition of a frame into rectangular ROIs.
//! - **`session`**: the Idle/Running state machine that locks the ROI set while
//!   tracking, plus the start/stop render model.
//! - **`panel`**: `ControlPanel`, the facade the view/API layer calls, keyed by
//!   machine identity.
//! - **`storage`** / **`camera`**: collaborator traits for saved sets and live
//!   frame sizes, with file, in-memory and fixed implementations.
//! - **`error`**: per-component error enums and the `PanelError` boundary type.
//! - **`config`** / **`logging`**: figment configuration and tracing setup.

pub mod auto_mask;
pub mod camera;
pub mod config;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod panel;
pub mod roi_store;
pub mod session;
pub mod storage;

pub use error::{PanelError, PanelResult};
pub use geometry::{FrameBounds, Point, Polygon};
pub use panel::{ControlPanel, MachineId, PanelView};
pub use roi_store::{Roi, RoiId, RoiStore};
pub use session::{SessionStatus, TrackingMode, TrackingSession};
