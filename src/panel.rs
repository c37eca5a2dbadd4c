//! Control panel facade.
//!
//! [`ControlPanel`] is the only entry point the view/API layer talks to. Each
//! user action maps to one method that takes the machine identity explicitly and
//! returns either the updated [`PanelView`] or a typed [`PanelError`].
//!
//! # Concurrency
//!
//! Every machine owns a [`MachineSlot`] (ROI store, tracking session and the
//! in-progress outline) behind its own `tokio::sync::Mutex`. An operation holds
//! that mutex from start to finish, persistence I/O included, so requests for the
//! same machine are applied one after another and never interleave. Slots for
//! different machines share nothing and proceed in parallel.
//!
//! ```text
//! machines: RwLock<HashMap<MachineId, Arc<Mutex<MachineSlot>>>>
//!                                   |
//!            +----------------------+----------------------+
//!            |                                             |
//!   "etho-01" -> Mutex<MachineSlot>              "etho-02" -> Mutex<MachineSlot>
//!     store / session / draft                       store / session / draft
//! ```
//!
//! Slots are created on first use, sized from the [`FrameProvider`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};

use crate::auto_mask::GridPartition;
use crate::camera::FrameProvider;
use crate::config::PanelConfig;
use crate::error::{GeometryError, PanelResult, SessionError};
use crate::geometry::{FrameBounds, PixelRect, Point, ScreenTransform};
use crate::roi_store::{Added, RoiId, RoiStore};
use crate::session::{
    render_model, CommittedRoiSet, RenderModel, SessionStatus, TrackingMode, TrackingSession,
};
use crate::storage::RoiRepository;

/// Routing key selecting one camera/machine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(String);

impl MachineId {
    /// Wrap a machine identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as given.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier restricted to characters safe in a file name.
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MachineId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MachineId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Non-fatal observation attached to a successful operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PanelWarning {
    /// A new ROI shares area with an existing one.
    Overlap {
        /// The newly added ROI
        roi: RoiId,
        /// The existing ROI it overlaps
        with: RoiId,
    },
}

/// ROI as the view renders it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoiSummary {
    /// ROI identity (the number printed on the frame)
    pub id: RoiId,
    /// Optional label
    pub label: Option<String>,
    /// Outline in frame pixels
    pub points: Vec<Point>,
    /// Area enclosed by the outline through the vertex coordinates
    pub area: f64,
    /// Pixels covered by the outline, vertex pixels included
    pub extent: PixelRect,
    /// When the ROI was committed
    pub created_at: DateTime<Utc>,
}

/// Renderable state of one machine after an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelView {
    /// Machine the view belongs to
    pub machine: MachineId,
    /// Live frame bounds
    pub bounds: FrameBounds,
    /// Committed ROIs in order
    pub rois: Vec<RoiSummary>,
    /// Points of the outline being drawn
    pub draft: Vec<Point>,
    /// Session status
    pub status: SessionStatus,
    /// Start/stop controls to show
    pub controls: RenderModel,
    /// Warnings produced by this operation
    pub warnings: Vec<PanelWarning>,
}

/// Per-machine state guarded by one mutex.
#[derive(Debug)]
pub struct MachineSlot {
    store: RoiStore,
    session: TrackingSession,
    draft: Vec<Point>,
}

impl MachineSlot {
    fn new(bounds: FrameBounds) -> Self {
        Self {
            store: RoiStore::new(bounds),
            session: TrackingSession::new(),
            draft: Vec::new(),
        }
    }

    fn view(&self, machine: &MachineId, warnings: Vec<PanelWarning>) -> PanelView {
        let status = self.session.status();
        PanelView {
            machine: machine.clone(),
            bounds: self.store.bounds(),
            rois: self
                .store
                .rois()
                .iter()
                .map(|roi| RoiSummary {
                    id: roi.id,
                    label: roi.label.clone(),
                    points: roi.polygon.points().to_vec(),
                    area: roi.polygon.area(),
                    extent: roi.polygon.pixel_extent(),
                    created_at: roi.created_at,
                })
                .collect(),
            draft: self.draft.clone(),
            status,
            controls: render_model(status),
            warnings,
        }
    }

    fn ensure_editable(&self) -> Result<(), SessionError> {
        if self.session.edits_permitted() {
            Ok(())
        } else {
            Err(SessionError::SessionActive)
        }
    }
}

fn overlap_warnings(machine: &MachineId, added: &[Added]) -> Vec<PanelWarning> {
    let mut warnings = Vec::new();
    for entry in added {
        for other in &entry.overlapping {
            warn!(machine = %machine, roi = %entry.roi.id, with = %other, "ROI overlaps an existing region");
            warnings.push(PanelWarning::Overlap {
                roi: entry.roi.id,
                with: *other,
            });
        }
    }
    warnings
}

/// Facade over ROI authoring and tracking sessions for many machines.
pub struct ControlPanel {
    config: PanelConfig,
    frames: Arc<dyn FrameProvider>,
    repository: Arc<dyn RoiRepository>,
    machines: RwLock<HashMap<MachineId, Arc<Mutex<MachineSlot>>>>,
}

impl fmt::Debug for ControlPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlPanel")
            .field("config", &self.config)
            .field("frames", &"<dyn FrameProvider>")
            .field("repository", &"<dyn RoiRepository>")
            .finish()
    }
}

impl ControlPanel {
    /// Create a panel with no machines registered yet.
    pub fn new(
        config: PanelConfig,
        frames: Arc<dyn FrameProvider>,
        repository: Arc<dyn RoiRepository>,
    ) -> Self {
        Self {
            config,
            frames,
            repository,
            machines: RwLock::new(HashMap::new()),
        }
    }

    /// Configuration the panel runs with.
    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    /// Get the slot for `machine`, creating it from the live frame size.
    async fn slot(&self, machine: &MachineId) -> PanelResult<Arc<Mutex<MachineSlot>>> {
        if let Some(existing) = self.machines.read().await.get(machine) {
            return Ok(Arc::clone(existing));
        }

        let bounds = self.frames.frame_bounds(machine).await?;
        let mut machines = self.machines.write().await;
        let slot = machines.entry(machine.clone()).or_insert_with(|| {
            info!(machine = %machine, bounds = %bounds, "Registered machine");
            Arc::new(Mutex::new(MachineSlot::new(bounds)))
        });
        Ok(Arc::clone(slot))
    }

    /// Machines with state in this panel, sorted.
    pub async fn machines(&self) -> Vec<MachineId> {
        let mut ids: Vec<MachineId> = self.machines.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Current renderable state of `machine`.
    pub async fn view(&self, machine: &MachineId) -> PanelResult<PanelView> {
        let slot = self.slot(machine).await?;
        let guard = slot.lock().await;
        Ok(guard.view(machine, Vec::new()))
    }

    /// Session status of `machine`; machines never touched are idle.
    pub async fn status(&self, machine: &MachineId) -> SessionStatus {
        let slot = self.machines.read().await.get(machine).cloned();
        match slot {
            Some(slot) => slot.lock().await.session.status(),
            None => SessionStatus::Idle,
        }
    }

    /// ROI set committed by the running session, for the tracking pipeline.
    pub async fn committed_rois(&self, machine: &MachineId) -> Option<Arc<CommittedRoiSet>> {
        let slot = self.machines.read().await.get(machine).cloned()?;
        let guard = slot.lock().await;
        guard.session.committed()
    }

    /// Append a frame-space point to the outline being drawn.
    #[instrument(skip(self))]
    pub async fn add_point(&self, machine: &MachineId, point: Point) -> PanelResult<PanelView> {
        let slot = self.slot(machine).await?;
        let mut guard = slot.lock().await;
        guard.ensure_editable()?;
        let bounds = guard.store.bounds();
        if !bounds.contains(&point) {
            return Err(GeometryError::OutOfBounds { point, bounds }.into());
        }
        guard.draft.push(point);
        Ok(guard.view(machine, Vec::new()))
    }

    /// Append a point clicked on the displayed image.
    pub async fn add_display_point(
        &self,
        machine: &MachineId,
        point: Point,
        transform: ScreenTransform,
    ) -> PanelResult<PanelView> {
        self.add_point(machine, transform.to_frame(point)).await
    }

    /// Drop the outline being drawn.
    #[instrument(skip(self))]
    pub async fn discard_draft(&self, machine: &MachineId) -> PanelResult<PanelView> {
        let slot = self.slot(machine).await?;
        let mut guard = slot.lock().await;
        guard.draft.clear();
        Ok(guard.view(machine, Vec::new()))
    }

    /// Turn the drawn outline into an ROI.
    pub async fn close_polygon(&self, machine: &MachineId) -> PanelResult<PanelView> {
        self.close_polygon_with_label(machine, None).await
    }

    /// Turn the drawn outline into a labelled ROI.
    ///
    /// On failure the outline is kept so the operator can fix or discard it.
    #[instrument(skip(self))]
    pub async fn close_polygon_with_label(
        &self,
        machine: &MachineId,
        label: Option<String>,
    ) -> PanelResult<PanelView> {
        let slot = self.slot(machine).await?;
        let mut guard = slot.lock().await;
        let slot = &mut *guard;

        let added = slot.store.add(&slot.draft, label)?;
        slot.draft.clear();
        info!(machine = %machine, roi = %added.roi.id, vertices = added.roi.polygon.len(), "ROI added");

        let warnings = overlap_warnings(machine, std::slice::from_ref(&added));
        Ok(slot.view(machine, warnings))
    }

    /// Remove the most recently added ROI (no-op when there is none).
    #[instrument(skip(self))]
    pub async fn remove_last(&self, machine: &MachineId) -> PanelResult<PanelView> {
        let slot = self.slot(machine).await?;
        let mut guard = slot.lock().await;
        if let Some(removed) = guard.store.remove_last()? {
            info!(machine = %machine, roi = %removed.id, "ROI removed");
        }
        Ok(guard.view(machine, Vec::new()))
    }

    /// Remove every ROI.
    #[instrument(skip(self))]
    pub async fn clear(&self, machine: &MachineId) -> PanelResult<PanelView> {
        let slot = self.slot(machine).await?;
        let mut guard = slot.lock().await;
        let removed = guard.store.len();
        guard.store.clear()?;
        info!(machine = %machine, removed, "ROIs cleared");
        Ok(guard.view(machine, Vec::new()))
    }

    /// Append a `rows x cols` grid of ROIs covering the frame.
    #[instrument(skip(self))]
    pub async fn auto_mask(
        &self,
        machine: &MachineId,
        rows: u32,
        cols: u32,
    ) -> PanelResult<PanelView> {
        let slot = self.slot(machine).await?;
        let mut guard = slot.lock().await;
        guard.ensure_editable()?;

        let partition = GridPartition::new(guard.store.bounds(), rows, cols)?;
        let added = guard.store.add_batch(partition.cells())?;
        info!(machine = %machine, rows, cols, added = added.len(), "Auto mask applied");

        let warnings = overlap_warnings(machine, &added);
        Ok(guard.view(machine, warnings))
    }

    /// Auto mask with the configured default grid.
    pub async fn auto_mask_default(&self, machine: &MachineId) -> PanelResult<PanelView> {
        let grid = self.config.auto_mask;
        self.auto_mask(machine, grid.rows, grid.cols).await
    }

    /// Persist the machine's ROI set.
    #[instrument(skip(self))]
    pub async fn save(&self, machine: &MachineId) -> PanelResult<PanelView> {
        let slot = self.slot(machine).await?;
        let guard = slot.lock().await;
        let bytes = guard.store.serialize()?;
        self.repository.save(machine, &bytes).await?;
        info!(machine = %machine, rois = guard.store.len(), "ROI set saved");
        Ok(guard.view(machine, Vec::new()))
    }

    /// Replace the machine's ROI set with the saved one.
    ///
    /// All-or-nothing: any failure leaves the current set and outline intact.
    #[instrument(skip(self))]
    pub async fn load(&self, machine: &MachineId) -> PanelResult<PanelView> {
        let slot = self.slot(machine).await?;
        let mut guard = slot.lock().await;
        guard.ensure_editable()?;

        let bytes = self.repository.load(machine).await?;
        let live = self.frames.frame_bounds(machine).await?;
        let document =
            RoiStore::deserialize(&bytes, live, self.config.persistence.allow_rescale)?;

        guard.store.replace_from(document)?;
        guard.draft.clear();
        info!(machine = %machine, rois = guard.store.len(), "ROI set loaded");
        Ok(guard.view(machine, Vec::new()))
    }

    /// Start tracking in `mode`, locking the ROI set.
    #[instrument(skip(self))]
    pub async fn start(&self, machine: &MachineId, mode: TrackingMode) -> PanelResult<PanelView> {
        let slot = self.slot(machine).await?;
        let mut guard = slot.lock().await;
        let slot = &mut *guard;

        let committed = slot.session.start(&mut slot.store, mode)?;
        info!(machine = %machine, mode = %mode, rois = committed.rois.len(), "Tracking started");
        Ok(slot.view(machine, Vec::new()))
    }

    /// Stop tracking and unlock the ROI set.
    #[instrument(skip(self))]
    pub async fn stop(&self, machine: &MachineId) -> PanelResult<PanelView> {
        let slot = self.slot(machine).await?;
        let mut guard = slot.lock().await;
        let slot = &mut *guard;

        let elapsed = slot.session.elapsed();
        slot.session.stop(&mut slot.store)?;
        info!(
            machine = %machine,
            elapsed_s = elapsed.map(|d| d.num_seconds()).unwrap_or_default(),
            "Tracking stopped"
        );
        Ok(slot.view(machine, Vec::new()))
    }
}
