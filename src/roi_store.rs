//! Ordered ROI collection for one machine.
//!
//! The store owns every [`Roi`] for a camera. Insertion order matters: "remove
//! last" pops the most recent entry, and the tracking pipeline maps ROI position
//! to output columns. Identities are handed out from a counter that only ever
//! grows, so an id is never reused even after removals.
//!
//! ## Edit lock
//!
//! A running tracking session locks the store (see [`crate::session`]). While
//! locked, every mutation fails with [`SessionError::SessionActive`] and leaves
//! the set untouched.
//!
//! ## Persistence document
//!
//! [`RoiStore::serialize`] writes a versioned JSON document (header with frame
//! bounds and the id counter, then one record per ROI in order).
//! [`RoiStore::deserialize`] decodes and fully validates a document without
//! touching any store; [`RoiStore::replace_from`] then swaps it in, so a load
//! either replaces everything or nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{PersistenceError, RoiEditError, SessionError, StoreError};
use crate::geometry::{self, FrameBounds, Point, Polygon, ScreenTransform};

/// Current persistence document version.
pub const DOCUMENT_VERSION: u32 = 1;

/// Relative aspect-ratio tolerance when rescaling a stored set.
const ASPECT_TOLERANCE: f64 = 1e-6;

/// Stable ROI identity, 1-based and unique within a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoiId(pub u32);

impl fmt::Display for RoiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A region of interest on the camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Roi {
    /// Identity, unique within the owning store
    pub id: RoiId,
    /// Validated outline
    pub polygon: Polygon,
    /// When the ROI was committed
    pub created_at: DateTime<Utc>,
    /// Optional operator-supplied label
    pub label: Option<String>,
}

/// Result of adding a single ROI.
#[derive(Debug, Clone, PartialEq)]
pub struct Added {
    /// The committed ROI
    pub roi: Roi,
    /// Existing ROIs whose area the new one overlaps
    pub overlapping: Vec<RoiId>,
}

/// Decoded, validated content of a persistence document.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiSetDocument {
    /// Bounds the set is valid for (the live bounds after any rescale)
    pub bounds: FrameBounds,
    /// Next identity to hand out
    pub next_id: u32,
    /// ROIs in stored order
    pub rois: Vec<Roi>,
}

/// Ordered, validated ROI set for one camera frame.
#[derive(Debug, Clone)]
pub struct RoiStore {
    bounds: FrameBounds,
    rois: Vec<Roi>,
    next_id: u32,
    locked: bool,
}

impl RoiStore {
    /// Create an empty store for a frame of the given size.
    pub fn new(bounds: FrameBounds) -> Self {
        Self {
            bounds,
            rois: Vec::new(),
            next_id: 1,
            locked: false,
        }
    }

    /// Frame the ROIs are validated against.
    pub fn bounds(&self) -> FrameBounds {
        self.bounds
    }

    /// ROIs in insertion order.
    pub fn rois(&self) -> &[Roi] {
        &self.rois
    }

    /// Number of ROIs.
    pub fn len(&self) -> usize {
        self.rois.len()
    }

    /// Whether the store holds no ROIs.
    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }

    /// Identity the next `add` will assign.
    pub fn next_id(&self) -> RoiId {
        RoiId(self.next_id)
    }

    /// Whether a running session currently holds the edit lock.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub(crate) fn lock_edits(&mut self) {
        self.locked = true;
    }

    pub(crate) fn unlock_edits(&mut self) {
        self.locked = false;
    }

    fn ensure_unlocked(&self) -> Result<(), SessionError> {
        if self.locked {
            Err(SessionError::SessionActive)
        } else {
            Ok(())
        }
    }

    /// Validate `points`, assign the next identity and append.
    pub fn add(&mut self, points: &[Point], label: Option<String>) -> Result<Added, RoiEditError> {
        self.ensure_unlocked()?;
        let polygon = geometry::validate_polygon(points, self.bounds)?;
        self.ensure_capacity(1)?;
        Ok(self.push(polygon, label))
    }

    /// Append a batch of outlines, all-or-nothing.
    ///
    /// Every outline is validated before the first one is appended, so a failure
    /// part-way through leaves the store unchanged.
    pub fn add_batch<I>(&mut self, outlines: I) -> Result<Vec<Added>, RoiEditError>
    where
        I: IntoIterator<Item = Vec<Point>>,
    {
        self.ensure_unlocked()?;
        let polygons = outlines
            .into_iter()
            .map(|points| geometry::validate_polygon(&points, self.bounds))
            .collect::<Result<Vec<_>, _>>()?;
        self.ensure_capacity(polygons.len())?;
        Ok(polygons
            .into_iter()
            .map(|polygon| self.push(polygon, None))
            .collect())
    }

    /// `u32::MAX` is never assigned; it marks an exhausted counter.
    fn ensure_capacity(&self, requested: usize) -> Result<(), StoreError> {
        let remaining = u64::from(u32::MAX - self.next_id);
        if u64::try_from(requested).is_ok_and(|n| n <= remaining) {
            Ok(())
        } else {
            Err(StoreError::IdsExhausted {
                next: self.next_id,
                requested,
            })
        }
    }

    /// Callers check `ensure_capacity` first.
    fn push(&mut self, polygon: Polygon, label: Option<String>) -> Added {
        let overlapping = self
            .rois
            .iter()
            .filter(|existing| geometry::overlaps(&existing.polygon, &polygon))
            .map(|existing| existing.id)
            .collect();
        let roi = Roi {
            id: RoiId(self.next_id),
            polygon,
            created_at: Utc::now(),
            label,
        };
        self.next_id += 1;
        self.rois.push(roi.clone());
        Added { roi, overlapping }
    }

    /// Remove and return the most recently appended ROI.
    ///
    /// Returns `Ok(None)` on an empty store.
    pub fn remove_last(&mut self) -> Result<Option<Roi>, SessionError> {
        self.ensure_unlocked()?;
        Ok(self.rois.pop())
    }

    /// Remove every ROI. The identity counter keeps its value.
    pub fn clear(&mut self) -> Result<(), SessionError> {
        self.ensure_unlocked()?;
        self.rois.clear();
        Ok(())
    }

    /// Encode the whole set as a pretty-printed JSON document.
    pub fn serialize(&self) -> Result<Vec<u8>, PersistenceError> {
        let document = StoredDocument {
            version: DOCUMENT_VERSION,
            bounds: self.bounds,
            next_id: Some(self.next_id),
            rois: self
                .rois
                .iter()
                .map(|roi| StoredRoi {
                    id: roi.id.0,
                    label: roi.label.clone(),
                    created_at: Some(roi.created_at),
                    points: roi.polygon.points().to_vec(),
                })
                .collect(),
        };
        serde_json::to_vec_pretty(&document)
            .map_err(|e| PersistenceError::MalformedData(format!("encode failed: {e}")))
    }

    /// Decode and validate a document against the live frame bounds.
    ///
    /// With `allow_rescale`, a document from a frame of the same aspect ratio is
    /// scaled into `live` before validation; otherwise differing bounds fail with
    /// [`PersistenceError::BoundsMismatch`].
    pub fn deserialize(
        bytes: &[u8],
        live: FrameBounds,
        allow_rescale: bool,
    ) -> Result<RoiSetDocument, PersistenceError> {
        let stored: StoredDocument = serde_json::from_slice(bytes)
            .map_err(|e| PersistenceError::MalformedData(e.to_string()))?;

        if stored.version != DOCUMENT_VERSION {
            return Err(PersistenceError::MalformedData(format!(
                "unsupported document version {}",
                stored.version
            )));
        }
        if stored.bounds.width == 0 || stored.bounds.height == 0 {
            return Err(PersistenceError::MalformedData(format!(
                "empty frame bounds {}",
                stored.bounds
            )));
        }

        let transform = if stored.bounds == live {
            None
        } else if allow_rescale && aspect_matches(stored.bounds, live) {
            Some(ScreenTransform::between(stored.bounds, live))
        } else {
            return Err(PersistenceError::BoundsMismatch {
                stored: stored.bounds,
                live,
            });
        };

        let mut seen = HashSet::with_capacity(stored.rois.len());
        let loaded_at = Utc::now();
        let mut rois = Vec::with_capacity(stored.rois.len());
        for record in stored.rois {
            if record.id == 0 || !seen.insert(record.id) {
                return Err(PersistenceError::MalformedData(format!(
                    "duplicate or zero ROI id {}",
                    record.id
                )));
            }
            let points: Vec<Point> = match transform {
                Some(t) => record.points.iter().map(|p| t.to_frame(*p)).collect(),
                None => record.points,
            };
            let polygon = geometry::validate_polygon(&points, live).map_err(|source| {
                PersistenceError::ValidationFailed {
                    id: record.id,
                    source,
                }
            })?;
            rois.push(Roi {
                id: RoiId(record.id),
                polygon,
                created_at: record.created_at.unwrap_or(loaded_at),
                label: record.label,
            });
        }

        let max_id = seen.iter().copied().max().unwrap_or(0);
        let next_id = match stored.next_id {
            Some(next) if next <= max_id => {
                return Err(PersistenceError::MalformedData(format!(
                    "next_id {next} does not exceed stored id {max_id}"
                )));
            }
            Some(u32::MAX) => {
                return Err(PersistenceError::MalformedData(
                    "next_id exhausts the identity range".to_string(),
                ));
            }
            Some(next) => next,
            None => max_id.checked_add(1).ok_or_else(|| {
                PersistenceError::MalformedData(format!("ROI id {max_id} leaves no next identity"))
            })?,
        };

        Ok(RoiSetDocument {
            bounds: live,
            next_id,
            rois,
        })
    }

    /// Replace the whole set with a decoded document.
    ///
    /// The identity counter never moves backwards, even if the document's does.
    pub fn replace_from(&mut self, document: RoiSetDocument) -> Result<(), SessionError> {
        self.ensure_unlocked()?;
        self.bounds = document.bounds;
        self.next_id = self.next_id.max(document.next_id);
        self.rois = document.rois;
        Ok(())
    }
}

fn aspect_matches(a: FrameBounds, b: FrameBounds) -> bool {
    let ratio = a.aspect_ratio();
    ((ratio - b.aspect_ratio()) / ratio).abs() <= ASPECT_TOLERANCE
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredDocument {
    version: u32,
    bounds: FrameBounds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_id: Option<u32>,
    rois: Vec<StoredRoi>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRoi {
    id: u32,
    #[serde(default)]
    label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    points: Vec<Point>,
}
