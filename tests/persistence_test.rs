//! Save/load through the file-backed repository.

use std::sync::Arc;

use roi_tracking::camera::FixedFrameProvider;
use roi_tracking::config::PanelConfig;
use roi_tracking::error::{PanelError, PersistenceError};
use roi_tracking::storage::{FileRoiRepository, RoiRepository};
use roi_tracking::{ControlPanel, FrameBounds, MachineId, Point, RoiId};
use tempfile::tempdir;

fn config(allow_rescale: bool) -> PanelConfig {
    let mut config = PanelConfig::default();
    config.persistence.allow_rescale = allow_rescale;
    config
}

async fn add_square(panel: &ControlPanel, machine: &MachineId, x: f64, y: f64, size: f64) {
    for (px, py) in [(x, y), (x + size, y), (x + size, y + size), (x, y + size)] {
        panel.add_point(machine, Point::new(px, py)).await.unwrap();
    }
    panel
        .close_polygon_with_label(machine, Some(format!("sq{x}")))
        .await
        .unwrap();
}

#[tokio::test]
async fn save_then_load_restores_the_set() {
    let dir = tempdir().unwrap();
    let frames = Arc::new(FixedFrameProvider::new(FrameBounds::new(200, 100)));
    let repo = Arc::new(FileRoiRepository::new(dir.path()));
    let m = MachineId::new("etho-01");

    let panel = ControlPanel::new(config(false), frames.clone(), repo.clone());
    add_square(&panel, &m, 10.0, 10.0, 20.0).await;
    add_square(&panel, &m, 100.0, 10.0, 20.0).await;
    let saved = panel.save(&m).await.unwrap();

    // A fresh panel (e.g. after restart) sees the same set.
    let restarted = ControlPanel::new(config(false), frames, repo);
    let loaded = restarted.load(&m).await.unwrap();
    assert_eq!(loaded.rois, saved.rois);
    assert_eq!(loaded.rois[1].label.as_deref(), Some("sq100"));

    // The identity counter survives the round trip.
    add_square(&restarted, &m, 150.0, 50.0, 10.0).await;
    let view = restarted.view(&m).await.unwrap();
    assert_eq!(view.rois.last().map(|r| r.id), Some(RoiId(3)));
}

#[tokio::test]
async fn load_replaces_current_set_entirely() {
    let dir = tempdir().unwrap();
    let frames = Arc::new(FixedFrameProvider::new(FrameBounds::new(100, 100)));
    let repo = Arc::new(FileRoiRepository::new(dir.path()));
    let m = MachineId::new("etho-01");
    let panel = ControlPanel::new(config(false), frames, repo);

    add_square(&panel, &m, 0.0, 0.0, 10.0).await;
    panel.save(&m).await.unwrap();

    panel.auto_mask(&m, 2, 2).await.unwrap();
    panel.add_point(&m, Point::new(1.0, 1.0)).await.unwrap();
    assert_eq!(panel.view(&m).await.unwrap().rois.len(), 5);

    let view = panel.load(&m).await.unwrap();
    assert_eq!(view.rois.len(), 1);
    assert!(view.draft.is_empty());
}

#[tokio::test]
async fn corrupt_file_leaves_state_unchanged() {
    let dir = tempdir().unwrap();
    let frames = Arc::new(FixedFrameProvider::new(FrameBounds::new(100, 100)));
    let repo = Arc::new(FileRoiRepository::new(dir.path()));
    let m = MachineId::new("etho-01");
    let panel = ControlPanel::new(config(false), frames, repo.clone());

    add_square(&panel, &m, 0.0, 0.0, 10.0).await;
    repo.save(&m, b"{ truncated").await.unwrap();

    let err = panel.load(&m).await.unwrap_err();
    assert_eq!(err.code(), "persistence.malformed_data");
    assert_eq!(panel.view(&m).await.unwrap().rois.len(), 1);
}

#[tokio::test]
async fn invalid_stored_polygon_fails_validation() {
    let dir = tempdir().unwrap();
    let frames = Arc::new(FixedFrameProvider::new(FrameBounds::new(100, 100)));
    let repo = Arc::new(FileRoiRepository::new(dir.path()));
    let m = MachineId::new("etho-01");
    let panel = ControlPanel::new(config(false), frames, repo.clone());

    let document = br#"{
        "version": 1,
        "bounds": { "width": 100, "height": 100 },
        "rois": [
            { "id": 1, "points": [ {"x": 0, "y": 0}, {"x": 10, "y": 0}, {"x": 5, "y": 10} ] },
            { "id": 2, "points": [ {"x": 0, "y": 0}, {"x": 150, "y": 0}, {"x": 5, "y": 10} ] }
        ]
    }"#;
    repo.save(&m, document).await.unwrap();

    let err = panel.load(&m).await.unwrap_err();
    assert!(matches!(
        err,
        PanelError::Persistence(PersistenceError::ValidationFailed { id: 2, .. })
    ));
    assert!(panel.view(&m).await.unwrap().rois.is_empty());
}

#[tokio::test]
async fn resolution_change_is_a_bounds_mismatch() {
    let dir = tempdir().unwrap();
    let frames = Arc::new(FixedFrameProvider::new(FrameBounds::new(100, 100)));
    let repo = Arc::new(FileRoiRepository::new(dir.path()));
    let m = MachineId::new("etho-01");
    let panel = ControlPanel::new(config(false), frames.clone(), repo.clone());

    add_square(&panel, &m, 10.0, 10.0, 10.0).await;
    panel.save(&m).await.unwrap();

    frames.set_bounds(m.clone(), FrameBounds::new(200, 200)).await;
    let err = panel.load(&m).await.unwrap_err();
    assert_eq!(
        err,
        PanelError::Persistence(PersistenceError::BoundsMismatch {
            stored: FrameBounds::new(100, 100),
            live: FrameBounds::new(200, 200),
        })
    );

    // The same document rescales when the operator allows it.
    let rescaling = ControlPanel::new(config(true), frames, repo);
    let view = rescaling.load(&m).await.unwrap();
    assert_eq!(view.bounds, FrameBounds::new(200, 200));
    assert_eq!(view.rois[0].points[0], Point::new(20.0, 20.0));
}

#[tokio::test]
async fn storage_outage_is_retryable() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"occupied").unwrap();

    let panel = ControlPanel::new(
        config(false),
        Arc::new(FixedFrameProvider::new(FrameBounds::new(100, 100))),
        Arc::new(FileRoiRepository::new(&blocker)),
    );
    let m = MachineId::new("etho-01");
    add_square(&panel, &m, 0.0, 0.0, 10.0).await;

    let err = panel.save(&m).await.unwrap_err();
    assert_eq!(err.code(), "persistence.storage_unavailable");
    assert!(err.is_retryable());
    assert_eq!(panel.view(&m).await.unwrap().rois.len(), 1);
}

#[tokio::test]
async fn disconnected_camera_blocks_registration() {
    let frames = Arc::new(FixedFrameProvider::new(FrameBounds::new(100, 100)));
    let m = MachineId::new("offline");
    frames.disconnect(m.clone()).await;

    let dir = tempdir().unwrap();
    let panel = ControlPanel::new(
        config(false),
        frames,
        Arc::new(FileRoiRepository::new(dir.path())),
    );
    let err = panel.view(&m).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(panel.machines().await.is_empty());
}
