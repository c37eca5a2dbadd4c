//! Grid auto mask through the facade.

use std::sync::Arc;

use roi_tracking::auto_mask::{GridPartition, DEFAULT_COLS, DEFAULT_ROWS};
use roi_tracking::camera::FixedFrameProvider;
use roi_tracking::config::PanelConfig;
use roi_tracking::geometry::contains_point;
use roi_tracking::storage::MemoryRoiRepository;
use roi_tracking::{ControlPanel, FrameBounds, MachineId, Point, TrackingMode};

fn panel(config: PanelConfig, width: u32, height: u32) -> ControlPanel {
    ControlPanel::new(
        config,
        Arc::new(FixedFrameProvider::new(FrameBounds::new(width, height))),
        Arc::new(MemoryRoiRepository::new()),
    )
}

#[tokio::test]
async fn two_by_two_quarters_the_frame() {
    let panel = panel(PanelConfig::default(), 100, 100);
    let m = MachineId::new("etho-01");

    let view = panel.auto_mask(&m, 2, 2).await.unwrap();
    assert_eq!(view.rois.len(), 4);
    assert!(view.warnings.is_empty());

    for roi in &view.rois {
        assert_eq!((roi.extent.width, roi.extent.height), (50, 50));
        // The outline runs through the centres of the edge pixels.
        assert_eq!(roi.area, 49.0 * 49.0);
    }
    let origins: Vec<(u32, u32)> = view.rois.iter().map(|r| (r.extent.x, r.extent.y)).collect();
    assert_eq!(origins, vec![(0, 0), (50, 0), (0, 50), (50, 50)]);

    let corners: Vec<(Point, Point)> = view
        .rois
        .iter()
        .map(|r| (r.points[0], r.points[2]))
        .collect();
    assert_eq!(
        corners,
        vec![
            (Point::new(0.0, 0.0), Point::new(49.0, 49.0)),
            (Point::new(50.0, 0.0), Point::new(99.0, 49.0)),
            (Point::new(0.0, 50.0), Point::new(49.0, 99.0)),
            (Point::new(50.0, 50.0), Point::new(99.0, 99.0)),
        ]
    );
}

#[tokio::test]
async fn every_pixel_belongs_to_exactly_one_cell() {
    let bounds = FrameBounds::new(37, 23);
    let partition = GridPartition::new(bounds, 3, 4).unwrap();
    let cells: Vec<_> = partition.cells().collect();
    assert_eq!(cells.len(), 12);

    for y in 0..bounds.height {
        for x in 0..bounds.width {
            let (px, py) = (f64::from(x), f64::from(y));
            let owners = cells
                .iter()
                .filter(|cell| {
                    let (lo, hi) = (cell[0], cell[2]);
                    (lo.x..=hi.x).contains(&px) && (lo.y..=hi.y).contains(&py)
                })
                .count();
            assert_eq!(owners, 1, "pixel ({x}, {y}) owned by {owners} cells");
        }
    }

    // Outlines contain their own interior pixels.
    let first = roi_tracking::geometry::validate_polygon(&cells[0], bounds).unwrap();
    assert!(contains_point(&first, &Point::new(2.0, 2.0)));
}

#[tokio::test]
async fn default_grid_matches_the_configured_layout() {
    let panel = panel(PanelConfig::default(), 1280, 960);
    let m = MachineId::new("etho-01");

    let view = panel.auto_mask_default(&m).await.unwrap();
    assert_eq!(view.rois.len(), (DEFAULT_ROWS * DEFAULT_COLS) as usize);
    assert_eq!(view.rois.len(), 20);

    // Grid ROIs are ordinary ROIs: they can start a session.
    let view = panel.start(&m, TrackingMode::Position).await.unwrap();
    assert!(view.status.is_running());
}

#[tokio::test]
async fn configured_grid_overrides_defaults() {
    let mut config = PanelConfig::default();
    config.auto_mask.rows = 4;
    config.auto_mask.cols = 3;
    let panel = panel(config, 300, 400);
    let m = MachineId::new("etho-01");

    let view = panel.auto_mask_default(&m).await.unwrap();
    assert_eq!(view.rois.len(), 12);
}

#[tokio::test]
async fn too_fine_a_grid_is_rejected() {
    let panel = panel(PanelConfig::default(), 10, 10);
    let m = MachineId::new("etho-01");

    let err = panel.auto_mask(&m, 20, 1).await.unwrap_err();
    assert_eq!(err.code(), "partition.invalid");
    assert!(panel.view(&m).await.unwrap().rois.is_empty());
}
