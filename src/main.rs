//! CLI entry point for roi-tracking
//!
//! Offline ROI authoring against the saved sets the control panel uses:
//! - `auto-mask`: build a grid of ROIs and save it
//! - `draw`: append one outline to a machine's saved set
//! - `show`: print a machine's saved set
//!
//! # Usage
//!
//! ```bash
//! roi_tracking auto-mask --machine etho-01 --rows 10 --cols 2
//! roi_tracking draw --machine etho-01 --points "10,10;200,10;100,150" --label feeder
//! roi_tracking show --machine etho-01
//! ```

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use roi_tracking::camera::FixedFrameProvider;
use roi_tracking::config::{PanelConfig, DEFAULT_CONFIG_PATH};
use roi_tracking::error::PersistenceError;
use roi_tracking::storage::FileRoiRepository;
use roi_tracking::{logging, ControlPanel, FrameBounds, MachineId, PanelError, PanelView, Point};

#[derive(Parser)]
#[command(name = "roi_tracking")]
#[command(about = "ROI authoring for camera-based tracking", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Partition the frame into a grid of ROIs and save it
    AutoMask {
        /// Machine identifier
        #[arg(long)]
        machine: String,
        /// Grid rows (defaults to the configured value)
        #[arg(long)]
        rows: Option<u32>,
        /// Grid columns (defaults to the configured value)
        #[arg(long)]
        cols: Option<u32>,
        /// Frame width in pixels (defaults to the configured camera)
        #[arg(long, requires = "height")]
        width: Option<u32>,
        /// Frame height in pixels
        #[arg(long, requires = "width")]
        height: Option<u32>,
    },

    /// Add one polygon to the saved set
    Draw {
        /// Machine identifier
        #[arg(long)]
        machine: String,
        /// Vertices as "x,y;x,y;..."
        #[arg(long)]
        points: String,
        /// Optional label
        #[arg(long)]
        label: Option<String>,
    },

    /// Print the saved set
    Show {
        /// Machine identifier
        #[arg(long)]
        machine: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = PanelConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.validate().map_err(|e| anyhow!(e))?;
    logging::init_from_config(&config).map_err(|e| anyhow!(e))?;

    match cli.command {
        Commands::AutoMask {
            machine,
            rows,
            cols,
            width,
            height,
        } => {
            let bounds = match (width, height) {
                (Some(w), Some(h)) => FrameBounds::new(w, h),
                _ => config.camera.bounds(),
            };
            let rows = rows.unwrap_or(config.auto_mask.rows);
            let cols = cols.unwrap_or(config.auto_mask.cols);
            let machine = MachineId::new(machine);
            let panel = build_panel(config, bounds);

            panel.auto_mask(&machine, rows, cols).await?;
            let view = panel.save(&machine).await?;
            print_view(&view);
        }
        Commands::Draw {
            machine,
            points,
            label,
        } => {
            let machine = MachineId::new(machine);
            let bounds = config.camera.bounds();
            let panel = build_panel(config, bounds);
            load_if_present(&panel, &machine).await?;

            for point in parse_points(&points)? {
                panel.add_point(&machine, point).await?;
            }
            panel.close_polygon_with_label(&machine, label).await?;
            let view = panel.save(&machine).await?;
            print_view(&view);
        }
        Commands::Show { machine } => {
            let machine = MachineId::new(machine);
            let bounds = config.camera.bounds();
            let panel = build_panel(config, bounds);
            let view = panel.load(&machine).await?;
            print_view(&view);
        }
    }

    Ok(())
}

fn build_panel(config: PanelConfig, bounds: FrameBounds) -> ControlPanel {
    let repository = FileRoiRepository::new(config.storage.roi_dir.clone());
    ControlPanel::new(
        config,
        Arc::new(FixedFrameProvider::new(bounds)),
        Arc::new(repository),
    )
}

async fn load_if_present(panel: &ControlPanel, machine: &MachineId) -> Result<()> {
    match panel.load(machine).await {
        Ok(_) | Err(PanelError::Persistence(PersistenceError::NotFound(_))) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn parse_points(input: &str) -> Result<Vec<Point>> {
    input
        .split(';')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| {
            let Some((x, y)) = pair.split_once(',') else {
                bail!("Invalid point '{}', expected x,y", pair);
            };
            let x: f64 = x.trim().parse().with_context(|| format!("bad x in '{pair}'"))?;
            let y: f64 = y.trim().parse().with_context(|| format!("bad y in '{pair}'"))?;
            Ok(Point::new(x, y))
        })
        .collect()
}

fn print_view(view: &PanelView) {
    println!("Machine {} ({} frame, {:?})", view.machine, view.bounds, view.status);
    for roi in &view.rois {
        let label = roi.label.as_deref().unwrap_or("-");
        println!(
            "  #{:<3} {:<12} {:>3} vertices  {:>4}x{:<4} px at ({}, {})",
            roi.id,
            label,
            roi.points.len(),
            roi.extent.width,
            roi.extent.height,
            roi.extent.x,
            roi.extent.y
        );
    }
    for warning in &view.warnings {
        println!("  warning: {:?}", warning);
    }
}
