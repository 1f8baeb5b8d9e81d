//! Built-in pipelines
//!
//! Two pipelines ship with the orchestrator:
//! - `optimization`: image analysis, native optimization, concurrent
//!   processing, color extraction and a final backend update
//! - `unified-colors`: master palette generation followed by color
//!   optimization, persisted as the unified color system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use tracing::{info, warn};
use weave_core::domain::pipeline::{PipelineDefinition, PipelineReport, PipelineStage};

use crate::error::Result;
use crate::repository::ReportRepository;
use crate::scheduler::PipelineCoordinator;

pub const OPTIMIZATION: &str = "optimization";
pub const UNIFIED_COLORS: &str = "unified-colors";

/// File the unified color system is stored in, inside shared data
pub const COLOR_SYSTEM_FILE: &str = "unified_color_system.json";
pub const COLOR_SYSTEM_VERSION: &str = "1.0.0";

const PALETTE_STAGE: &str = "master-palette";
const OPTIMIZE_COLORS_STAGE: &str = "optimize-colors";

/// Image optimization chain over a set of input images
pub fn optimization() -> PipelineDefinition {
    PipelineDefinition::new(
        OPTIMIZATION,
        vec![
            PipelineStage::new("analyze", "python", "image_optimizer.py")
                .with_args(["--analyze", "{inputs}"])
                .with_input(serde_json::json!({
                    "pipeline_id": "{run_id}",
                    "mode": "analyze",
                })),
            PipelineStage::new("optimize", "cpp", "performance_optimizer.cpp")
                .with_args([
                    "--optimize",
                    "--data={shared_data}/analysis_{run_id}.json",
                ])
                .depends_on_previous(),
            PipelineStage::new("process", "rust", "performance_utils.rs").with_args([
                "--concurrent-process",
                "--input={shared_data}/optimized_{run_id}.json",
            ]),
            PipelineStage::new("extract-colors", "ruby", "color_animation_engine.rb")
                .with_args(["--extract-colors", "--images={inputs_csv}"]),
            PipelineStage::new("update-backend", "php", "backend.php")
                .with_args(["--update-optimized", "--pipeline={run_id}"])
                .requires_all_previous(),
        ],
    )
}

/// Palette generation followed by color optimization
pub fn unified_colors() -> PipelineDefinition {
    PipelineDefinition::new(
        UNIFIED_COLORS,
        vec![
            PipelineStage::new(PALETTE_STAGE, "ruby", "color_animation_engine.rb")
                .with_args(["--generate-master-palette"]),
            PipelineStage::new(OPTIMIZE_COLORS_STAGE, "rust", "performance_utils.rs")
                .with_args(["--optimize-colors"])
                .depends_on_previous()
                .forward_as("palette"),
        ],
    )
}

/// Looks up a built-in pipeline by name
pub fn builtin(name: &str) -> Option<PipelineDefinition> {
    match name {
        OPTIMIZATION => Some(optimization()),
        UNIFIED_COLORS => Some(unified_colors()),
        _ => None,
    }
}

pub fn names() -> [&'static str; 2] {
    [OPTIMIZATION, UNIFIED_COLORS]
}

/// Palette shared by every frontend and backend worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedColorSystem {
    pub master_palette: JsonValue,
    /// Output of the optimization stage, empty when that stage failed
    pub optimizations: JsonValue,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub version: String,
}

impl UnifiedColorSystem {
    /// Builds the color system from a finished `unified-colors` run
    ///
    /// Returns `None` when no master palette was produced.
    pub fn from_report(report: &PipelineReport) -> Option<Self> {
        let palette_stage = report.stage(PALETTE_STAGE)?;
        if !palette_stage.status.is_success() {
            return None;
        }

        let master_palette = palette_stage
            .parsed_payload()
            .cloned()
            .unwrap_or_else(empty_object);

        let optimizations = report
            .stage(OPTIMIZE_COLORS_STAGE)
            .filter(|s| s.status.is_success())
            .and_then(|s| s.parsed_payload())
            .cloned()
            .unwrap_or_else(empty_object);

        Some(Self {
            master_palette,
            optimizations,
            run_id: report.run_id.clone(),
            created_at: Utc::now(),
            version: COLOR_SYSTEM_VERSION.to_string(),
        })
    }
}

/// Outcome of the colors action
#[derive(Debug)]
pub struct ColorSystemOutcome {
    pub report: PipelineReport,
    /// Stored color system and its path; `None` when palette generation failed
    pub system: Option<(UnifiedColorSystem, PathBuf)>,
}

/// Runs `unified-colors` and persists the resulting color system
pub async fn create_unified_color_system(
    coordinator: &PipelineCoordinator,
    reports: &dyn ReportRepository,
) -> Result<ColorSystemOutcome> {
    info!("Creating unified color system");

    let report = coordinator.run(&unified_colors(), &[]).await?;

    let Some(system) = UnifiedColorSystem::from_report(&report) else {
        warn!("Master palette generation failed (run {})", report.run_id);
        return Ok(ColorSystemOutcome {
            report,
            system: None,
        });
    };

    let value = serde_json::to_value(&system)?;
    let path = reports.save_artifact(COLOR_SYSTEM_FILE, &value).await?;
    info!("Unified color system saved to {}", path.display());

    Ok(ColorSystemOutcome {
        report,
        system: Some((system, path)),
    })
}

fn empty_object() -> JsonValue {
    JsonValue::Object(serde_json::Map::new())
}
