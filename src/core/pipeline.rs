//! Pipeline orchestration: sequences scene selection, orbit resolution,
//! elevation preparation and configuration assembly, then hands off to the
//! external processing engine and scans its output layout.
//!
//! Stages communicate through their immutable status records only.

use crate::core::config::{ConfigAssembler, ConfigOptions};
use crate::core::dem::{DemExtent, DemManager, DemStatus, RasterExporter, RasterStitcher};
use crate::core::orbit::{OrbitResolution, OrbitResolver, OrbitSource, OrbitStatus};
use crate::core::selection::{SceneSelection, SelectionStatus};
use crate::types::{InsarError, InsarResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Once;

/// Optional engine step range (e.g. resume from `unwrap`)
#[derive(Debug, Clone, Default)]
pub struct StepRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// External processing engine seam. The concrete runner lives in `io::engine`.
pub trait EngineRunner {
    /// Execute the engine inside `work_dir`, which holds the assembled
    /// configuration and symlinked inputs. Non-zero exit is an
    /// `ExternalTool` error.
    fn run(&self, work_dir: &Path, steps: &StepRange) -> InsarResult<()>;
}

/// Output product grid category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductKind {
    Geocoded,
    RadarCoords,
}

/// One engine output product found by the result scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductFile {
    pub filename: String,
    pub kind: ProductKind,
    pub size_bytes: u64,
    pub path: PathBuf,
}

/// Full run summary: every stage's status record plus the result scan
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub selection: SelectionStatus,
    pub orbit: OrbitStatus,
    pub orbit_report: Vec<OrbitResolution>,
    pub dem: DemStatus,
    pub engine_succeeded: bool,
    pub products: Vec<ProductFile>,
}

static ENV_PREP: Once = Once::new();

/// Idempotent per-process environment fixup applied before engine invocation:
/// puts the active prefix's `bin` on PATH and points PROJ_LIB at its proj
/// data so the engine's tooling resolves consistently. Safe to call from
/// anywhere; only the first call has any effect.
pub fn prepare_environment() {
    ENV_PREP.call_once(|| {
        let prefix = match std::env::var_os("CONDA_PREFIX") {
            Some(prefix) => PathBuf::from(prefix),
            None => return,
        };

        let bin_dir = prefix.join("bin");
        if bin_dir.is_dir() {
            let current = std::env::var_os("PATH").unwrap_or_default();
            let mut paths: Vec<PathBuf> = std::env::split_paths(&current).collect();
            if !paths.contains(&bin_dir) {
                paths.insert(0, bin_dir.clone());
                if let Ok(joined) = std::env::join_paths(paths) {
                    std::env::set_var("PATH", joined);
                    log::info!("Added {} to PATH", bin_dir.display());
                }
            }
        }

        let proj_lib = prefix.join("share").join("proj");
        if proj_lib.is_dir() && std::env::var_os("PROJ_LIB").is_none() {
            log::info!("Setting PROJ_LIB to {}", proj_lib.display());
            std::env::set_var("PROJ_LIB", proj_lib);
        }
    });
}

/// Sequences the pipeline stages and owns the engine working directory
pub struct Pipeline {
    work_dir: PathBuf,
    assembler: ConfigAssembler,
    config_path: Option<PathBuf>,
}

impl Pipeline {
    pub fn new<P: Into<PathBuf>>(work_dir: P) -> InsarResult<Self> {
        let work_dir = work_dir.into();
        std::fs::create_dir_all(&work_dir)?;
        prepare_environment();
        log::info!("Preparing workspace in {}", work_dir.display());
        let assembler = ConfigAssembler::new(&work_dir)?;
        Ok(Self { work_dir, assembler, config_path: None })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Assemble the engine configuration from the upstream status records.
    /// Refuses to proceed when a required stage is not ready.
    pub fn create_config(
        &mut self,
        selection: &SelectionStatus,
        orbit: &OrbitStatus,
        dem: &DemStatus,
        options: &ConfigOptions,
    ) -> InsarResult<PathBuf> {
        if !selection.ready {
            return Err(InsarError::Configuration(
                "selection stage not ready (reference and at least one secondary required)"
                    .to_string(),
            ));
        }
        if !dem.ready {
            return Err(InsarError::Configuration(
                "elevation stage not ready; refusing to configure the engine".to_string(),
            ));
        }

        let path = self.assembler.assemble(selection, orbit, dem, options)?;
        self.config_path = Some(path.clone());
        Ok(path)
    }

    /// Invoke the external engine against the assembled configuration
    pub fn run(&self, runner: &dyn EngineRunner, steps: &StepRange) -> InsarResult<()> {
        if self.config_path.is_none() {
            return Err(InsarError::Configuration(
                "no configuration assembled; call create_config() first".to_string(),
            ));
        }
        runner.run(&self.work_dir, steps)
    }

    /// Scan the engine output layout for product files
    pub fn collect_results(&self, geocoded_only: bool) -> InsarResult<Vec<ProductFile>> {
        collect_results(&self.work_dir, geocoded_only)
    }

    /// Run the whole pipeline: orbit resolution, elevation preparation
    /// (wide coverage over the selection), configuration assembly (narrow
    /// ROI via `options.roi`), engine execution and result scan.
    ///
    /// Elevation failures halt before the engine with `dem.ready == false`;
    /// an engine failure is reported but the result scan still runs.
    #[allow(clippy::too_many_arguments)]
    pub fn orchestrate(
        &mut self,
        selection: &SceneSelection,
        resolver: &OrbitResolver,
        orbit_source: &dyn OrbitSource,
        dem: &mut DemManager,
        stitcher: &dyn RasterStitcher,
        exporter: &dyn RasterExporter,
        runner: &dyn EngineRunner,
        dataset: &str,
        buffer_deg: f64,
        options: &ConfigOptions,
        steps: &StepRange,
    ) -> InsarResult<PipelineOutcome> {
        let selection_status = selection.status();
        if !selection_status.ready {
            return Err(InsarError::Configuration(
                "selection stage not ready; set a reference and select secondaries".to_string(),
            ));
        }

        let scene_ids: Vec<String> = selection
            .scenes_to_fetch()
            .iter()
            .map(|s| s.scene_id.clone())
            .collect();
        let orbit_report = resolver.resolve_batch(orbit_source, &scene_ids)?;
        let unusable = orbit_report.iter().filter(|r| !r.outcome.is_usable()).count();
        if unusable > 0 {
            log::warn!("{} of {} scenes have no usable orbit file", unusable, orbit_report.len());
        }
        let orbit_status = resolver.status();

        // Wide coverage: the DEM spans the selection's shared extent, while
        // the engine is restricted to options.roi during config assembly.
        if let Err(e) = dem.prepare(
            stitcher,
            exporter,
            DemExtent::Selection(selection),
            dataset,
            buffer_deg,
            false,
        ) {
            log::error!("Elevation preparation failed: {}; halting before engine invocation", e);
            return Ok(PipelineOutcome {
                selection: selection_status,
                orbit: orbit_status,
                orbit_report,
                dem: dem.status(),
                engine_succeeded: false,
                products: Vec::new(),
            });
        }
        let dem_status = dem.status();

        self.create_config(&selection_status, &orbit_status, &dem_status, options)?;

        let engine_succeeded = match self.run(runner, steps) {
            Ok(()) => {
                log::info!("Engine run completed");
                true
            }
            Err(e) => {
                log::error!("Engine run failed: {}", e);
                false
            }
        };

        let products = self.collect_results(false)?;
        log::info!("Result scan found {} product files", products.len());

        Ok(PipelineOutcome {
            selection: selection_status,
            orbit: orbit_status,
            orbit_report,
            dem: dem_status,
            engine_succeeded,
            products,
        })
    }
}

/// Extensions the engine writes into `merged/`; geocoded variants append `.geo`
const PRODUCT_EXTENSIONS: &[&str] = &[".unw", ".cor", ".flat", ".rdr"];

/// Scan the known output layout (`merged/`) for product files, skipping
/// `.xml`/`.vrt` sidecars. Results come back sorted by filename.
pub fn collect_results(work_dir: &Path, geocoded_only: bool) -> InsarResult<Vec<ProductFile>> {
    let merged_dir = work_dir.join("merged");
    if !merged_dir.exists() {
        log::warn!("'merged' directory not found; engine may not have finished");
        return Ok(Vec::new());
    }

    let mut products = Vec::new();
    for entry in std::fs::read_dir(&merged_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };

        if filename.ends_with(".xml") || filename.ends_with(".vrt") {
            continue;
        }

        let geocoded = filename.ends_with(".geo");
        let stem = filename.trim_end_matches(".geo");
        let is_product = PRODUCT_EXTENSIONS.iter().any(|ext| stem.ends_with(ext));
        if !is_product || (geocoded_only && !geocoded) {
            continue;
        }

        let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
        products.push(ProductFile {
            filename,
            kind: if geocoded { ProductKind::Geocoded } else { ProductKind::RadarCoords },
            size_bytes,
            path,
        });
    }

    products.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(products)
}
