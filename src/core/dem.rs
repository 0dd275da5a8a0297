//! Elevation-model preparation with a two-level content-addressed cache:
//! the stitched raster and the engine-native conversion short-circuit
//! independently on repeated runs over overlapping regions.

use crate::core::geometry::{self, RegionOfInterest};
use crate::core::selection::SceneSelection;
use crate::types::{BoundingBox, InsarError, InsarResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Minimum plausible artifact size; anything smaller is treated as a failed
/// or truncated write and re-fetched.
pub const MIN_ARTIFACT_BYTES: u64 = 1024;

/// External raster-mosaicking collaborator: downloads and stitches elevation
/// tiles over the requested bounds into a single GeoTIFF at `output`.
pub trait RasterStitcher {
    fn stitch(
        &self,
        bounds: &BoundingBox,
        dataset: &str,
        ellipsoidal_height: bool,
        output: &Path,
    ) -> InsarResult<()>;
}

/// External format-conversion collaborator: writes the processing-engine
/// native raster plus its paired metadata sidecar.
pub trait RasterExporter {
    fn export(&self, source: &Path, target: &Path) -> InsarResult<()>;

    /// Lightweight open check by the raster backend
    fn is_openable(&self, path: &Path) -> bool;
}

/// Spatial extent driving elevation preparation: either derived from the
/// scene selection (wide coverage) or an explicit region of interest
/// (narrow processing). These are independent choices; see the orchestrator.
#[derive(Debug, Clone, Copy)]
pub enum DemExtent<'a> {
    Selection(&'a SceneSelection),
    Roi(&'a RegionOfInterest),
}

/// Read-only status record for configuration assembly.
/// `bounds` is the buffered extent actually covered by the raster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemStatus {
    pub ready: bool,
    pub save_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub dem_path: Option<PathBuf>,
    pub bounds: Option<BoundingBox>,
}

/// Deterministic fingerprint over (bounds, dataset, buffer).
///
/// Bounds are canonically formatted to six decimals before hashing so
/// re-constructed floats with identical values never produce spurious cache
/// misses. Truncated to 12 hex characters.
pub fn fingerprint(bounds: &BoundingBox, dataset: &str, buffer_deg: f64) -> String {
    let canonical = format!(
        "{:.6}_{:.6}_{:.6}_{:.6}_{}_{:.6}",
        bounds.min_lon, bounds.min_lat, bounds.max_lon, bounds.max_lat, dataset, buffer_deg
    );
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{:x}", digest)[..12].to_string()
}

/// Manages elevation raster acquisition and conversion for the engine.
///
/// Intermediate stitched GeoTIFFs live in `temp_dir` keyed by fingerprint;
/// the final engine-native product lives in `save_dir`.
pub struct DemManager {
    save_dir: PathBuf,
    temp_dir: PathBuf,
    current_tif: Option<PathBuf>,
    current_bounds: Option<BoundingBox>,
    dem_file: Option<PathBuf>,
}

impl DemManager {
    pub fn new<P: Into<PathBuf>>(save_dir: P, temp_dir: Option<PathBuf>) -> InsarResult<Self> {
        let save_dir = save_dir.into();
        std::fs::create_dir_all(&save_dir)?;

        let temp_dir = match temp_dir {
            Some(dir) => {
                std::fs::create_dir_all(&dir)?;
                dir
            }
            None => std::env::temp_dir(),
        };

        Ok(Self {
            save_dir,
            temp_dir,
            current_tif: None,
            current_bounds: None,
            dem_file: None,
        })
    }

    /// Fetch (or reuse) the stitched elevation raster covering `extent`.
    ///
    /// Computes the buffered target bounds, derives the cache fingerprint and
    /// reuses a matching artifact unless `overwrite` is set or the file fails
    /// the minimum-size check. Writes are atomic: stitch into a temp file in
    /// the same directory, then rename into place.
    pub fn fetch(
        &mut self,
        stitcher: &dyn RasterStitcher,
        extent: DemExtent<'_>,
        dataset: &str,
        buffer_deg: f64,
        overwrite: bool,
    ) -> InsarResult<PathBuf> {
        let raw_bounds = match extent {
            DemExtent::Selection(selection) => {
                log::info!("Calculating DEM bounds from scene intersection");
                geometry::intersection_bounds(selection)?
            }
            DemExtent::Roi(roi) => {
                log::info!("Calculating DEM bounds from provided ROI");
                roi.bounds()?
            }
        };

        let bounds = raw_bounds.buffered(buffer_deg);
        let hash = fingerprint(&bounds, dataset, buffer_deg);
        let output_path = self.temp_dir.join(format!("dem_{}_{}.tif", dataset, hash));

        let snwe = bounds.to_snwe();
        log::info!(
            "Target bounds (SNWE): {:.4}, {:.4}, {:.4}, {:.4}",
            snwe[0], snwe[1], snwe[2], snwe[3]
        );
        log::info!("Cache fingerprint: {} -> {}", hash, output_path.display());

        if !overwrite && Self::is_plausible_artifact(&output_path) {
            log::info!("Matching DEM cache entry found, skipping download");
            self.current_tif = Some(output_path.clone());
            self.current_bounds = Some(bounds);
            return Ok(output_path);
        }

        log::info!("Stitching '{}' over {}", dataset, bounds);
        let tmp = tempfile::Builder::new()
            .prefix(".dem_")
            .suffix(".partial")
            .tempfile_in(&self.temp_dir)?;
        let tmp_path = tmp.into_temp_path();

        stitcher.stitch(&bounds, dataset, true, &tmp_path)?;

        let written = std::fs::metadata(&tmp_path).map(|m| m.len()).unwrap_or(0);
        if written < MIN_ARTIFACT_BYTES {
            return Err(InsarError::CacheIntegrity(format!(
                "stitched artifact is only {} bytes (< {} minimum)",
                written, MIN_ARTIFACT_BYTES
            )));
        }

        tmp_path.persist(&output_path).map_err(|e| {
            InsarError::CacheIntegrity(format!(
                "failed to move stitched artifact into place: {}",
                e
            ))
        })?;

        self.current_tif = Some(output_path.clone());
        self.current_bounds = Some(bounds);
        Ok(output_path)
    }

    /// Convert the fetched raster into the engine-native format (or reuse a
    /// valid existing conversion).
    pub fn export(&mut self, exporter: &dyn RasterExporter, overwrite: bool) -> InsarResult<PathBuf> {
        let source = self
            .current_tif
            .as_ref()
            .filter(|p| p.exists())
            .cloned()
            .ok_or_else(|| {
                InsarError::Configuration("no fetched DEM found; run fetch() first".to_string())
            })?;

        let engine_path = self.save_dir.join("dem.wgs84");

        if !overwrite && Self::is_valid_engine_file(exporter, &engine_path) {
            log::info!("Valid engine DEM already exists, skipping conversion");
            self.dem_file = Some(engine_path.clone());
            return Ok(engine_path);
        }

        log::info!("Exporting DEM to engine format: {}", engine_path.display());
        exporter.export(&source, &engine_path)?;

        if !Self::is_valid_engine_file(exporter, &engine_path) {
            return Err(InsarError::CacheIntegrity(format!(
                "converted DEM {} failed the validity check",
                engine_path.display()
            )));
        }

        self.dem_file = Some(engine_path.clone());
        Ok(engine_path)
    }

    /// Fetch followed by export: the automated preparation wrapper
    pub fn prepare(
        &mut self,
        stitcher: &dyn RasterStitcher,
        exporter: &dyn RasterExporter,
        extent: DemExtent<'_>,
        dataset: &str,
        buffer_deg: f64,
        overwrite: bool,
    ) -> InsarResult<PathBuf> {
        self.fetch(stitcher, extent, dataset, buffer_deg, overwrite)?;
        self.export(exporter, overwrite)
    }

    /// Existence + minimum-size check; truncated files count as misses
    fn is_plausible_artifact(path: &Path) -> bool {
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.len() >= MIN_ARTIFACT_BYTES)
            .unwrap_or(false)
    }

    /// Lightweight integrity check for a converted engine file: existence,
    /// minimum size, paired metadata sidecar, openable by the raster backend.
    fn is_valid_engine_file(exporter: &dyn RasterExporter, path: &Path) -> bool {
        if !Self::is_plausible_artifact(path) {
            return false;
        }
        if !Self::sidecar_path(path).exists() {
            return false;
        }
        exporter.is_openable(path)
    }

    /// Metadata sidecar convention: `<name>.xml` next to the raster
    pub fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".xml");
        path.with_file_name(name)
    }

    pub fn dem_file(&self) -> Option<&Path> {
        self.dem_file.as_deref()
    }

    pub fn dem_bounds(&self) -> Option<BoundingBox> {
        self.current_bounds
    }

    /// Immutable status record for downstream stages
    pub fn status(&self) -> DemStatus {
        let ready = self
            .dem_file
            .as_ref()
            .map(|p| p.exists())
            .unwrap_or(false);
        DemStatus {
            ready,
            save_dir: self.save_dir.clone(),
            temp_dir: self.temp_dir.clone(),
            dem_path: self.dem_file.clone(),
            bounds: self.current_bounds,
        }
    }
}
