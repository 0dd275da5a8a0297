//! Integration tests for the content-addressed elevation cache: repeated
//! preparation over the same region must not re-trigger the expensive
//! collaborators.

use dinsar::core::dem::{DemExtent, DemManager, RasterExporter, RasterStitcher, MIN_ARTIFACT_BYTES};
use dinsar::core::geometry::RegionOfInterest;
use dinsar::types::{BoundingBox, InsarError, InsarResult};
use std::cell::Cell;
use std::path::Path;
use tempfile::TempDir;

struct CountingStitcher {
    calls: Cell<usize>,
    bytes: usize,
}

impl CountingStitcher {
    fn new() -> Self {
        Self { calls: Cell::new(0), bytes: 4096 }
    }

    fn truncated() -> Self {
        Self { calls: Cell::new(0), bytes: 16 }
    }
}

impl RasterStitcher for CountingStitcher {
    fn stitch(
        &self,
        _bounds: &BoundingBox,
        _dataset: &str,
        _ellipsoidal_height: bool,
        output: &Path,
    ) -> InsarResult<()> {
        self.calls.set(self.calls.get() + 1);
        std::fs::write(output, vec![0u8; self.bytes])?;
        Ok(())
    }
}

struct CountingExporter {
    calls: Cell<usize>,
}

impl CountingExporter {
    fn new() -> Self {
        Self { calls: Cell::new(0) }
    }
}

impl RasterExporter for CountingExporter {
    fn export(&self, _source: &Path, target: &Path) -> InsarResult<()> {
        self.calls.set(self.calls.get() + 1);
        std::fs::write(target, vec![0u8; 4096])?;
        let sidecar = DemManager::sidecar_path(target);
        std::fs::write(sidecar, b"<imageFile/>")?;
        Ok(())
    }

    fn is_openable(&self, path: &Path) -> bool {
        path.exists()
    }
}

fn roi() -> RegionOfInterest {
    RegionOfInterest::Snwe([37.2, 37.8, 126.5, 127.1])
}

#[test]
fn repeated_fetch_over_same_region_stitches_once() {
    let save = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let mut manager = DemManager::new(save.path(), Some(temp.path().to_path_buf())).unwrap();
    let stitcher = CountingStitcher::new();
    let region = roi();

    let first = manager
        .fetch(&stitcher, DemExtent::Roi(&region), "glo_30", 0.1, false)
        .unwrap();
    let second = manager
        .fetch(&stitcher, DemExtent::Roi(&region), "glo_30", 0.1, false)
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(stitcher.calls.get(), 1);
}

#[test]
fn different_region_or_dataset_is_a_cache_miss() {
    let save = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let mut manager = DemManager::new(save.path(), Some(temp.path().to_path_buf())).unwrap();
    let stitcher = CountingStitcher::new();
    let region = roi();

    let a = manager
        .fetch(&stitcher, DemExtent::Roi(&region), "glo_30", 0.1, false)
        .unwrap();
    let b = manager
        .fetch(&stitcher, DemExtent::Roi(&region), "nasadem", 0.1, false)
        .unwrap();

    assert_ne!(a, b);
    assert_eq!(stitcher.calls.get(), 2);
}

#[test]
fn overwrite_forces_a_fresh_stitch() {
    let save = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let mut manager = DemManager::new(save.path(), Some(temp.path().to_path_buf())).unwrap();
    let stitcher = CountingStitcher::new();
    let region = roi();

    manager
        .fetch(&stitcher, DemExtent::Roi(&region), "glo_30", 0.1, false)
        .unwrap();
    manager
        .fetch(&stitcher, DemExtent::Roi(&region), "glo_30", 0.1, true)
        .unwrap();

    assert_eq!(stitcher.calls.get(), 2);
}

#[test]
fn truncated_cache_entry_is_refetched() {
    let save = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let mut manager = DemManager::new(save.path(), Some(temp.path().to_path_buf())).unwrap();
    let stitcher = CountingStitcher::new();
    let region = roi();

    let cached = manager
        .fetch(&stitcher, DemExtent::Roi(&region), "glo_30", 0.1, false)
        .unwrap();

    // Simulate an interrupted write below the plausibility threshold
    std::fs::write(&cached, vec![0u8; (MIN_ARTIFACT_BYTES / 2) as usize]).unwrap();

    manager
        .fetch(&stitcher, DemExtent::Roi(&region), "glo_30", 0.1, false)
        .unwrap();
    assert_eq!(stitcher.calls.get(), 2);
}

#[test]
fn undersized_stitch_result_is_a_cache_integrity_error() {
    let save = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let mut manager = DemManager::new(save.path(), Some(temp.path().to_path_buf())).unwrap();
    let stitcher = CountingStitcher::truncated();
    let region = roi();

    let err = manager
        .fetch(&stitcher, DemExtent::Roi(&region), "glo_30", 0.1, false)
        .unwrap_err();
    assert!(matches!(err, InsarError::CacheIntegrity(_)));
    assert!(manager.dem_file().is_none());
}

#[test]
fn repeated_prepare_converts_once() {
    let save = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let mut manager = DemManager::new(save.path(), Some(temp.path().to_path_buf())).unwrap();
    let stitcher = CountingStitcher::new();
    let exporter = CountingExporter::new();
    let region = roi();

    let first = manager
        .prepare(&stitcher, &exporter, DemExtent::Roi(&region), "glo_30", 0.1, false)
        .unwrap();
    let second = manager
        .prepare(&stitcher, &exporter, DemExtent::Roi(&region), "glo_30", 0.1, false)
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(stitcher.calls.get(), 1);
    assert_eq!(exporter.calls.get(), 1);
    assert_eq!(first, save.path().join("dem.wgs84"));

    let status = manager.status();
    assert!(status.ready);
    assert!(status.bounds.is_some());
}

#[test]
fn export_without_fetch_is_a_configuration_error() {
    let save = TempDir::new().unwrap();
    let mut manager = DemManager::new(save.path(), None).unwrap();
    let exporter = CountingExporter::new();

    let err = manager.export(&exporter, false).unwrap_err();
    assert!(matches!(err, InsarError::Configuration(_)));
    assert_eq!(exporter.calls.get(), 0);
}
