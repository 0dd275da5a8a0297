//! Scene catalog and download collaborators, plus a filesystem fallback that
//! builds candidate records from canonical SLC filenames.

use crate::core::geometry::RegionOfInterest;
use crate::core::orbit::OrbitResolver;
use crate::types::{FlightDirection, InsarError, InsarResult, Scene, SceneGeometry};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Remote scene search collaborator (e.g. an ASF-style archive API)
pub trait SceneCatalog {
    /// Search for scenes intersecting the region within the date range
    fn search(
        &self,
        roi: &RegionOfInterest,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> InsarResult<Vec<Scene>>;
}

/// Scene archive download collaborator
pub trait SceneDownloader {
    fn download(&self, scene: &Scene, target: &Path) -> InsarResult<()>;
}

/// Build candidate records from canonical SLC zip filenames in a directory.
///
/// Used when no catalog API is available; filenames carry acquisition time
/// and mission, but no footprint or track metadata, so such scenes resolve to
/// `SceneGeometry::Missing` and `track = None`.
pub fn scan_local_dir(data_dir: &Path) -> InsarResult<Vec<Scene>> {
    let pattern = Regex::new(r"^S1[ABC]_IW_SLC__.+\.zip$")
        .map_err(|e| InsarError::Configuration(format!("invalid scene pattern: {}", e)))?;

    let mut scenes = Vec::new();
    for entry in std::fs::read_dir(data_dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        if !path.is_file() || !pattern.is_match(name) {
            continue;
        }

        let scene_id = name.trim_end_matches(".zip").trim_end_matches("-SLC");
        let start_time = match OrbitResolver::parse_timestamp(scene_id) {
            Some(ts) => ts,
            None => {
                log::warn!("Skipping {}: unparsable acquisition timestamp", name);
                continue;
            }
        };
        let mission = match OrbitResolver::parse_mission(scene_id) {
            Some(m) => m.to_string(),
            None => {
                log::warn!("Skipping {}: unknown mission prefix", name);
                continue;
            }
        };

        scenes.push(Scene {
            scene_id: scene_id.to_string(),
            start_time,
            mission,
            track: None,
            flight_direction: FlightDirection::Unknown,
            footprint: SceneGeometry::Missing,
            download_url: None,
            local_path: Some(path.clone()),
        });
    }

    scenes.sort_by(|a, b| a.scene_id.cmp(&b.scene_id));
    log::info!("Local scan found {} SLC scenes in {}", scenes.len(), data_dir.display());
    Ok(scenes)
}

/// Download every scene into `data_dir`, skipping files already on disk.
/// Returns the paths of the zips actually fetched.
pub fn download_missing(
    downloader: &dyn SceneDownloader,
    scenes: &[&Scene],
    data_dir: &Path,
) -> InsarResult<Vec<PathBuf>> {
    std::fs::create_dir_all(data_dir)?;

    let mut fetched = Vec::new();
    for scene in scenes {
        let target = match &scene.local_path {
            Some(path) => path.clone(),
            None => data_dir.join(format!("{}.zip", scene.scene_id)),
        };
        if target.exists() {
            log::info!("Scene {} already on disk, skipping", scene.scene_id);
            continue;
        }

        log::info!("Downloading scene {}", scene.scene_id);
        downloader.download(scene, &target)?;
        fetched.push(target);
    }
    Ok(fetched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_local_dir_filters_and_parses() {
        let dir = TempDir::new().unwrap();
        let valid = "S1A_IW_SLC__1SDV_20220103T092230_20220103T092257_041257_04E78F_5AE7.zip";
        std::fs::write(dir.path().join(valid), b"zip").unwrap();
        std::fs::write(dir.path().join("S1A_IW_GRDH_other.zip"), b"zip").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let scenes = scan_local_dir(dir.path()).unwrap();
        assert_eq!(scenes.len(), 1);

        let scene = &scenes[0];
        assert_eq!(scene.mission, "S1A");
        assert_eq!(scene.track, None);
        assert!(matches!(scene.footprint, SceneGeometry::Missing));
        assert_eq!(scene.start_time.format("%Y%m%dT%H%M%S").to_string(), "20220103T092230");
        assert_eq!(scene.local_path.as_deref(), Some(dir.path().join(valid).as_path()));
    }

    #[test]
    fn test_download_missing_skips_existing() {
        struct CountingDownloader(std::cell::Cell<usize>);
        impl SceneDownloader for CountingDownloader {
            fn download(&self, _scene: &Scene, target: &Path) -> InsarResult<()> {
                self.0.set(self.0.get() + 1);
                std::fs::write(target, b"zip")?;
                Ok(())
            }
        }

        let dir = TempDir::new().unwrap();
        let on_disk = "S1A_IW_SLC__1SDV_20220103T092230_20220103T092257_041257_04E78F_5AE7";
        let missing = "S1A_IW_SLC__1SDV_20220115T092230_20220115T092257_041432_04ED3B_11C1";
        std::fs::write(dir.path().join(format!("{}.zip", on_disk)), b"zip").unwrap();

        let make = |id: &str| Scene {
            scene_id: id.to_string(),
            start_time: OrbitResolver::parse_timestamp(id).unwrap(),
            mission: "S1A".to_string(),
            track: None,
            flight_direction: FlightDirection::Unknown,
            footprint: SceneGeometry::Missing,
            download_url: None,
            local_path: None,
        };
        let a = make(on_disk);
        let b = make(missing);

        let downloader = CountingDownloader(std::cell::Cell::new(0));
        let fetched = download_missing(&downloader, &[&a, &b], dir.path()).unwrap();

        assert_eq!(downloader.0.get(), 1);
        assert_eq!(fetched, vec![dir.path().join(format!("{}.zip", missing))]);
    }
}
