//! Scene selection state: one reference scene plus a set of secondaries drawn
//! from a track-compatible candidate collection.

use crate::types::{InsarError, InsarResult, Scene};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Read-only status record exposed to downstream stages.
///
/// This is the only channel between the selection stage and the rest of the
/// pipeline; downstream code must not reach into `SceneSelection` internals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionStatus {
    pub ready: bool,
    pub data_dir: PathBuf,
    pub reference_id: Option<String>,
    pub secondary_count: usize,
    /// (reference zip, secondary zip) absolute path pairs
    pub pairs: Vec<(PathBuf, PathBuf)>,
}

/// Selection state over a filtered candidate collection.
///
/// Invariants: the reference, if set, is never counted among the reported
/// secondaries; with no reference set, no pairs can be produced. Unsetting
/// the reference resets the selection.
#[derive(Debug, Clone)]
pub struct SceneSelection {
    data_dir: PathBuf,
    candidates: Vec<Scene>,
    reference: Option<String>,
    secondaries: BTreeSet<String>,
}

impl SceneSelection {
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            candidates: Vec::new(),
            reference: None,
            secondaries: BTreeSet::new(),
        }
    }

    /// Replace the candidate collection (fresh search or local scan).
    /// Any existing selection is reset.
    pub fn set_candidates(&mut self, candidates: Vec<Scene>) {
        log::info!("Candidate collection replaced: {} scenes", candidates.len());
        self.candidates = candidates;
        self.reference = None;
        self.secondaries.clear();
    }

    /// Candidates compatible with the current reference: same track when the
    /// reference carries track metadata, the full collection otherwise.
    pub fn compatible_candidates(&self) -> Vec<&Scene> {
        match self.reference_scene().and_then(|r| r.track) {
            Some(track) => self
                .candidates
                .iter()
                .filter(|s| s.track == Some(track))
                .collect(),
            None => self.candidates.iter().collect(),
        }
    }

    /// Designate the reference scene.
    ///
    /// If the scene was previously selected as a secondary it is removed from
    /// the secondary set; a scene is never both reference and secondary.
    pub fn set_reference(&mut self, scene_id: &str) -> InsarResult<()> {
        if !self.candidates.iter().any(|s| s.scene_id == scene_id) {
            return Err(InsarError::Configuration(format!(
                "scene {} not found among {} candidates",
                scene_id,
                self.candidates.len()
            )));
        }

        if self.secondaries.remove(scene_id) {
            log::warn!("Scene {} was selected as secondary; removed on promotion to reference", scene_id);
        }

        self.reference = Some(scene_id.to_string());

        let compatible = self.compatible_candidates().len();
        let filtered = self.candidates.len() - compatible;
        if filtered > 0 {
            log::info!("Reference set to {} ({} track-incompatible scenes filtered)", scene_id, filtered);
        } else {
            log::info!("Reference set to {}", scene_id);
        }
        Ok(())
    }

    /// Unset the reference and reset the selection state
    pub fn unset_reference(&mut self) {
        if let Some(id) = self.reference.take() {
            log::info!("Reference {} unset; selection reset", id);
        }
        self.secondaries.clear();
    }

    /// Add a scene to the secondary set.
    ///
    /// Selecting the current reference is rejected with a warning rather than
    /// silently tolerated and filtered later.
    pub fn select(&mut self, scene_id: &str) -> InsarResult<()> {
        if self.reference.as_deref() == Some(scene_id) {
            log::warn!("Scene {} is the reference; not added as secondary", scene_id);
            return Ok(());
        }
        if !self
            .compatible_candidates()
            .iter()
            .any(|s| s.scene_id == scene_id)
        {
            return Err(InsarError::Configuration(format!(
                "scene {} is not a track-compatible candidate",
                scene_id
            )));
        }
        if self.secondaries.insert(scene_id.to_string()) {
            log::info!("Selected secondary {}", scene_id);
        }
        Ok(())
    }

    /// Remove a scene from the secondary set (no-op if absent)
    pub fn deselect(&mut self, scene_id: &str) {
        if self.secondaries.remove(scene_id) {
            log::info!("Deselected secondary {}", scene_id);
        }
    }

    /// Clear all secondaries, keeping the reference
    pub fn clear_selection(&mut self) {
        self.secondaries.clear();
        log::info!("Secondary selection cleared");
    }

    pub fn reference_scene(&self) -> Option<&Scene> {
        let id = self.reference.as_deref()?;
        self.candidates.iter().find(|s| s.scene_id == id)
    }

    /// Selected secondary scenes in stable (sorted-id) order, with the
    /// reference excluded defensively even if it slipped into the set.
    pub fn secondary_scenes(&self) -> Vec<&Scene> {
        self.secondaries
            .iter()
            .filter(|id| self.reference.as_deref() != Some(id.as_str()))
            .filter_map(|id| self.candidates.iter().find(|s| s.scene_id == *id))
            .collect()
    }

    /// All scenes that downloads must cover: the reference plus secondaries
    pub fn scenes_to_fetch(&self) -> Vec<&Scene> {
        let mut scenes = Vec::new();
        if let Some(reference) = self.reference_scene() {
            scenes.push(reference);
        }
        scenes.extend(self.secondary_scenes());
        scenes
    }

    /// (reference, secondary) zip path pairs for the processing engine.
    /// Empty without a reference or without any secondaries.
    pub fn pairs(&self) -> Vec<(PathBuf, PathBuf)> {
        let reference = match self.reference_scene() {
            Some(scene) => scene,
            None => return Vec::new(),
        };
        let reference_path = self.zip_path(reference);

        self.secondary_scenes()
            .iter()
            .map(|secondary| (reference_path.clone(), self.zip_path(secondary)))
            .collect()
    }

    fn zip_path(&self, scene: &Scene) -> PathBuf {
        if let Some(local) = &scene.local_path {
            return local.clone();
        }
        let mut name = scene.scene_id.clone();
        if !name.ends_with(".zip") {
            name.push_str(".zip");
        }
        self.data_dir.join(name)
    }

    pub fn data_dir(&self) -> &std::path::Path {
        &self.data_dir
    }

    /// Immutable status record for downstream stages
    pub fn status(&self) -> SelectionStatus {
        let secondary_count = self.secondary_scenes().len();
        SelectionStatus {
            ready: self.reference.is_some() && secondary_count > 0,
            data_dir: self.data_dir.clone(),
            reference_id: self.reference.clone(),
            secondary_count,
            pairs: self.pairs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FlightDirection, SceneGeometry};
    use chrono::{TimeZone, Utc};

    fn scene(id: &str, track: Option<u32>) -> Scene {
        Scene {
            scene_id: id.to_string(),
            start_time: Utc.with_ymd_and_hms(2022, 1, 1, 6, 0, 0).unwrap(),
            mission: "S1A".to_string(),
            track,
            flight_direction: FlightDirection::Ascending,
            footprint: SceneGeometry::Missing,
            download_url: None,
            local_path: None,
        }
    }

    #[test]
    fn test_reference_excluded_from_secondaries() {
        let mut selection = SceneSelection::new("/tmp/slc");
        selection.set_candidates(vec![scene("A", Some(87)), scene("B", Some(87))]);

        selection.set_reference("A").unwrap();
        selection.select("A").unwrap(); // rejected with a warning
        selection.select("B").unwrap();

        let status = selection.status();
        assert_eq!(status.secondary_count, 1);
        assert!(status.ready);
    }

    #[test]
    fn test_promoting_secondary_removes_it_from_set() {
        let mut selection = SceneSelection::new("/tmp/slc");
        selection.set_candidates(vec![scene("A", Some(87)), scene("B", Some(87))]);

        selection.select("A").unwrap();
        selection.select("B").unwrap();
        selection.set_reference("A").unwrap();

        assert_eq!(selection.status().secondary_count, 1);
        assert_eq!(selection.secondary_scenes()[0].scene_id, "B");
    }

    #[test]
    fn test_no_reference_means_no_pairs() {
        let mut selection = SceneSelection::new("/tmp/slc");
        selection.set_candidates(vec![scene("A", Some(87)), scene("B", Some(87))]);
        selection.select("B").unwrap();

        assert!(selection.pairs().is_empty());
        assert!(!selection.status().ready);
    }

    #[test]
    fn test_unset_reference_resets_selection() {
        let mut selection = SceneSelection::new("/tmp/slc");
        selection.set_candidates(vec![scene("A", Some(87)), scene("B", Some(87))]);
        selection.set_reference("A").unwrap();
        selection.select("B").unwrap();

        selection.unset_reference();
        assert!(selection.status().reference_id.is_none());
        assert_eq!(selection.status().secondary_count, 0);
    }

    #[test]
    fn test_track_filtering() {
        let mut selection = SceneSelection::new("/tmp/slc");
        selection.set_candidates(vec![
            scene("A", Some(87)),
            scene("B", Some(87)),
            scene("C", Some(14)),
        ]);
        selection.set_reference("A").unwrap();

        assert_eq!(selection.compatible_candidates().len(), 2);
        assert!(selection.select("C").is_err());
    }

    #[test]
    fn test_pairs_use_data_dir_zip_names() {
        let mut selection = SceneSelection::new("/data/slc");
        selection.set_candidates(vec![scene("A", Some(87)), scene("B", Some(87))]);
        selection.set_reference("A").unwrap();
        selection.select("B").unwrap();

        let pairs = selection.pairs();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, PathBuf::from("/data/slc/A.zip"));
        assert_eq!(pairs[0].1, PathBuf::from("/data/slc/B.zip"));
    }
}
