//! Per-scene auxiliary orbit resolution: a prioritized fallback chain that
//! prefers precise over restituted ephemerides, with a strict/lenient policy
//! switch. A single scene's failure never aborts the batch.

use crate::types::{InsarResult, OrbitKind};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Orbit flavour requested from the upstream source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrbitSearch {
    Precise,
    Restituted,
}

impl std::fmt::Display for OrbitSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrbitSearch::Precise => write!(f, "precise"),
            OrbitSearch::Restituted => write!(f, "restituted"),
        }
    }
}

/// Upstream orbit file collaborator.
///
/// Given an acquisition timestamp and mission, returns zero or one saved file
/// paths. A precise request may legitimately return a restituted file when
/// that is all the source has; classification happens on our side.
pub trait OrbitSource {
    fn fetch_orbit(
        &self,
        timestamp: DateTime<Utc>,
        mission: &str,
        save_dir: &Path,
        search: OrbitSearch,
    ) -> InsarResult<Option<PathBuf>>;
}

/// Outcome of resolving one scene.
///
/// The two-attempt retry policy is surfaced explicitly: a fallback that
/// succeeded after a primary error is `FallbackAfterError`, not a silently
/// repaired `Success`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrbitOutcome {
    /// Precise orbit resolved on the first request
    Success,
    /// Precise request yielded a restituted file, acceptable in lenient mode
    SuccessRestituted,
    /// Explicit restituted request succeeded after an empty precise result
    Fallback,
    /// Restituted retry succeeded after the precise request errored
    FallbackAfterError,
    /// Strict mode: only a restituted file was available
    FailedStrict,
    /// No orbit file of any flavour was found
    FailedMissing,
    /// The scene identifier could not be parsed; no retrieval attempted
    InvalidFilename,
    /// Retrieval errored and no fallback could repair it
    Error(String),
}

impl OrbitOutcome {
    /// Whether a usable orbit file was resolved
    pub fn is_usable(&self) -> bool {
        matches!(
            self,
            OrbitOutcome::Success
                | OrbitOutcome::SuccessRestituted
                | OrbitOutcome::Fallback
                | OrbitOutcome::FallbackAfterError
        )
    }
}

impl std::fmt::Display for OrbitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrbitOutcome::Success => write!(f, "Success"),
            OrbitOutcome::SuccessRestituted => write!(f, "Success (Restituted)"),
            OrbitOutcome::Fallback => write!(f, "Fallback"),
            OrbitOutcome::FallbackAfterError => write!(f, "Fallback (after error)"),
            OrbitOutcome::FailedStrict => write!(f, "Failed (strict mode: only RES found)"),
            OrbitOutcome::FailedMissing => write!(f, "Failed (missing)"),
            OrbitOutcome::InvalidFilename => write!(f, "Invalid filename"),
            OrbitOutcome::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}

/// Per-scene resolution record; created fresh each run, never persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrbitResolution {
    pub scene_id: String,
    /// `YYYYMMDD` acquisition date, or "Unknown" when the id did not parse
    pub acquisition_date: String,
    pub kind: OrbitKind,
    pub outcome: OrbitOutcome,
    pub orbit_file: Option<PathBuf>,
}

/// Read-only status record for downstream stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrbitStatus {
    pub ready: bool,
    pub orbit_dir: PathBuf,
    /// Auxiliary data directory the engine expects; same as the orbit dir
    pub aux_dir: PathBuf,
    pub file_count: usize,
}

/// Resolves auxiliary orbit files for a batch of scenes
pub struct OrbitResolver {
    orbit_dir: PathBuf,
    /// Strict mode: only a precise orbit is acceptable
    strict: bool,
}

impl OrbitResolver {
    pub fn new<P: Into<PathBuf>>(orbit_dir: P, strict: bool) -> Self {
        Self { orbit_dir: orbit_dir.into(), strict }
    }

    /// Resolver over the per-user orbit cache (`<cache>/dinsar/orbits`)
    pub fn with_default_dir(strict: bool) -> Self {
        let orbit_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("dinsar")
            .join("orbits");
        Self::new(orbit_dir, strict)
    }

    /// Extract the 15-character acquisition timestamp token (`YYYYMMDDTHHMMSS`)
    /// from a canonical scene identifier. Token index 5 in the standard naming
    /// convention.
    pub fn parse_timestamp(scene_id: &str) -> Option<DateTime<Utc>> {
        let token = scene_id.split('_').nth(5)?;
        if token.len() != 15 || !token.contains('T') {
            return None;
        }
        NaiveDateTime::parse_from_str(token, "%Y%m%dT%H%M%S")
            .ok()
            .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
    }

    /// Extract the mission identifier (S1A/S1B/S1C) from a scene identifier
    pub fn parse_mission(scene_id: &str) -> Option<&str> {
        let mission = scene_id.split('_').next()?;
        match mission {
            "S1A" | "S1B" | "S1C" => Some(mission),
            _ => None,
        }
    }

    /// Classify a returned orbit file by its name marker. Anything without a
    /// RESORB marker is treated as precise.
    fn classify(path: &Path) -> OrbitKind {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.contains("RESORB") {
            OrbitKind::Restituted
        } else {
            OrbitKind::Precise
        }
    }

    /// Resolve orbit files for a batch of scenes.
    ///
    /// Scene identifiers are de-duplicated and processed in sorted order so
    /// the same acquisition referenced through multiple paths triggers one
    /// set of retrievals and reports come back reproducibly ordered.
    pub fn resolve_batch<S: AsRef<str>>(
        &self,
        source: &dyn OrbitSource,
        scene_ids: &[S],
    ) -> InsarResult<Vec<OrbitResolution>> {
        std::fs::create_dir_all(&self.orbit_dir)?;

        let unique: BTreeSet<&str> = scene_ids
            .iter()
            .map(|id| {
                let id = id.as_ref();
                // A path may be passed instead of a bare id; use the filename
                Path::new(id)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(id)
            })
            .collect();

        let mode = if self.strict { "strict (precise only)" } else { "auto fallback (POE -> RES)" };
        log::info!(
            "Resolving orbits for {} unique scenes into {} [{}]",
            unique.len(),
            self.orbit_dir.display(),
            mode
        );

        let mut report = Vec::with_capacity(unique.len());
        for scene_id in unique {
            let resolution = self.resolve_scene(source, scene_id);
            log::info!(
                "Orbit {} [{}]: {} ({})",
                resolution.scene_id,
                resolution.acquisition_date,
                resolution.outcome,
                resolution.kind
            );
            report.push(resolution);
        }
        Ok(report)
    }

    /// Run the resolution state machine for a single scene. Never fails the
    /// batch; every terminal state becomes a record.
    fn resolve_scene(&self, source: &dyn OrbitSource, scene_id: &str) -> OrbitResolution {
        let timestamp = Self::parse_timestamp(scene_id);
        let mission = Self::parse_mission(scene_id);

        let (timestamp, mission) = match (timestamp, mission) {
            (Some(t), Some(m)) => (t, m),
            _ => {
                return OrbitResolution {
                    scene_id: scene_id.to_string(),
                    acquisition_date: "Unknown".to_string(),
                    kind: OrbitKind::Invalid,
                    outcome: OrbitOutcome::InvalidFilename,
                    orbit_file: None,
                };
            }
        };
        let acquisition_date = timestamp.format("%Y%m%d").to_string();

        let (kind, outcome, orbit_file) =
            match source.fetch_orbit(timestamp, mission, &self.orbit_dir, OrbitSearch::Precise) {
                Ok(Some(path)) => match Self::classify(&path) {
                    OrbitKind::Precise => (OrbitKind::Precise, OrbitOutcome::Success, Some(path)),
                    _ if self.strict => {
                        (OrbitKind::Restituted, OrbitOutcome::FailedStrict, Some(path))
                    }
                    _ => (OrbitKind::Restituted, OrbitOutcome::SuccessRestituted, Some(path)),
                },
                Ok(None) if self.strict => (OrbitKind::None, OrbitOutcome::FailedMissing, None),
                Ok(None) => {
                    log::info!(
                        "Precise request returned empty for {}; trying restituted",
                        acquisition_date
                    );
                    match source.fetch_orbit(timestamp, mission, &self.orbit_dir, OrbitSearch::Restituted)
                    {
                        Ok(Some(path)) => {
                            (Self::classify(&path), OrbitOutcome::Fallback, Some(path))
                        }
                        Ok(None) => (OrbitKind::None, OrbitOutcome::FailedMissing, None),
                        Err(e) => (OrbitKind::None, OrbitOutcome::Error(e.to_string()), None),
                    }
                }
                Err(e) if self.strict => (OrbitKind::None, OrbitOutcome::Error(e.to_string()), None),
                Err(e) => {
                    log::warn!("Precise retrieval errored for {}: {}; attempting restituted", scene_id, e);
                    // Best-effort retry; a second failure leaves the original
                    // error outcome standing.
                    match source.fetch_orbit(timestamp, mission, &self.orbit_dir, OrbitSearch::Restituted)
                    {
                        Ok(Some(path)) => {
                            (Self::classify(&path), OrbitOutcome::FallbackAfterError, Some(path))
                        }
                        Ok(None) | Err(_) => {
                            (OrbitKind::None, OrbitOutcome::Error(e.to_string()), None)
                        }
                    }
                }
            };

        OrbitResolution {
            scene_id: scene_id.to_string(),
            acquisition_date,
            kind,
            outcome,
            orbit_file,
        }
    }

    pub fn orbit_dir(&self) -> &Path {
        &self.orbit_dir
    }

    /// Immutable status record for configuration assembly
    pub fn status(&self) -> OrbitStatus {
        let file_count = std::fs::read_dir(&self.orbit_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| {
                        e.path()
                            .extension()
                            .and_then(|ext| ext.to_str())
                            .map(|ext| ext.eq_ignore_ascii_case("eof"))
                            .unwrap_or(false)
                    })
                    .count()
            })
            .unwrap_or(0);

        OrbitStatus {
            ready: true,
            orbit_dir: self.orbit_dir.clone(),
            aux_dir: self.orbit_dir.clone(),
            file_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = "S1A_IW_SLC__1SDV_20220101T060000_20220101T060027_041313_04E8F2_1A2B";

    #[test]
    fn test_parse_timestamp_token() {
        let ts = OrbitResolver::parse_timestamp(SCENE).unwrap();
        assert_eq!(ts.format("%Y%m%dT%H%M%S").to_string(), "20220101T060000");
    }

    #[test]
    fn test_parse_timestamp_rejects_short_token() {
        assert!(OrbitResolver::parse_timestamp("S1A_IW_SLC__1SDV_2022_x").is_none());
        assert!(OrbitResolver::parse_timestamp("garbage").is_none());
    }

    #[test]
    fn test_parse_mission() {
        assert_eq!(OrbitResolver::parse_mission(SCENE), Some("S1A"));
        assert_eq!(OrbitResolver::parse_mission("S1C_IW_SLC__etc"), Some("S1C"));
        assert_eq!(OrbitResolver::parse_mission("S2A_MSIL1C"), None);
    }

    #[test]
    fn test_classify_by_filename_marker() {
        assert_eq!(
            OrbitResolver::classify(Path::new("S1A_OPER_AUX_POEORB_OPOD_x.EOF")),
            OrbitKind::Precise
        );
        assert_eq!(
            OrbitResolver::classify(Path::new("S1A_OPER_AUX_RESORB_OPOD_x.EOF")),
            OrbitKind::Restituted
        );
    }
}
