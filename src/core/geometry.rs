//! Pure footprint geometry: bounding regions derived from scene selections
//! and regions of interest. No I/O happens here.

use crate::core::selection::SceneSelection;
use crate::types::{BoundingBox, Footprint, InsarError, InsarResult, Scene, SceneGeometry};

/// Region of interest handed to elevation preparation or config assembly
#[derive(Debug, Clone, PartialEq)]
pub enum RegionOfInterest {
    /// WKT `POLYGON` string
    Wkt(String),
    /// ISCE-style `[south, north, west, east]` box
    Snwe([f64; 4]),
}

impl RegionOfInterest {
    /// Bounds of the target region, whatever its representation
    pub fn bounds(&self) -> InsarResult<BoundingBox> {
        match self {
            RegionOfInterest::Wkt(wkt) => {
                let footprint = parse_wkt_polygon(wkt)?;
                footprint.bounds().ok_or_else(|| {
                    InsarError::Geometry("ROI polygon has an empty ring".to_string())
                })
            }
            RegionOfInterest::Snwe(snwe) => Ok(BoundingBox::from_snwe(*snwe)),
        }
    }
}

/// Resolve the footprint bounds of a scene, trying the known geometry
/// representations in a fixed priority order: full polygon, WKT string, raw
/// bounds field. Fails explicitly when none apply.
pub fn resolve_footprint_bounds(scene: &Scene) -> InsarResult<BoundingBox> {
    match &scene.footprint {
        SceneGeometry::Polygon(footprint) => footprint.bounds().ok_or_else(|| {
            InsarError::Geometry(format!("scene {} has an empty footprint ring", scene.scene_id))
        }),
        SceneGeometry::Wkt(wkt) => {
            let footprint = parse_wkt_polygon(wkt)?;
            footprint.bounds().ok_or_else(|| {
                InsarError::Geometry(format!("scene {} has an empty WKT footprint", scene.scene_id))
            })
        }
        SceneGeometry::Bounds(bbox) => Ok(*bbox),
        SceneGeometry::Missing => Err(InsarError::Geometry(format!(
            "scene {} has no resolvable footprint geometry",
            scene.scene_id
        ))),
    }
}

/// Compute the bounding region shared by the reference scene and the union of
/// all selected secondary scenes.
///
/// With no secondaries selected, the reference's own bounds are returned.
/// An empty intersection is a hard `Geometry` error, never a degenerate box.
pub fn intersection_bounds(selection: &SceneSelection) -> InsarResult<BoundingBox> {
    let reference = selection.reference_scene().ok_or_else(|| {
        InsarError::Configuration("no reference scene set; cannot compute bounds".to_string())
    })?;

    let reference_bounds = resolve_footprint_bounds(reference)?;

    let secondaries = selection.secondary_scenes();
    if secondaries.is_empty() {
        log::debug!("No secondaries selected, using reference bounds {}", reference_bounds);
        return Ok(reference_bounds);
    }

    let mut union: Option<BoundingBox> = None;
    for scene in &secondaries {
        match resolve_footprint_bounds(scene) {
            Ok(bounds) => {
                union = Some(match union {
                    Some(acc) => acc.union(&bounds),
                    None => bounds,
                });
            }
            Err(e) => {
                log::warn!("Skipping secondary {} with unresolvable footprint: {}", scene.scene_id, e);
            }
        }
    }

    let union = match union {
        Some(u) => u,
        // Every secondary footprint was unresolvable; fall back to the reference
        None => return Ok(reference_bounds),
    };

    reference_bounds.intersection(&union).ok_or_else(|| {
        InsarError::Geometry(format!(
            "selected secondaries {} do not overlap the reference footprint {}",
            union, reference_bounds
        ))
    })
}

/// Intersect a target region with a raster's own footprint box.
///
/// Returns `Ok(None)` when the target does not overlap the raster at all;
/// the caller must treat the region as unset rather than failing the run.
pub fn roi_intersection(
    target: &RegionOfInterest,
    raster_bounds: &BoundingBox,
) -> InsarResult<Option<BoundingBox>> {
    let target_bounds = target.bounds()?;
    Ok(target_bounds.intersection(raster_bounds))
}

/// Parse a WKT `POLYGON` exterior ring into a footprint.
///
/// Only the exterior ring is read; interior rings are irrelevant for bounds.
pub fn parse_wkt_polygon(wkt: &str) -> InsarResult<Footprint> {
    let trimmed = wkt.trim();
    if !trimmed.to_ascii_uppercase().starts_with("POLYGON") {
        return Err(InsarError::InvalidFormat(format!(
            "expected WKT POLYGON, got: {:.40}",
            trimmed
        )));
    }

    let open = trimmed.find("((").ok_or_else(|| {
        InsarError::InvalidFormat("WKT POLYGON missing '((' ring delimiter".to_string())
    })?;
    let rest = &trimmed[open + 2..];
    let close = rest.find(')').ok_or_else(|| {
        InsarError::InvalidFormat("WKT POLYGON missing closing ')'".to_string())
    })?;

    let mut ring = Vec::new();
    for pair in rest[..close].split(',') {
        let mut coords = pair.split_whitespace();
        let lon = coords
            .next()
            .and_then(|v| v.parse::<f64>().ok())
            .ok_or_else(|| InsarError::InvalidFormat(format!("bad WKT coordinate: '{}'", pair)))?;
        let lat = coords
            .next()
            .and_then(|v| v.parse::<f64>().ok())
            .ok_or_else(|| InsarError::InvalidFormat(format!("bad WKT coordinate: '{}'", pair)))?;
        ring.push((lon, lat));
    }

    if ring.len() < 3 {
        return Err(InsarError::InvalidFormat(format!(
            "WKT POLYGON ring has only {} coordinates",
            ring.len()
        )));
    }

    Ok(Footprint::new(ring))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FlightDirection;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    fn scene(id: &str, bounds: BoundingBox) -> Scene {
        Scene {
            scene_id: id.to_string(),
            start_time: Utc.with_ymd_and_hms(2022, 1, 1, 6, 0, 0).unwrap(),
            mission: "S1A".to_string(),
            track: Some(87),
            flight_direction: FlightDirection::Ascending,
            footprint: SceneGeometry::Bounds(bounds),
            download_url: None,
            local_path: None,
        }
    }

    fn selection_of(reference: Scene, secondary: Scene) -> SceneSelection {
        let mut selection = SceneSelection::new("/tmp/slc");
        let (ref_id, sec_id) = (reference.scene_id.clone(), secondary.scene_id.clone());
        selection.set_candidates(vec![reference, secondary]);
        selection.set_reference(&ref_id).unwrap();
        selection.select(&sec_id).unwrap();
        selection
    }

    #[test]
    fn test_intersection_bounds_reference_with_secondary() {
        let selection = selection_of(
            scene("A", BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            scene("B", BoundingBox::new(5.0, 5.0, 15.0, 15.0)),
        );
        let bounds = intersection_bounds(&selection).unwrap();
        assert_relative_eq!(bounds.min_lon, 5.0);
        assert_relative_eq!(bounds.min_lat, 5.0);
        assert_relative_eq!(bounds.max_lon, 10.0);
        assert_relative_eq!(bounds.max_lat, 10.0);
    }

    #[test]
    fn test_intersection_bounds_no_overlap_is_an_error() {
        let selection = selection_of(
            scene("A", BoundingBox::new(0.0, 0.0, 1.0, 1.0)),
            scene("B", BoundingBox::new(10.0, 10.0, 11.0, 11.0)),
        );
        assert!(matches!(
            intersection_bounds(&selection),
            Err(InsarError::Geometry(_))
        ));
    }

    #[test]
    fn test_intersection_bounds_without_secondaries_uses_reference() {
        let mut selection = SceneSelection::new("/tmp/slc");
        selection.set_candidates(vec![scene("A", BoundingBox::new(0.0, 0.0, 2.0, 2.0))]);
        selection.set_reference("A").unwrap();

        let bounds = intersection_bounds(&selection).unwrap();
        assert_relative_eq!(bounds.max_lon, 2.0);
    }

    #[test]
    fn test_buffer_expands_all_edges() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let buffered = bbox.buffered(0.2);
        assert_relative_eq!(buffered.min_lon, -0.2);
        assert_relative_eq!(buffered.min_lat, -0.2);
        assert_relative_eq!(buffered.max_lon, 10.2);
        assert_relative_eq!(buffered.max_lat, 10.2);
    }

    #[test]
    fn test_negative_buffer_shrinks() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let shrunk = bbox.buffered(-1.0);
        assert_relative_eq!(shrunk.min_lon, 1.0);
        assert_relative_eq!(shrunk.max_lat, 9.0);
    }

    #[test]
    fn test_intersection_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
        let i = a.intersection(&b).expect("boxes overlap");
        assert_relative_eq!(i.min_lon, 5.0);
        assert_relative_eq!(i.min_lat, 5.0);
        assert_relative_eq!(i.max_lon, 10.0);
        assert_relative_eq!(i.max_lat, 10.0);
    }

    #[test]
    fn test_intersection_disjoint_is_none() {
        let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let b = BoundingBox::new(10.0, 10.0, 11.0, 11.0);
        assert!(a.intersection(&b).is_none());
    }

    #[test]
    fn test_parse_wkt_polygon() {
        let wkt = "POLYGON ((126.5 37.2, 127.1 37.2, 127.1 37.8, 126.5 37.8, 126.5 37.2))";
        let footprint = parse_wkt_polygon(wkt).unwrap();
        let bounds = footprint.bounds().unwrap();
        assert_relative_eq!(bounds.min_lon, 126.5);
        assert_relative_eq!(bounds.max_lat, 37.8);
    }

    #[test]
    fn test_parse_wkt_rejects_non_polygon() {
        assert!(parse_wkt_polygon("POINT (1 2)").is_err());
        assert!(parse_wkt_polygon("POLYGON ((1 2, 3 4))").is_err());
    }

    #[test]
    fn test_roi_intersection_no_overlap_is_none() {
        let roi = RegionOfInterest::Snwe([10.0, 11.0, 10.0, 11.0]);
        let raster = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert!(roi_intersection(&roi, &raster).unwrap().is_none());
    }

    #[test]
    fn test_roi_intersection_from_wkt() {
        let roi = RegionOfInterest::Wkt(
            "POLYGON((0.5 0.5, 2.0 0.5, 2.0 2.0, 0.5 2.0, 0.5 0.5))".to_string(),
        );
        let raster = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let clipped = roi_intersection(&roi, &raster).unwrap().unwrap();
        assert_relative_eq!(clipped.min_lon, 0.5);
        assert_relative_eq!(clipped.max_lon, 1.0);
    }
}
