use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Geographic bounding box in degrees (WGS84 lon/lat)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self { min_lon, min_lat, max_lon, max_lat }
    }

    /// Build from an ISCE-style `[south, north, west, east]` box
    pub fn from_snwe(snwe: [f64; 4]) -> Self {
        Self {
            min_lon: snwe[2],
            min_lat: snwe[0],
            max_lon: snwe[3],
            max_lat: snwe[1],
        }
    }

    /// Convert to the ISCE-style `[south, north, west, east]` ordering
    pub fn to_snwe(&self) -> [f64; 4] {
        [self.min_lat, self.max_lat, self.min_lon, self.max_lon]
    }

    /// Expand all four edges symmetrically by `margin` degrees.
    /// Negative margins shrink the box; callers own the sanity of the value.
    pub fn buffered(&self, margin: f64) -> Self {
        Self {
            min_lon: self.min_lon - margin,
            min_lat: self.min_lat - margin,
            max_lon: self.max_lon + margin,
            max_lat: self.max_lat + margin,
        }
    }

    /// Intersection with another box, or `None` when they do not overlap.
    /// An empty intersection is never returned as a degenerate box.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let min_lon = self.min_lon.max(other.min_lon);
        let min_lat = self.min_lat.max(other.min_lat);
        let max_lon = self.max_lon.min(other.max_lon);
        let max_lat = self.max_lat.min(other.max_lat);

        if min_lon < max_lon && min_lat < max_lat {
            Some(Self { min_lon, min_lat, max_lon, max_lat })
        } else {
            None
        }
    }

    /// Smallest box enclosing both operands
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min_lon: self.min_lon.min(other.min_lon),
            min_lat: self.min_lat.min(other.min_lat),
            max_lon: self.max_lon.max(other.max_lon),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min_lon < self.max_lon && self.min_lat < self.max_lat
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:.4}, {:.4}, {:.4}, {:.4})",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

/// Scene footprint as a closed lon/lat ring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub ring: Vec<(f64, f64)>,
}

impl Footprint {
    pub fn new(ring: Vec<(f64, f64)>) -> Self {
        Self { ring }
    }

    /// Axis-aligned bounds of the ring, or `None` for an empty ring
    pub fn bounds(&self) -> Option<BoundingBox> {
        let (first, rest) = self.ring.split_first()?;
        let mut bbox = BoundingBox::new(first.0, first.1, first.0, first.1);
        for &(lon, lat) in rest {
            bbox.min_lon = bbox.min_lon.min(lon);
            bbox.min_lat = bbox.min_lat.min(lat);
            bbox.max_lon = bbox.max_lon.max(lon);
            bbox.max_lat = bbox.max_lat.max(lat);
        }
        Some(bbox)
    }
}

/// Footprint geometry of a scene.
///
/// Catalog results carry a full polygon, while locally reconstructed stand-ins
/// may only carry a WKT string, a raw bounds field, or nothing at all.
/// Extraction tries these representations in a fixed priority order (see
/// `core::geometry::resolve_footprint_bounds`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SceneGeometry {
    /// Full polygon footprint from the catalog
    Polygon(Footprint),
    /// WKT `POLYGON` string, parsed lazily
    Wkt(String),
    /// Raw bounds field only
    Bounds(BoundingBox),
    /// No geometry available (local filename-only scan)
    Missing,
}

/// Sentinel-1 flight direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlightDirection {
    Ascending,
    Descending,
    Unknown,
}

/// A remote-sensing acquisition, immutable once retrieved from the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    /// Canonical product identifier, e.g.
    /// `S1A_IW_SLC__1SDV_20220101T060000_20220101T060027_041313_04E8F2_1A2B`
    pub scene_id: String,
    pub start_time: DateTime<Utc>,
    /// Mission tag: S1A, S1B or S1C
    pub mission: String,
    /// Relative orbit (track) number; `None` in filename-only local mode
    pub track: Option<u32>,
    pub flight_direction: FlightDirection,
    pub footprint: SceneGeometry,
    pub download_url: Option<String>,
    pub local_path: Option<PathBuf>,
}

/// Orbit category resolved for a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrbitKind {
    /// Precise Orbit Ephemerides (POEORB, ~20 days latency, best accuracy)
    Precise,
    /// Restituted Orbit Ephemerides (RESORB, ~3 hours latency)
    Restituted,
    /// No orbit file could be resolved
    None,
    /// Scene identifier could not be parsed
    Invalid,
}

impl std::fmt::Display for OrbitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrbitKind::Precise => write!(f, "Precise (POE)"),
            OrbitKind::Restituted => write!(f, "Restituted (RES)"),
            OrbitKind::None => write!(f, "None"),
            OrbitKind::Invalid => write!(f, "-"),
        }
    }
}

/// Error taxonomy for the pipeline core
#[derive(Debug, thiserror::Error)]
pub enum InsarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("cache integrity error: {0}")]
    CacheIntegrity(String),

    #[error("external tool failure: {0}")]
    ExternalTool(String),

    #[error("invalid data format: {0}")]
    InvalidFormat(String),
}

/// Result type for pipeline operations
pub type InsarResult<T> = Result<T, InsarError>;
