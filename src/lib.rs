//! dinsar: Sentinel-1 differential interferometry pipeline orchestration
//!
//! This library manages the bookkeeping around an interferometric pair run:
//! scene selection, orbit file resolution with precise/restituted fallback,
//! cached elevation-model preparation, and assembly of the processing
//! configuration handed to the external topsApp engine.

pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, FlightDirection, Footprint, InsarError, InsarResult, OrbitKind, Scene,
    SceneGeometry,
};

pub use core::{
    ConfigAssembler, ConfigOptions, DemExtent, DemManager, DemStatus, EngineRunner,
    OrbitOutcome, OrbitResolution, OrbitResolver, OrbitSearch, OrbitSource, OrbitStatus, Pipeline,
    PipelineOutcome, ProductFile, ProductKind, RasterExporter, RasterStitcher,
    RegionOfInterest, SceneSelection, SelectionStatus, StepRange, Unwrapper,
};

pub use io::{EsaOrbitSource, SceneCatalog, SceneDownloader, TopsAppRunner};
