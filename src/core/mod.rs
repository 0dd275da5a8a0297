//! Core pipeline stages

pub mod config;
pub mod dem;
pub mod geometry;
pub mod orbit;
pub mod pipeline;
pub mod selection;

// Re-export main types
pub use config::{ConfigAssembler, ConfigOptions, Unwrapper};
pub use dem::{DemExtent, DemManager, DemStatus, RasterExporter, RasterStitcher};
pub use geometry::RegionOfInterest;
pub use orbit::{OrbitOutcome, OrbitResolution, OrbitResolver, OrbitSearch, OrbitSource, OrbitStatus};
pub use pipeline::{
    EngineRunner, Pipeline, PipelineOutcome, ProductFile, ProductKind, StepRange,
};
pub use selection::{SceneSelection, SelectionStatus};
