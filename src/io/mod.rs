//! I/O collaborators: scene catalogs, the ESA orbit archive and the external
//! processing engine.

pub mod catalog;
pub mod engine;
pub mod orbit;

// Re-export main types
pub use catalog::{download_missing, scan_local_dir, SceneCatalog, SceneDownloader};
pub use engine::TopsAppRunner;
pub use orbit::EsaOrbitSource;
