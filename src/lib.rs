//! terraheat: per-year land-surface temperature, urban heat island and
//! spectral index products from Landsat 8/9 Collection 2 Level-2 scenes.
//!
//! Scenes come from an [`ImageCatalog`], are harmonized across sensors,
//! cloud-masked from their QA band, turned into index rasters, composited
//! per pixel over a seasonal window and handed to an [`OutputSink`].

pub mod types;
pub mod io;
pub mod core;
pub mod config;
pub mod graph;
pub mod pipeline;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    Band, BoundingBox, DateWindow, GeoTransform, GridSpec, QaBand, Raster, Region, Scene, SceneCollection,
    SceneMetadata, Sensor, TerraError, TerraResult, NO_VALUE, QA_BAND,
};

pub use config::{ExportSettings, PipelineConfig, ProductConfig, RegionSpec, SeasonWindow, WorkflowConfig};
pub use io::{ImageCatalog, InMemoryCatalog, LandsatDirectoryCatalog, MemorySink, OutputSink, SceneQuery};
pub use pipeline::{Pipeline, RunReport, YearOutcome, YearReport};
