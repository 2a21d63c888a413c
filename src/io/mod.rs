//! Input/output: scene catalogs, Landsat metadata and output sinks

pub mod catalog;
pub mod mtl;
pub mod landsat_dir;
pub mod export;

pub use catalog::{ImageCatalog, InMemoryCatalog, SceneQuery};
pub use mtl::{parse_mtl_xml, LandsatMetadataFile, ProductId};
pub use landsat_dir::{LandsatDirectoryCatalog, ProductEntry};
pub use export::{ExportJob, ExportParams, MemorySink, OutputSink, VisParams};

#[cfg(feature = "gdal")]
pub use export::GeoTiffSink;
