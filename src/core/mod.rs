//! Core raster processing modules

pub mod qa_mask;
pub mod masking;
pub mod harmonize;
pub mod indices;
pub mod composite;
pub mod zonal;
pub mod anomaly;

// Re-export main types
pub use qa_mask::{decode_bit, Combination, MaskPolicy, QaDecoder, QaFlag};
pub use masking::SceneMasker;
pub use harmonize::{ArchiveSpec, CollectionHarmonizer};
pub use indices::{normalized_difference, surface_temperature_celsius, IndexCalculator, SpectralIndex};
pub use composite::{clip_to_region, TemporalCompositor};
pub use zonal::{ZonalParams, ZonalReducer, ZonalStatistic};
pub use anomaly::{AnomalyEngine, UHI_BAND};
