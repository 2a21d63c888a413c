//! Per-pixel index derivation: thermal calibration and normalized differences
//!
//! All transforms are pure and pixel-local. No-value input pixels stay
//! no-value; a zero normalized-difference denominator yields no-value.

use crate::types::{is_defined, Band, Raster, Scene, SceneCollection, TerraError, TerraResult, NO_VALUE};
use ndarray::Zip;
use serde::{Deserialize, Serialize};

/// Collection 2 surface-temperature scale factor (Kelvin per DN)
pub const ST_SCALE: f32 = 0.00341802;
/// Collection 2 surface-temperature additive offset (Kelvin)
pub const ST_OFFSET: f32 = 149.0;
pub const KELVIN_TO_CELSIUS: f32 = 273.15;

/// Indices derivable from a harmonized Landsat scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpectralIndex {
    /// Land-surface temperature in degrees Celsius
    Lst,
    /// Normalized Difference Vegetation Index, (NIR - Red) / (NIR + Red)
    Ndvi,
    /// Normalized Difference Built-up Index, (SWIR1 - NIR) / (SWIR1 + NIR)
    Ndbi,
}

impl SpectralIndex {
    /// Name of the output band
    pub fn band_name(&self) -> &'static str {
        match self {
            SpectralIndex::Lst => "LST",
            SpectralIndex::Ndvi => "NDVI",
            SpectralIndex::Ndbi => "NDBI",
        }
    }

    /// Scene bands the index reads
    pub fn source_bands(&self) -> &'static [&'static str] {
        match self {
            SpectralIndex::Lst => &["ST_B10"],
            SpectralIndex::Ndvi => &["SR_B5", "SR_B4"],
            SpectralIndex::Ndbi => &["SR_B6", "SR_B5"],
        }
    }
}

impl std::fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.band_name())
    }
}

/// Convert a surface-temperature DN to degrees Celsius
#[inline]
pub fn dn_to_celsius(dn: f32) -> f32 {
    dn * ST_SCALE + ST_OFFSET - KELVIN_TO_CELSIUS
}

/// Surface temperature in Celsius for a whole thermal band
pub fn surface_temperature_celsius(thermal: &Band) -> Band {
    thermal.mapv(dn_to_celsius)
}

/// Normalized difference of one pixel pair, clamped to [-1, 1].
/// Returns no-value when either input is no-value or `a + b == 0`.
#[inline]
pub fn normalized_difference_pixel(a: f32, b: f32) -> f32 {
    if !is_defined(a) || !is_defined(b) {
        return NO_VALUE;
    }
    let sum = a + b;
    if sum == 0.0 {
        return NO_VALUE;
    }
    ((a - b) / sum).clamp(-1.0, 1.0)
}

/// `(a - b) / (a + b)` over two bands of the same shape
pub fn normalized_difference(band_a: &Band, band_b: &Band) -> TerraResult<Band> {
    if band_a.dim() != band_b.dim() {
        return Err(TerraError::GridMismatch {
            expected: band_a.dim(),
            found: band_b.dim(),
            context: "normalized difference operands".to_string(),
        });
    }

    #[cfg(feature = "parallel")]
    let result = Zip::from(band_a)
        .and(band_b)
        .par_map_collect(|&a, &b| normalized_difference_pixel(a, b));

    #[cfg(not(feature = "parallel"))]
    let result = Zip::from(band_a)
        .and(band_b)
        .map_collect(|&a, &b| normalized_difference_pixel(a, b));

    Ok(result)
}

/// Maps scenes to single-band index rasters
pub struct IndexCalculator;

impl IndexCalculator {
    /// Derive `index` from one scene. The output keeps the acquisition time
    /// and grid; every other piece of scene metadata is dropped.
    pub fn compute(scene: &Scene, index: SpectralIndex) -> TerraResult<Raster> {
        let data = match index {
            SpectralIndex::Lst => surface_temperature_celsius(scene.band("ST_B10")?),
            SpectralIndex::Ndvi => normalized_difference(scene.band("SR_B5")?, scene.band("SR_B4")?)?,
            SpectralIndex::Ndbi => normalized_difference(scene.band("SR_B6")?, scene.band("SR_B5")?)?,
        };

        Ok(Raster::new(index.band_name(), scene.grid, data)?.with_acquired(scene.metadata.acquired))
    }

    /// Derive `index` from every scene of a collection, preserving order
    pub fn compute_collection(collection: &SceneCollection, index: SpectralIndex) -> TerraResult<Vec<Raster>> {
        log::info!("Computing {} for {} scenes", index, collection.len());

        #[cfg(feature = "parallel")]
        let rasters = {
            use rayon::prelude::*;
            collection
                .scenes
                .par_iter()
                .map(|scene| Self::compute(scene, index))
                .collect::<TerraResult<Vec<_>>>()?
        };

        #[cfg(not(feature = "parallel"))]
        let rasters = collection
            .scenes
            .iter()
            .map(|scene| Self::compute(scene, index))
            .collect::<TerraResult<Vec<_>>>()?;

        Ok(rasters)
    }
}
