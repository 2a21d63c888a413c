use crate::types::{is_defined, Band, GridSpec, PixelValue, Raster, Region, TerraError, TerraResult, NO_VALUE};
use ndarray::{Array2, Zip};
use num_traits::Float;

/// Reduces a stack of per-scene rasters to one representative raster
#[derive(Debug, Clone, Default)]
pub struct TemporalCompositor;

impl TemporalCompositor {
    pub fn new() -> Self {
        Self
    }

    /// Per-pixel median over the defined values of `rasters`, clipped to
    /// `region`. Pixels without any contributor stay no-value.
    ///
    /// Fails with `EmptyResult` when there is nothing to composite or the
    /// composite has no defined pixel inside the region.
    pub fn median(&self, rasters: &[Raster], region: &Region) -> TerraResult<Raster> {
        let first = rasters.first().ok_or_else(|| {
            TerraError::EmptyResult("no scenes to composite".to_string())
        })?;
        let grid = first.grid;
        let name = first.name.clone();

        for raster in rasters.iter().skip(1) {
            if !raster.grid.is_aligned_with(&grid) {
                return Err(TerraError::GridMismatch {
                    expected: grid.shape(),
                    found: raster.grid.shape(),
                    context: format!(
                        "composite input {} at origin ({}, {}), expected ({}, {})",
                        raster.name,
                        raster.grid.geo_transform.top_left_x,
                        raster.grid.geo_transform.top_left_y,
                        grid.geo_transform.top_left_x,
                        grid.geo_transform.top_left_y
                    ),
                });
            }
        }

        log::info!(
            "Median compositing {} rasters of {} ({}x{})",
            rasters.len(),
            name,
            grid.rows,
            grid.cols
        );

        let composite = Raster::new(name.clone(), grid, median_stack(rasters, &grid)?)?;
        let raster = clip_to_region(&composite, region);

        let defined = raster.defined_count();
        log::debug!("Composite {} has {} defined pixels", name, defined);
        if defined == 0 {
            return Err(TerraError::EmptyResult(format!(
                "composite {} has no defined pixel inside the region",
                name
            )));
        }
        Ok(raster)
    }
}

/// Blank every pixel whose centre lies outside `region`
pub fn clip_to_region(raster: &Raster, region: &Region) -> Raster {
    let inside = region.pixel_mask(&raster.grid);
    let data = Zip::from(&raster.data)
        .and(&inside)
        .map_collect(|&value, &keep| if keep { value } else { NO_VALUE });
    Raster {
        name: raster.name.clone(),
        grid: raster.grid,
        data,
        acquired: raster.acquired,
    }
}

/// Median of `samples`; even counts average the two middle values.
/// `samples` is reordered.
pub fn median_of<T: Float>(samples: &mut [T]) -> Option<T> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = samples.len() / 2;
    if samples.len() % 2 == 0 {
        Some((samples[mid - 1] + samples[mid]) / (T::one() + T::one()))
    } else {
        Some(samples[mid])
    }
}

fn median_row(rasters: &[Raster], row: usize, cols: usize) -> Vec<PixelValue> {
    let mut samples = Vec::with_capacity(rasters.len());
    (0..cols)
        .map(|col| {
            samples.clear();
            samples.extend(
                rasters
                    .iter()
                    .map(|r| r.data[[row, col]])
                    .filter(|v| is_defined(*v)),
            );
            median_of(&mut samples).unwrap_or(NO_VALUE)
        })
        .collect()
}

fn median_stack(rasters: &[Raster], grid: &GridSpec) -> TerraResult<Band> {
    let (rows, cols) = grid.shape();

    #[cfg(feature = "parallel")]
    let values: Vec<PixelValue> = {
        use rayon::prelude::*;
        (0..rows)
            .into_par_iter()
            .flat_map_iter(|row| median_row(rasters, row, cols))
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let values: Vec<PixelValue> = (0..rows)
        .flat_map(|row| median_row(rasters, row, cols))
        .collect();

    Array2::from_shape_vec((rows, cols), values)
        .map_err(|e| TerraError::Processing(format!("Failed to reshape composite: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use ndarray::array;

    fn grid() -> GridSpec {
        GridSpec::new(2, 2, GeoTransform::north_up(0.0, 60.0, 30.0))
    }

    fn region() -> Region {
        Region::rectangle(0.0, 0.0, 60.0, 60.0).unwrap()
    }

    fn raster(data: Band) -> Raster {
        Raster::new("LST", grid(), data).unwrap()
    }

    #[test]
    fn test_single_scene_is_identity() {
        let input = raster(array![[31.5, 32.25], [f32::NAN, 40.0]]);
        let composite = TemporalCompositor::new().median(&[input.clone()], &region()).unwrap();

        assert_eq!(composite.data[[0, 0]], 31.5);
        assert_eq!(composite.data[[0, 1]], 32.25);
        assert!(composite.data[[1, 0]].is_nan());
        assert_eq!(composite.data[[1, 1]], 40.0);
        assert_eq!(composite.name, "LST");
        assert_eq!(composite.acquired, None);
    }

    #[test]
    fn test_median_skips_no_value() {
        let rasters = vec![
            raster(array![[1.0, 10.0], [f32::NAN, 5.0]]),
            raster(array![[3.0, f32::NAN], [f32::NAN, 6.0]]),
            raster(array![[2.0, 30.0], [f32::NAN, 7.0]]),
            raster(array![[f32::NAN, f32::NAN], [f32::NAN, 8.0]]),
        ];
        let composite = TemporalCompositor::new().median(&rasters, &region()).unwrap();

        assert_eq!(composite.data[[0, 0]], 2.0);
        assert_eq!(composite.data[[0, 1]], 20.0);
        assert!(composite.data[[1, 0]].is_nan());
        assert_eq!(composite.data[[1, 1]], 6.5);
    }

    #[test]
    fn test_median_is_order_independent() {
        let a = raster(array![[1.0, 9.0], [4.0, 2.0]]);
        let b = raster(array![[5.0, 3.0], [8.0, 6.0]]);
        let c = raster(array![[7.0, 2.0], [1.0, 4.0]]);
        let compositor = TemporalCompositor::new();

        let forward = compositor.median(&[a.clone(), b.clone(), c.clone()], &region()).unwrap();
        let backward = compositor.median(&[c, b, a], &region()).unwrap();
        assert_eq!(forward.data, backward.data);
    }

    #[test]
    fn test_composite_is_clipped() {
        let half = Region::rectangle(0.0, 0.0, 30.0, 60.0).unwrap();
        let composite = TemporalCompositor::new()
            .median(&[raster(array![[1.0, 2.0], [3.0, 4.0]])], &half)
            .unwrap();

        assert_eq!(composite.data[[0, 0]], 1.0);
        assert!(composite.data[[0, 1]].is_nan());
        assert_eq!(composite.data[[1, 0]], 3.0);
        assert!(composite.data[[1, 1]].is_nan());
    }

    #[test]
    fn test_empty_inputs() {
        let compositor = TemporalCompositor::new();
        let result = compositor.median(&[], &region());
        assert!(matches!(result, Err(TerraError::EmptyResult(_))));

        let all_masked = raster(Array2::from_elem((2, 2), f32::NAN));
        let result = compositor.median(&[all_masked], &region());
        assert!(matches!(result, Err(TerraError::EmptyResult(_))));
    }

    #[test]
    fn test_grid_mismatch() {
        let small = raster(array![[1.0, 2.0], [3.0, 4.0]]);
        let other = Raster::new(
            "LST",
            GridSpec::new(1, 2, GeoTransform::north_up(0.0, 60.0, 30.0)),
            array![[1.0, 2.0]],
        )
        .unwrap();
        let result = TemporalCompositor::new().median(&[small, other], &region());
        assert!(matches!(result, Err(TerraError::GridMismatch { .. })));
    }

    #[test]
    fn test_shifted_origin_is_grid_mismatch() {
        let base = raster(array![[1.0, 2.0], [3.0, 4.0]]);
        let shifted = Raster::new(
            "LST",
            GridSpec::new(2, 2, GeoTransform::north_up(30.0, 60.0, 30.0)),
            array![[100.0, 200.0], [300.0, 400.0]],
        )
        .unwrap();
        let wide = Region::rectangle(0.0, 0.0, 90.0, 60.0).unwrap();

        let result = TemporalCompositor::new().median(&[base.clone(), shifted], &wide);
        assert!(matches!(result, Err(TerraError::GridMismatch { .. })));

        // sub-millimetre jitter in the origin is the same grid
        let jittered = Raster::new(
            "LST",
            GridSpec::new(2, 2, GeoTransform::north_up(1e-4, 60.0, 30.0)),
            array![[5.0, 6.0], [7.0, 8.0]],
        )
        .unwrap();
        assert!(TemporalCompositor::new().median(&[base, jittered], &region()).is_ok());
    }

    #[test]
    fn test_median_of() {
        assert_eq!(median_of::<f32>(&mut []), None);
        assert_eq!(median_of(&mut [4.0]), Some(4.0));
        assert_eq!(median_of(&mut [4.0, 1.0]), Some(2.5));
        assert_eq!(median_of(&mut [9.0, 1.0, 5.0]), Some(5.0));
    }
}
