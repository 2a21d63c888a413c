use crate::core::zonal::ZonalStatistic;
use crate::types::Raster;

/// Band name of the urban-heat-island anomaly raster
pub const UHI_BAND: &str = "UHI_Intensity";

/// Per-pixel deviation of a composite from its region-wide statistic
pub struct AnomalyEngine;

impl AnomalyEngine {
    /// `pixel - statistic.mean` for every pixel; no-value stays no-value
    pub fn subtract(composite: &Raster, statistic: &ZonalStatistic) -> Raster {
        log::info!(
            "Computing {} from {} minus zonal mean {:.4}",
            UHI_BAND,
            composite.name,
            statistic.mean
        );
        if statistic.band != composite.name {
            log::warn!(
                "Zonal statistic was computed on {} but applied to {}",
                statistic.band,
                composite.name
            );
        }

        let mean = statistic.mean as f32;
        Raster {
            name: UHI_BAND.to_string(),
            grid: composite.grid,
            data: composite.data.mapv(|v| v - mean),
            acquired: composite.acquired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::zonal::ZonalReducer;
    use crate::types::{GeoTransform, GridSpec, Region};
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    fn composite(data: Array2<f32>) -> Raster {
        let (rows, cols) = data.dim();
        let grid = GridSpec::new(rows, cols, GeoTransform::north_up(0.0, rows as f64 * 30.0, 30.0));
        Raster::new("LST", grid, data).unwrap()
    }

    #[test]
    fn test_anomaly_of_two_by_two() {
        let lst = composite(array![[10.0, 20.0], [30.0, 40.0]]);
        let region = Region::rectangle(0.0, 0.0, 60.0, 60.0).unwrap();
        let stat = ZonalReducer::new().mean(&lst, &region).unwrap();
        let uhi = AnomalyEngine::subtract(&lst, &stat);

        assert_eq!(uhi.name, UHI_BAND);
        assert_eq!(uhi.data, array![[-15.0, -5.0], [5.0, 15.0]]);
    }

    #[test]
    fn test_no_value_propagates() {
        let lst = composite(array![[f32::NAN, 36.0]]);
        let stat = ZonalStatistic {
            band: "LST".to_string(),
            mean: 30.0,
            sample_count: 1,
            subsampled: false,
        };
        let uhi = AnomalyEngine::subtract(&lst, &stat);

        assert!(uhi.data[[0, 0]].is_nan());
        assert_relative_eq!(uhi.data[[0, 1]], 6.0);
    }

    #[test]
    fn test_anomaly_has_zero_zonal_mean() {
        let data = Array2::from_shape_fn((8, 8), |(r, c)| {
            if (r + c) % 7 == 0 {
                f32::NAN
            } else {
                25.0 + (r as f32) * 1.7 - (c as f32) * 0.3
            }
        });
        let lst = composite(data);
        let region = Region::rectangle(0.0, 0.0, 240.0, 240.0).unwrap();
        let reducer = ZonalReducer::new();

        let stat = reducer.mean(&lst, &region).unwrap();
        let uhi = AnomalyEngine::subtract(&lst, &stat);
        let residual = reducer.mean(&uhi, &region).unwrap();

        assert!(residual.mean.abs() < 1e-4, "residual mean {}", residual.mean);
    }
}
