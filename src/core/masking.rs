use crate::core::qa_mask::MaskPolicy;
use crate::types::{Scene, SceneCollection, TerraError, TerraResult, NO_VALUE, QA_BAND};
use ndarray::{Array2, Zip};

/// Suppresses contaminated pixels of a scene by turning them into no-value
pub struct SceneMasker;

impl SceneMasker {
    /// Apply an exclusion mask (`true` = drop) to every band of a scene.
    /// The QA band itself passes through untouched.
    pub fn apply(scene: &Scene, exclusion: &Array2<bool>) -> TerraResult<Scene> {
        if exclusion.dim() != scene.grid.shape() {
            return Err(TerraError::GridMismatch {
                expected: scene.grid.shape(),
                found: exclusion.dim(),
                context: format!("exclusion mask for scene {}", scene.metadata.scene_id),
            });
        }

        let bands = scene
            .bands
            .iter()
            .map(|(name, band)| {
                let masked = Zip::from(band)
                    .and(exclusion)
                    .map_collect(|&value, &excluded| if excluded { NO_VALUE } else { value });
                (name.clone(), masked)
            })
            .collect();

        Ok(Scene {
            metadata: scene.metadata.clone(),
            grid: scene.grid,
            bands,
            qa: scene.qa.clone(),
        })
    }

    /// Decode the scene's QA band with `policy` and mask all bands
    pub fn mask_scene(scene: &Scene, policy: &MaskPolicy) -> TerraResult<Scene> {
        let qa = scene.qa.as_ref().ok_or_else(|| {
            TerraError::MissingBand(format!("{} (scene {})", QA_BAND, scene.metadata.scene_id))
        })?;
        let exclusion = policy.exclusion_mask(qa);
        Self::apply(scene, &exclusion)
    }

    /// Mask every scene of a collection
    pub fn mask_collection(collection: &SceneCollection, policy: &MaskPolicy) -> TerraResult<SceneCollection> {
        log::info!("Masking {} scenes with {:?}", collection.len(), policy);

        #[cfg(feature = "parallel")]
        let scenes = {
            use rayon::prelude::*;
            collection
                .scenes
                .par_iter()
                .map(|scene| Self::mask_scene(scene, policy))
                .collect::<TerraResult<Vec<_>>>()?
        };

        #[cfg(not(feature = "parallel"))]
        let scenes = collection
            .scenes
            .iter()
            .map(|scene| Self::mask_scene(scene, policy))
            .collect::<TerraResult<Vec<_>>>()?;

        Ok(SceneCollection::new(scenes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{is_defined, GeoTransform, GridSpec, Sensor, SceneMetadata};
    use chrono::{DateTime, Utc};
    use ndarray::array;
    use std::collections::BTreeMap;

    fn create_test_scene(qa: Array2<f32>) -> Scene {
        let grid = GridSpec::new(2, 2, GeoTransform::north_up(0.0, 60.0, 30.0));
        let mut bands = BTreeMap::new();
        bands.insert("ST_B10".to_string(), array![[44000.0, 44100.0], [44200.0, 44300.0]]);
        bands.insert("SR_B4".to_string(), array![[8000.0, 8100.0], [8200.0, 8300.0]]);

        Scene::new(
            SceneMetadata {
                scene_id: "LC09_L2SP_144048_20190410_20190422_02_T1".to_string(),
                sensor: Sensor::Landsat9,
                acquired: DateTime::parse_from_rfc3339("2019-04-10T05:10:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
                cloud_cover: 2.0,
                footprint: grid.bounding_box(),
            },
            grid,
            bands,
            Some(qa),
        )
        .unwrap()
    }

    fn defined_pattern(scene: &Scene) -> Vec<Vec<bool>> {
        scene
            .bands
            .values()
            .map(|band| band.iter().map(|v| is_defined(*v)).collect())
            .collect()
    }

    #[test]
    fn test_masked_pixels_become_no_value() {
        let scene = create_test_scene(array![[0.0, 8.0], [0.0, 0.0]]);
        let masked = SceneMasker::mask_scene(&scene, &MaskPolicy::thermal()).unwrap();

        let st = masked.band("ST_B10").unwrap();
        assert!(st[[0, 1]].is_nan());
        assert_eq!(st[[0, 0]], 44000.0);
        assert_eq!(st[[1, 1]], 44300.0);
        assert!(masked.band("SR_B4").unwrap()[[0, 1]].is_nan());

        // Source scene is untouched
        assert_eq!(scene.band("ST_B10").unwrap()[[0, 1]], 44100.0);
    }

    #[test]
    fn test_masking_is_idempotent() {
        let scene = create_test_scene(array![[8.0, 8.0], [8.0, 8.0]]);
        let policy = MaskPolicy::spectral();

        let once = SceneMasker::mask_scene(&scene, &policy).unwrap();
        let twice = SceneMasker::mask_scene(&once, &policy).unwrap();

        assert_eq!(defined_pattern(&once), defined_pattern(&twice));
        assert!(once.bands.values().all(|b| b.iter().all(|v| v.is_nan())));
    }

    #[test]
    fn test_mask_shape_mismatch() {
        let scene = create_test_scene(array![[0.0, 0.0], [0.0, 0.0]]);
        let result = SceneMasker::apply(&scene, &Array2::from_elem((3, 3), false));
        assert!(matches!(result, Err(TerraError::GridMismatch { .. })));
    }

    #[test]
    fn test_missing_qa_band() {
        let mut scene = create_test_scene(array![[0.0, 0.0], [0.0, 0.0]]);
        scene.qa = None;
        let result = SceneMasker::mask_scene(&scene, &MaskPolicy::thermal());
        assert!(matches!(result, Err(TerraError::MissingBand(_))));
    }
}
