use crate::io::catalog::{ImageCatalog, SceneQuery};
use crate::types::{DateWindow, Region, SceneCollection, Sensor, TerraError, TerraResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One sensor archive and how its bands map onto the common schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveSpec {
    pub archive_id: String,
    pub sensor: Sensor,
    /// (sensor band id, common band name) pairs
    pub band_map: Vec<(String, String)>,
}

impl ArchiveSpec {
    /// Landsat 8/9 Collection 2 Level-2 archive. Both sensors already share
    /// band ids, so the mapping is the identity over `bands`.
    pub fn landsat(sensor: Sensor, bands: &[&str]) -> Self {
        Self {
            archive_id: sensor.archive_id().to_string(),
            sensor,
            band_map: bands.iter().map(|b| (b.to_string(), b.to_string())).collect(),
        }
    }
}

/// Queries several sensor archives and merges them into one collection with
/// a unified band schema
#[derive(Debug, Clone)]
pub struct CollectionHarmonizer {
    archives: Vec<ArchiveSpec>,
}

impl CollectionHarmonizer {
    pub fn new(archives: Vec<ArchiveSpec>) -> TerraResult<Self> {
        if archives.is_empty() {
            return Err(TerraError::InvalidConfiguration(
                "Harmonizer needs at least one archive".to_string(),
            ));
        }

        let schema: Vec<&str> = common_names(&archives[0]);
        for archive in archives.iter().skip(1) {
            let names = common_names(archive);
            if names != schema {
                return Err(TerraError::InvalidConfiguration(format!(
                    "Archive {} maps to bands {:?}, expected {:?}",
                    archive.archive_id, names, schema
                )));
            }
        }

        Ok(Self { archives })
    }

    /// Landsat 9 and Landsat 8 restricted to `bands`, merged in that order
    pub fn landsat(bands: &[&str]) -> Self {
        Self {
            archives: vec![
                ArchiveSpec::landsat(Sensor::Landsat9, bands),
                ArchiveSpec::landsat(Sensor::Landsat8, bands),
            ],
        }
    }

    pub fn archives(&self) -> &[ArchiveSpec] {
        &self.archives
    }

    /// Query every archive and union the band-selected results.
    ///
    /// Archives returning nothing are fine; a failing archive aborts with
    /// `ArchiveQuery`. The returned collection is in archive order, not
    /// acquisition order.
    pub fn harmonize(
        &self,
        catalog: &dyn ImageCatalog,
        region: &Arc<Region>,
        window: DateWindow,
        cloud_cover_max: Option<f32>,
    ) -> TerraResult<SceneCollection> {
        log::info!(
            "Harmonizing {} archives over {} (cloud cover < {:?})",
            self.archives.len(),
            window,
            cloud_cover_max
        );

        let mut merged = SceneCollection::default();
        for archive in &self.archives {
            let query = SceneQuery {
                archive: archive.archive_id.clone(),
                region: Arc::clone(region),
                window,
                cloud_cover_max,
            };

            let found = catalog.query_scenes(&query).map_err(|e| match e {
                TerraError::ArchiveQuery { .. } => e,
                other => TerraError::ArchiveQuery {
                    archive: archive.archive_id.clone(),
                    message: other.to_string(),
                },
            })?;

            let total = found.len();
            let selected = found
                .into_iter()
                .filter(|scene| query.matches(scene))
                .map(|scene| scene.select_bands(&archive.band_map))
                .collect::<TerraResult<Vec<_>>>()?;

            if selected.len() < total {
                log::warn!(
                    "{} returned {} scenes outside the query filters; dropped",
                    archive.archive_id,
                    total - selected.len()
                );
            }
            log::info!("{}: {} usable scenes", archive.archive_id, selected.len());

            merged = merged.merge(SceneCollection::new(selected));
        }

        log::info!("Harmonized collection holds {} scenes", merged.len());
        Ok(merged)
    }
}

fn common_names(archive: &ArchiveSpec) -> Vec<&str> {
    let mut names: Vec<&str> = archive.band_map.iter().map(|(_, common)| common.as_str()).collect();
    names.sort_unstable();
    names
}
