use crate::types::{DateWindow, Region, Scene, SceneCollection, SceneMetadata, TerraError, TerraResult};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// One archive query: spatial, temporal and cloud-cover filters
#[derive(Debug, Clone)]
pub struct SceneQuery {
    pub archive: String,
    pub region: Arc<Region>,
    pub window: DateWindow,
    /// Scenes with cloud cover at or above this percentage are excluded
    pub cloud_cover_max: Option<f32>,
}

impl SceneQuery {
    /// Whether a scene satisfies every filter of the query
    pub fn matches(&self, scene: &Scene) -> bool {
        self.matches_metadata(&scene.metadata)
    }

    pub fn matches_metadata(&self, meta: &SceneMetadata) -> bool {
        let cloud_ok = match self.cloud_cover_max {
            Some(max) => meta.cloud_cover < max,
            None => true,
        };
        cloud_ok && self.window.contains(&meta.acquired) && self.region.intersects_bbox(&meta.footprint)
    }
}

/// Storage and query service for calibrated scenes
pub trait ImageCatalog: Send + Sync {
    /// Scenes of `query.archive` matching the query. An empty collection is a
    /// valid answer; an unreachable or failing archive is an error.
    fn query_scenes(&self, query: &SceneQuery) -> TerraResult<SceneCollection>;
}

/// Catalog holding materialized scenes in memory, keyed by archive id
#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalog {
    archives: BTreeMap<String, Vec<Scene>>,
    unavailable: HashSet<String>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_scene(&mut self, archive: impl Into<String>, scene: Scene) {
        self.archives.entry(archive.into()).or_default().push(scene);
    }

    pub fn with_scene(mut self, archive: impl Into<String>, scene: Scene) -> Self {
        self.add_scene(archive, scene);
        self
    }

    /// Make every query against `archive` fail, as an unreachable service would
    pub fn mark_unavailable(&mut self, archive: impl Into<String>) {
        self.unavailable.insert(archive.into());
    }

    pub fn scene_count(&self) -> usize {
        self.archives.values().map(|s| s.len()).sum()
    }
}

impl ImageCatalog for InMemoryCatalog {
    fn query_scenes(&self, query: &SceneQuery) -> TerraResult<SceneCollection> {
        if self.unavailable.contains(&query.archive) {
            return Err(TerraError::ArchiveQuery {
                archive: query.archive.clone(),
                message: "archive unavailable".to_string(),
            });
        }

        let scenes: Vec<Scene> = self
            .archives
            .get(&query.archive)
            .map(|scenes| scenes.iter().filter(|s| query.matches(s)).cloned().collect())
            .unwrap_or_default();

        log::debug!(
            "In-memory query on {} ({}) returned {} scenes",
            query.archive,
            query.window,
            scenes.len()
        );
        Ok(SceneCollection::new(scenes))
    }
}
