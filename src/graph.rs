//! Lazy raster graph.
//!
//! Nodes describe work without doing it. Nothing touches the catalog or a
//! pixel until a value is pulled through `realize()`, and each node keeps
//! its first successful result so shared upstream nodes are computed once.
//! A failed realisation is not cached.

use crate::core::{
    AnomalyEngine, CollectionHarmonizer, IndexCalculator, MaskPolicy, SceneMasker, SpectralIndex,
    TemporalCompositor, ZonalReducer, ZonalStatistic,
};
use crate::io::ImageCatalog;
use crate::types::{DateWindow, Raster, Region, SceneCollection, TerraResult};
use std::sync::{Arc, OnceLock};

fn memoize<T>(cell: &OnceLock<T>, compute: impl FnOnce() -> TerraResult<T>) -> TerraResult<&T> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = compute()?;
    Ok(cell.get_or_init(|| value))
}

/// Harmonized and masked scenes of one window
pub struct CollectionNode<'a> {
    catalog: &'a dyn ImageCatalog,
    harmonizer: CollectionHarmonizer,
    region: Arc<Region>,
    window: DateWindow,
    cloud_cover_max: Option<f32>,
    mask: MaskPolicy,
    value: OnceLock<SceneCollection>,
}

impl<'a> CollectionNode<'a> {
    pub fn new(
        catalog: &'a dyn ImageCatalog,
        harmonizer: CollectionHarmonizer,
        region: Arc<Region>,
        window: DateWindow,
        cloud_cover_max: Option<f32>,
        mask: MaskPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            harmonizer,
            region,
            window,
            cloud_cover_max,
            mask,
            value: OnceLock::new(),
        })
    }

    pub fn window(&self) -> DateWindow {
        self.window
    }

    pub fn is_realized(&self) -> bool {
        self.value.get().is_some()
    }

    pub fn realize(&self) -> TerraResult<&SceneCollection> {
        memoize(&self.value, || {
            let harmonized =
                self.harmonizer
                    .harmonize(self.catalog, &self.region, self.window, self.cloud_cover_max)?;
            SceneMasker::mask_collection(&harmonized, &self.mask)
        })
    }
}

/// One index derived from every scene of a collection
pub struct IndexNode<'a> {
    collection: Arc<CollectionNode<'a>>,
    index: SpectralIndex,
    value: OnceLock<Vec<Raster>>,
}

impl<'a> IndexNode<'a> {
    pub fn new(collection: Arc<CollectionNode<'a>>, index: SpectralIndex) -> Arc<Self> {
        Arc::new(Self {
            collection,
            index,
            value: OnceLock::new(),
        })
    }

    pub fn index(&self) -> SpectralIndex {
        self.index
    }

    pub fn realize(&self) -> TerraResult<&[Raster]> {
        memoize(&self.value, || {
            IndexCalculator::compute_collection(self.collection.realize()?, self.index)
        })
        .map(|rasters| rasters.as_slice())
    }
}

pub enum RasterOp<'a> {
    /// Per-pixel median of an index over time, clipped to the region
    Composite {
        source: Arc<IndexNode<'a>>,
        region: Arc<Region>,
    },
    /// Composite minus its region-wide mean
    Anomaly {
        composite: Arc<RasterNode<'a>>,
        statistic: Arc<ScalarNode<'a>>,
    },
}

pub struct RasterNode<'a> {
    op: RasterOp<'a>,
    value: OnceLock<Raster>,
}

impl<'a> RasterNode<'a> {
    pub fn composite(source: Arc<IndexNode<'a>>, region: Arc<Region>) -> Arc<Self> {
        Arc::new(Self {
            op: RasterOp::Composite { source, region },
            value: OnceLock::new(),
        })
    }

    pub fn anomaly(composite: Arc<RasterNode<'a>>, statistic: Arc<ScalarNode<'a>>) -> Arc<Self> {
        Arc::new(Self {
            op: RasterOp::Anomaly { composite, statistic },
            value: OnceLock::new(),
        })
    }

    pub fn is_realized(&self) -> bool {
        self.value.get().is_some()
    }

    pub fn realize(&self) -> TerraResult<&Raster> {
        memoize(&self.value, || match &self.op {
            RasterOp::Composite { source, region } => {
                TemporalCompositor::new().median(source.realize()?, region)
            }
            RasterOp::Anomaly { composite, statistic } => {
                Ok(AnomalyEngine::subtract(composite.realize()?, statistic.realize()?))
            }
        })
    }
}

pub enum ScalarOp<'a> {
    ZonalMean {
        raster: Arc<RasterNode<'a>>,
        region: Arc<Region>,
        reducer: ZonalReducer,
    },
}

pub struct ScalarNode<'a> {
    op: ScalarOp<'a>,
    value: OnceLock<ZonalStatistic>,
}

impl<'a> ScalarNode<'a> {
    pub fn zonal_mean(raster: Arc<RasterNode<'a>>, region: Arc<Region>, reducer: ZonalReducer) -> Arc<Self> {
        Arc::new(Self {
            op: ScalarOp::ZonalMean { raster, region, reducer },
            value: OnceLock::new(),
        })
    }

    pub fn realize(&self) -> TerraResult<&ZonalStatistic> {
        memoize(&self.value, || match &self.op {
            ScalarOp::ZonalMean { raster, region, reducer } => reducer.mean(raster.realize()?, region),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{InMemoryCatalog, SceneQuery};
    use crate::types::{BoundingBox, GeoTransform, GridSpec, Scene, SceneMetadata, Sensor, TerraError};
    use chrono::{NaiveDate, TimeZone, Utc};
    use ndarray::{array, Array2};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCatalog {
        inner: InMemoryCatalog,
        queries: AtomicUsize,
    }

    impl ImageCatalog for CountingCatalog {
        fn query_scenes(&self, query: &SceneQuery) -> TerraResult<SceneCollection> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.inner.query_scenes(query)
        }
    }

    fn grid() -> GridSpec {
        GridSpec::new(2, 2, GeoTransform::north_up(0.0, 60.0, 30.0))
    }

    fn thermal_scene(dn: Array2<f32>) -> Scene {
        let mut bands = BTreeMap::new();
        bands.insert("ST_B10".to_string(), dn);
        Scene::new(
            SceneMetadata {
                scene_id: "LC08_L2SP_001001_20190410_20190420_02_T1".to_string(),
                sensor: Sensor::Landsat8,
                acquired: Utc.with_ymd_and_hms(2019, 4, 10, 5, 0, 0).unwrap(),
                cloud_cover: 1.0,
                footprint: BoundingBox::new(0.0, 0.0, 60.0, 60.0),
            },
            grid(),
            bands,
            Some(Array2::zeros((2, 2))),
        )
        .unwrap()
    }

    fn catalog(scenes: Vec<Scene>) -> CountingCatalog {
        let mut inner = InMemoryCatalog::new();
        for scene in scenes {
            inner.add_scene(Sensor::Landsat8.archive_id(), scene);
        }
        CountingCatalog { inner, queries: AtomicUsize::new(0) }
    }

    fn window() -> DateWindow {
        DateWindow::new(
            NaiveDate::from_ymd_opt(2019, 4, 1).unwrap(),
            NaiveDate::from_ymd_opt(2019, 4, 30).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_nodes_are_lazy_and_realize_once() {
        // DN for 30, 31, 32, 33 degrees Celsius
        let dn = array![[30.0f32, 31.0], [32.0, 33.0]].mapv(|c| (c + 273.15 - 149.0) / 0.00341802);
        let catalog = catalog(vec![thermal_scene(dn)]);
        let region = Arc::new(Region::rectangle(0.0, 0.0, 60.0, 60.0).unwrap());

        let collection = CollectionNode::new(
            &catalog,
            CollectionHarmonizer::landsat(&["ST_B10"]),
            Arc::clone(&region),
            window(),
            Some(5.0),
            MaskPolicy::thermal(),
        );
        let lst = IndexNode::new(Arc::clone(&collection), SpectralIndex::Lst);
        let composite = RasterNode::composite(lst, Arc::clone(&region));
        let mean = ScalarNode::zonal_mean(Arc::clone(&composite), Arc::clone(&region), ZonalReducer::new());
        let uhi = RasterNode::anomaly(Arc::clone(&composite), Arc::clone(&mean));

        assert_eq!(catalog.queries.load(Ordering::SeqCst), 0);
        assert!(!collection.is_realized());

        let anomaly = uhi.realize().unwrap();
        assert!((anomaly.data[[0, 0]] + 1.5).abs() < 1e-3);
        assert!((mean.realize().unwrap().mean - 31.5).abs() < 1e-3);
        assert!(composite.is_realized());

        // one query per archive, however many times downstream nodes are pulled
        uhi.realize().unwrap();
        composite.realize().unwrap();
        assert_eq!(catalog.queries.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_realization_is_reported() {
        let catalog = catalog(Vec::new());
        let region = Arc::new(Region::rectangle(0.0, 0.0, 60.0, 60.0).unwrap());
        let collection = CollectionNode::new(
            &catalog,
            CollectionHarmonizer::landsat(&["ST_B10"]),
            Arc::clone(&region),
            window(),
            Some(5.0),
            MaskPolicy::thermal(),
        );
        let composite = RasterNode::composite(IndexNode::new(collection, SpectralIndex::Lst), region);

        assert!(matches!(composite.realize(), Err(TerraError::EmptyResult(_))));
        assert!(!composite.is_realized());
    }
}
