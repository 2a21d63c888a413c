use crate::types::{Raster, Region, TerraError, TerraResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[cfg(feature = "gdal")]
use std::path::{Path, PathBuf};

/// Parameters of one asynchronous export request
#[derive(Debug, Clone)]
pub struct ExportParams {
    pub description: String,
    pub folder: String,
    pub region: Region,
    /// Output ground resolution in metres
    pub scale: f64,
    pub max_pixels: u64,
}

/// Handle of a submitted export. The pipeline never waits on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportJob {
    pub id: u64,
    pub description: String,
    pub folder: String,
    pub submitted_at: DateTime<Utc>,
}

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

impl ExportJob {
    pub fn submit(params: &ExportParams) -> Self {
        Self {
            id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
            description: params.description.clone(),
            folder: params.folder.clone(),
            submitted_at: Utc::now(),
        }
    }
}

/// Display stretch for an interactive layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisParams {
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub palette: Vec<String>,
}

impl VisParams {
    pub fn new(min: f64, max: f64, palette: &[&str]) -> Self {
        Self {
            min,
            max,
            palette: palette.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Destination for finished rasters: durable exports plus display layers
pub trait OutputSink: Send + Sync {
    fn export_raster(&self, raster: &Raster, params: &ExportParams) -> TerraResult<ExportJob>;

    fn display_raster(&self, raster: &Raster, vis: &VisParams, layer_name: &str);
}

#[derive(Debug, Clone)]
pub struct RecordedExport {
    pub job: ExportJob,
    pub params: ExportParams,
    pub raster: Raster,
}

#[derive(Debug, Clone)]
pub struct RecordedLayer {
    pub name: String,
    pub vis: VisParams,
    pub raster: Raster,
}

/// Sink keeping every export and layer in memory, for dry runs and tests
#[derive(Debug, Default)]
pub struct MemorySink {
    exports: Mutex<Vec<RecordedExport>>,
    layers: Mutex<Vec<RecordedLayer>>,
    failing_folders: HashSet<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every export into `folder`
    pub fn with_failing_folder(mut self, folder: impl Into<String>) -> Self {
        self.failing_folders.insert(folder.into());
        self
    }

    pub fn exports(&self) -> Vec<RecordedExport> {
        self.exports.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn layers(&self) -> Vec<RecordedLayer> {
        self.layers.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn export_named(&self, description: &str) -> Option<RecordedExport> {
        self.exports().into_iter().find(|e| e.params.description == description)
    }
}

impl OutputSink for MemorySink {
    fn export_raster(&self, raster: &Raster, params: &ExportParams) -> TerraResult<ExportJob> {
        if self.failing_folders.contains(&params.folder) {
            return Err(TerraError::Processing(format!(
                "export of {} to {} rejected",
                params.description, params.folder
            )));
        }

        let job = ExportJob::submit(params);
        log::debug!("Recorded export #{} {}/{}", job.id, params.folder, params.description);
        self.exports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedExport {
                job: job.clone(),
                params: params.clone(),
                raster: raster.clone(),
            });
        Ok(job)
    }

    fn display_raster(&self, raster: &Raster, vis: &VisParams, layer_name: &str) {
        self.layers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedLayer {
                name: layer_name.to_string(),
                vis: vis.clone(),
                raster: raster.clone(),
            });
    }
}

/// Sink writing each export to `<root>/<folder>/<description>.tif`.
/// Display requests are logged with the raster's value range.
#[cfg(feature = "gdal")]
#[derive(Debug, Clone)]
pub struct GeoTiffSink {
    root: PathBuf,
    epsg: Option<u32>,
    compression: Option<String>,
}

#[cfg(feature = "gdal")]
impl GeoTiffSink {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            epsg: None,
            compression: Some("LZW".to_string()),
        }
    }

    pub fn with_epsg(mut self, epsg: u32) -> Self {
        self.epsg = Some(epsg);
        self
    }

    pub fn with_compression(mut self, compression: Option<&str>) -> Self {
        self.compression = compression.map(|c| c.to_string());
        self
    }

    pub fn output_path(&self, params: &ExportParams) -> PathBuf {
        self.root.join(&params.folder).join(format!("{}.tif", params.description))
    }

    /// GTiff creation options; compression only takes effect at creation time
    pub fn creation_options(&self) -> Vec<(&'static str, String)> {
        let mut options = Vec::new();
        if let Some(compression) = &self.compression {
            options.push(("COMPRESS", compression.clone()));
        }
        options.push(("TILED", "YES".to_string()));
        options
    }

    fn write_geotiff(&self, raster: &Raster, path: &Path) -> TerraResult<()> {
        use gdal::raster::RasterCreationOption;
        use gdal::DriverManager;

        log::info!("Saving {} as GeoTIFF: {}", raster.name, path.display());

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let (height, width) = raster.data.dim();

        let creation_options = self.creation_options();
        let options: Vec<RasterCreationOption> = creation_options
            .iter()
            .map(|(key, value)| RasterCreationOption { key: *key, value: value.as_str() })
            .collect();
        let mut dataset =
            driver.create_with_band_type_with_options::<f32, _>(path, width as isize, height as isize, 1, &options)?;
        dataset.set_geo_transform(&raster.grid.geo_transform.to_gdal())?;
        if let Some(epsg) = self.epsg {
            dataset.set_spatial_ref(&gdal::spatial_ref::SpatialRef::from_epsg(epsg)?)?;
        }

        let mut rasterband = dataset.rasterband(1)?;
        let flat_data: Vec<f32> = raster.data.iter().cloned().collect();
        let buffer = gdal::raster::Buffer::new((width, height), flat_data);
        rasterband.write((0, 0), (width, height), &buffer)?;
        rasterband.set_no_data_value(Some(f32::NAN as f64))?;
        Ok(())
    }
}

#[cfg(feature = "gdal")]
impl OutputSink for GeoTiffSink {
    fn export_raster(&self, raster: &Raster, params: &ExportParams) -> TerraResult<ExportJob> {
        let resolution = raster.grid.geo_transform.ground_resolution();
        if (resolution - params.scale).abs() > 1e-6 {
            log::warn!(
                "{} exported at native {} m although {} m was requested",
                params.description,
                resolution,
                params.scale
            );
        }
        let pixels = (raster.grid.rows * raster.grid.cols) as u64;
        if pixels > params.max_pixels {
            return Err(TerraError::Processing(format!(
                "{} has {} pixels, above the export bound of {}",
                params.description, pixels, params.max_pixels
            )));
        }

        let path = self.output_path(params);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let job = ExportJob::submit(params);
        self.write_geotiff(raster, &path)?;
        Ok(job)
    }

    fn display_raster(&self, raster: &Raster, vis: &VisParams, layer_name: &str) {
        match raster.value_range() {
            Some((lo, hi)) => log::info!(
                "Layer {}: {} in [{:.3}, {:.3}], stretch {}..{}",
                layer_name,
                raster.name,
                lo,
                hi,
                vis.min,
                vis.max
            ),
            None => log::info!("Layer {}: {} has no defined pixel", layer_name, raster.name),
        }
    }
}
