//! Pipeline configuration.
//!
//! A run is described by one [`PipelineConfig`]: the analysis region, the
//! years to process and the workflows to run for each year. Configurations
//! are plain serde structures and can be loaded from JSON.

use crate::core::{MaskPolicy, SpectralIndex, ZonalParams};
use crate::io::VisParams;
use crate::types::{DateWindow, Region, TerraError, TerraResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Analysis boundary as written in a configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegionSpec {
    Rectangle {
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    },
    /// Rings of one polygon as `[x, y]` pairs: the first is the exterior,
    /// any further rings are holes
    Polygon { rings: Vec<Vec<[f64; 2]>> },
}

impl RegionSpec {
    pub fn to_region(&self) -> TerraResult<Region> {
        match self {
            RegionSpec::Rectangle { min_x, min_y, max_x, max_y } => {
                Region::rectangle(*min_x, *min_y, *max_x, *max_y)
            }
            RegionSpec::Polygon { rings } => Region::from_polygon_coords(rings),
        }
    }
}

/// Seasonal window as `-MM-DD` suffixes joined with the analysis year.
/// The end date is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonWindow {
    pub start_suffix: String,
    pub end_suffix: String,
}

impl SeasonWindow {
    pub fn new(start_suffix: &str, end_suffix: &str) -> Self {
        Self {
            start_suffix: start_suffix.to_string(),
            end_suffix: end_suffix.to_string(),
        }
    }

    pub fn for_year(&self, year: i32) -> TerraResult<DateWindow> {
        let start = parse_day(year, &self.start_suffix)?;
        let end = parse_day(year, &self.end_suffix)?;
        DateWindow::new(start, end)
    }
}

fn parse_day(year: i32, suffix: &str) -> TerraResult<NaiveDate> {
    let text = format!("{}{}", year, suffix);
    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .map_err(|e| TerraError::InvalidConfiguration(format!("Invalid date {}: {}", text, e)))
}

/// Naming and styling of one emitted raster. `{year}` and `{area}` are
/// substituted in `description` and `layer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSettings {
    pub description: String,
    pub folder: String,
    pub layer: String,
    pub vis: VisParams,
}

impl ExportSettings {
    pub fn new(description: &str, folder: &str, layer: &str, vis: VisParams) -> Self {
        Self {
            description: description.to_string(),
            folder: folder.to_string(),
            layer: layer.to_string(),
            vis,
        }
    }

    pub fn description_for(&self, year: i32, area: &str) -> String {
        fill_template(&self.description, year, area)
    }

    pub fn layer_for(&self, year: i32, area: &str) -> String {
        fill_template(&self.layer, year, area)
    }
}

fn fill_template(template: &str, year: i32, area: &str) -> String {
    template.replace("{year}", &year.to_string()).replace("{area}", area)
}

/// One index composited per year, optionally followed by its anomaly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductConfig {
    pub index: SpectralIndex,
    pub composite: ExportSettings,
    #[serde(default)]
    pub anomaly: Option<ExportSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub name: String,
    pub window: SeasonWindow,
    /// Scenes must have cloud cover strictly below this percentage
    #[serde(default)]
    pub cloud_cover_max: Option<f32>,
    pub mask: MaskPolicy,
    pub products: Vec<ProductConfig>,
}

impl WorkflowConfig {
    /// April land surface temperature and heat-island intensity
    pub fn thermal() -> Self {
        Self {
            name: "thermal".to_string(),
            window: SeasonWindow::new("-04-01", "-04-30"),
            cloud_cover_max: Some(5.0),
            mask: MaskPolicy::thermal(),
            products: vec![ProductConfig {
                index: SpectralIndex::Lst,
                composite: ExportSettings::new(
                    "LST_Median_{year}_{area}",
                    "GEE_LST_Exports",
                    "LST_{year}",
                    VisParams::new(25.0, 50.0, &["blue", "cyan", "green", "yellow", "orange", "red"]),
                ),
                anomaly: Some(ExportSettings::new(
                    "UHI_Intensity_{year}_{area}",
                    "GEE_UHI_Exports",
                    "UHI_{year}",
                    VisParams::new(-5.0, 10.0, &["blue", "cyan", "lightgray", "yellow", "orange", "red"]),
                )),
            }],
        }
    }

    /// Annual vegetation and built-up indices
    pub fn spectral() -> Self {
        Self {
            name: "spectral".to_string(),
            window: SeasonWindow::new("-01-01", "-12-31"),
            cloud_cover_max: None,
            mask: MaskPolicy::spectral(),
            products: vec![
                ProductConfig {
                    index: SpectralIndex::Ndvi,
                    composite: ExportSettings::new(
                        "NDVI_Median_{year}_{area}",
                        "GEE_NDVI_Exports",
                        "NDVI_{year}",
                        VisParams::new(-1.0, 1.0, &["blue", "white", "green"]),
                    ),
                    anomaly: None,
                },
                ProductConfig {
                    index: SpectralIndex::Ndbi,
                    composite: ExportSettings::new(
                        "NDBI_Median_{year}_{area}",
                        "GEE_NDBI_Exports",
                        "NDBI_{year}",
                        VisParams::new(-1.0, 1.0, &["green", "white", "red"]),
                    ),
                    anomaly: None,
                },
            ],
        }
    }

    /// Bands every product of this workflow reads
    pub fn required_bands(&self) -> Vec<&'static str> {
        let mut bands: Vec<&'static str> = Vec::new();
        for band in self.products.iter().flat_map(|p| p.index.source_bands().iter()) {
            if !bands.contains(band) {
                bands.push(band);
            }
        }
        bands
    }

    fn validate(&self) -> TerraResult<()> {
        if self.products.is_empty() {
            return Err(TerraError::InvalidConfiguration(format!(
                "Workflow {} has no products",
                self.name
            )));
        }
        if let Some(max) = self.cloud_cover_max {
            if !(max > 0.0 && max <= 100.0) {
                return Err(TerraError::InvalidConfiguration(format!(
                    "Workflow {}: cloud cover ceiling {} outside (0, 100]",
                    self.name, max
                )));
            }
        }
        if self.mask.flags.is_empty() {
            log::warn!("Workflow {} masks no QA flag", self.name);
        }
        Ok(())
    }
}

fn default_years() -> Vec<i32> {
    vec![2014, 2019, 2024]
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub region: RegionSpec,
    /// Used in export descriptions
    pub area_name: String,
    #[serde(default = "default_years")]
    pub years: Vec<i32>,
    pub workflows: Vec<WorkflowConfig>,
    #[serde(default)]
    pub zonal: ZonalParams,
    #[serde(default = "default_true")]
    pub parallel_years: bool,
}

impl PipelineConfig {
    /// Both workflows over the default years
    pub fn new(region: RegionSpec, area_name: &str) -> Self {
        Self {
            region,
            area_name: area_name.to_string(),
            years: default_years(),
            workflows: vec![WorkflowConfig::thermal(), WorkflowConfig::spectral()],
            zonal: ZonalParams::default(),
            parallel_years: true,
        }
    }

    pub fn with_years(mut self, years: &[i32]) -> Self {
        self.years = years.to_vec();
        self
    }

    pub fn with_workflows(mut self, workflows: Vec<WorkflowConfig>) -> Self {
        self.workflows = workflows;
        self
    }

    pub fn from_json_str(json: &str) -> TerraResult<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> TerraResult<Self> {
        log::info!("Loading pipeline configuration from {}", path.as_ref().display());
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    pub fn to_json_string(&self) -> TerraResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check everything that can be checked before touching a catalog.
    /// Returns the validated region.
    pub fn validate(&self) -> TerraResult<Region> {
        let region = self.region.to_region()?;

        if self.years.is_empty() {
            return Err(TerraError::InvalidConfiguration("No analysis years".to_string()));
        }
        if self.workflows.is_empty() {
            return Err(TerraError::InvalidConfiguration("No workflows".to_string()));
        }
        if !(self.zonal.scale.is_finite() && self.zonal.scale > 0.0) {
            return Err(TerraError::InvalidConfiguration(format!(
                "Scale must be positive, got {}",
                self.zonal.scale
            )));
        }
        if self.zonal.max_pixels == 0 {
            return Err(TerraError::InvalidConfiguration("max_pixels must be positive".to_string()));
        }

        for workflow in &self.workflows {
            workflow.validate()?;
            for year in &self.years {
                workflow.window.for_year(*year)?;
            }
        }

        log::debug!(
            "Configuration valid: {} years, {} workflows, area {}",
            self.years.len(),
            self.workflows.len(),
            self.area_name
        );
        Ok(region)
    }
}
