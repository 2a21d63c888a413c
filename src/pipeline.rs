//! Per-year driver.
//!
//! For every analysis year and workflow the driver wires a lazy graph
//! (query, mask, index, composite and, where configured, zonal mean and
//! anomaly), realizes it and hands the products to an [`OutputSink`].
//! Each (year, workflow) flow is independent: an empty composite skips it,
//! any other error fails it, and neither stops the remaining flows.

use crate::config::{ExportSettings, PipelineConfig, WorkflowConfig};
use crate::core::{CollectionHarmonizer, ZonalReducer};
use crate::graph::{CollectionNode, IndexNode, RasterNode, ScalarNode};
use crate::io::{ExportJob, ExportParams, ImageCatalog, OutputSink};
use crate::types::{Raster, Region, TerraError, TerraResult};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum YearOutcome {
    /// Products were displayed and their exports submitted. Exports the
    /// sink rejected are listed by description.
    Emitted {
        exports: Vec<ExportJob>,
        failed_exports: Vec<String>,
    },
    /// No pixel contributed to a composite or a statistic
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearReport {
    pub year: i32,
    pub workflow: String,
    pub outcome: YearOutcome,
    /// Scenes left after harmonizing, when the query succeeded
    pub scene_count: Option<usize>,
    /// Region-wide mean used for the anomaly, when one was computed
    pub zonal_mean: Option<f64>,
}

impl YearReport {
    pub fn is_emitted(&self) -> bool {
        matches!(self.outcome, YearOutcome::Emitted { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, YearOutcome::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, YearOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub years: Vec<YearReport>,
}

impl RunReport {
    pub fn report(&self, year: i32, workflow: &str) -> Option<&YearReport> {
        self.years.iter().find(|r| r.year == year && r.workflow == workflow)
    }

    pub fn emitted_count(&self) -> usize {
        self.years.iter().filter(|r| r.is_emitted()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.years.iter().filter(|r| r.is_skipped()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.years.iter().filter(|r| r.is_failed()).count()
    }
}

/// Realized products of one flow, ready for emission
struct Product {
    raster: Raster,
    settings: ExportSettings,
}

pub struct Pipeline {
    config: PipelineConfig,
    region: Arc<Region>,
}

impl Pipeline {
    /// Validate the configuration; any problem is fatal here, before a
    /// single query is issued.
    pub fn new(config: PipelineConfig) -> TerraResult<Self> {
        let region = config.validate()?;
        Ok(Self {
            config,
            region: Arc::new(region),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn run(&self, catalog: &dyn ImageCatalog, sink: &dyn OutputSink) -> RunReport {
        let flows: Vec<(i32, usize)> = self
            .config
            .years
            .iter()
            .flat_map(|&year| (0..self.config.workflows.len()).map(move |w| (year, w)))
            .collect();

        log::info!(
            "Running {} flows ({} years x {} workflows) over {}",
            flows.len(),
            self.config.years.len(),
            self.config.workflows.len(),
            self.config.area_name
        );

        let run_flow = |&(year, w): &(i32, usize)| (year, w, self.run_year(catalog, sink, year, &self.config.workflows[w]));

        #[cfg(feature = "parallel")]
        let mut results: Vec<(i32, usize, YearReport)> = if self.config.parallel_years {
            use rayon::prelude::*;
            flows.par_iter().map(run_flow).collect()
        } else {
            flows.iter().map(run_flow).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let mut results: Vec<(i32, usize, YearReport)> = flows.iter().map(run_flow).collect();

        results.sort_by_key(|(year, w, _)| (*year, *w));
        let report = RunReport {
            years: results.into_iter().map(|(_, _, report)| report).collect(),
        };

        log::info!(
            "Run finished: {} emitted, {} skipped, {} failed",
            report.emitted_count(),
            report.skipped_count(),
            report.failed_count()
        );
        report
    }

    /// One (year, workflow) flow. Never returns an error: the outcome is
    /// recorded in the report.
    pub fn run_year(
        &self,
        catalog: &dyn ImageCatalog,
        sink: &dyn OutputSink,
        year: i32,
        workflow: &WorkflowConfig,
    ) -> YearReport {
        log::info!("{} {}: starting", workflow.name, year);

        let mut report = YearReport {
            year,
            workflow: workflow.name.clone(),
            outcome: YearOutcome::Skipped { reason: String::new() },
            scene_count: None,
            zonal_mean: None,
        };

        match self.realize_products(catalog, year, workflow, &mut report) {
            Ok(products) => {
                report.outcome = self.emit(sink, year, products);
                log::info!("{} {}: products emitted", workflow.name, year);
            }
            Err(e) if e.is_empty_result() => {
                log::warn!("{} {}: skipped, {}", workflow.name, year, e);
                report.outcome = YearOutcome::Skipped { reason: e.to_string() };
            }
            Err(e) => {
                log::warn!("{} {}: failed, {}", workflow.name, year, e);
                report.outcome = YearOutcome::Failed { error: e.to_string() };
            }
        }
        report
    }

    fn realize_products(
        &self,
        catalog: &dyn ImageCatalog,
        year: i32,
        workflow: &WorkflowConfig,
        report: &mut YearReport,
    ) -> TerraResult<Vec<Product>> {
        let window = workflow.window.for_year(year)?;
        let harmonizer = CollectionHarmonizer::landsat(&workflow.required_bands());
        let collection = CollectionNode::new(
            catalog,
            harmonizer,
            Arc::clone(&self.region),
            window,
            workflow.cloud_cover_max,
            workflow.mask.clone(),
        );

        let scenes = collection.realize()?;
        report.scene_count = Some(scenes.len());
        if scenes.is_empty() {
            return Err(TerraError::EmptyResult(format!(
                "no scene matches {} {}",
                workflow.name, window
            )));
        }

        let mut products = Vec::new();
        for product in &workflow.products {
            let index = IndexNode::new(Arc::clone(&collection), product.index);
            let composite = RasterNode::composite(index, Arc::clone(&self.region));
            products.push(Product {
                raster: composite.realize()?.clone(),
                settings: product.composite.clone(),
            });

            if let Some(anomaly_settings) = &product.anomaly {
                let mean = ScalarNode::zonal_mean(
                    Arc::clone(&composite),
                    Arc::clone(&self.region),
                    ZonalReducer::with_params(self.config.zonal),
                );
                let anomaly = RasterNode::anomaly(Arc::clone(&composite), Arc::clone(&mean));
                report.zonal_mean = Some(mean.realize()?.mean);
                products.push(Product {
                    raster: anomaly.realize()?.clone(),
                    settings: anomaly_settings.clone(),
                });
            }
        }
        Ok(products)
    }

    fn emit(&self, sink: &dyn OutputSink, year: i32, products: Vec<Product>) -> YearOutcome {
        let area = &self.config.area_name;
        let mut exports = Vec::new();
        let mut failed_exports = Vec::new();

        for Product { raster, settings } in products {
            sink.display_raster(&raster, &settings.vis, &settings.layer_for(year, area));

            let params = ExportParams {
                description: settings.description_for(year, area),
                folder: settings.folder.clone(),
                region: (*self.region).clone(),
                scale: self.config.zonal.scale,
                max_pixels: self.config.zonal.max_pixels,
            };
            match sink.export_raster(&raster, &params) {
                Ok(job) => {
                    log::debug!("Export #{} submitted: {}/{}", job.id, job.folder, job.description);
                    exports.push(job);
                }
                Err(e) => {
                    log::warn!("Export of {} failed: {}", params.description, e);
                    failed_exports.push(params.description);
                }
            }
        }

        YearOutcome::Emitted { exports, failed_exports }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegionSpec;
    use crate::io::{InMemoryCatalog, MemorySink};

    fn config() -> PipelineConfig {
        PipelineConfig::new(
            RegionSpec::Rectangle {
                min_x: 0.0,
                min_y: 0.0,
                max_x: 60.0,
                max_y: 60.0,
            },
            "MyCity",
        )
        .with_years(&[2024, 2014])
    }

    #[test]
    fn test_invalid_configuration_is_fatal() {
        let bad = config().with_years(&[]);
        assert!(matches!(Pipeline::new(bad), Err(TerraError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_empty_catalog_skips_every_flow_in_order() {
        let pipeline = Pipeline::new(config()).unwrap();
        let sink = MemorySink::new();
        let report = pipeline.run(&InMemoryCatalog::new(), &sink);

        let order: Vec<(i32, &str)> = report.years.iter().map(|r| (r.year, r.workflow.as_str())).collect();
        assert_eq!(
            order,
            vec![(2014, "thermal"), (2014, "spectral"), (2024, "thermal"), (2024, "spectral")]
        );
        assert_eq!(report.skipped_count(), 4);
        assert!(report.years.iter().all(|r| r.scene_count == Some(0)));
        assert!(sink.exports().is_empty());
        assert!(sink.layers().is_empty());
    }
}
