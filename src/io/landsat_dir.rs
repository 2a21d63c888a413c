use crate::io::catalog::{ImageCatalog, SceneQuery};
use crate::io::mtl::parse_mtl_xml;
use crate::types::{GridSpec, SceneCollection, SceneMetadata, TerraError, TerraResult, QA_BAND};
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(feature = "gdal")]
use crate::types::{Band, GeoTransform, Scene};
#[cfg(feature = "gdal")]
use std::collections::BTreeMap;

/// Collection 2 Level-2 bands used by the thermal and spectral workflows
pub const DEFAULT_BANDS: [&str; 4] = ["ST_B10", "SR_B4", "SR_B5", "SR_B6"];

/// A product folder whose MTL metadata parsed successfully
#[derive(Debug, Clone)]
pub struct ProductEntry {
    pub directory: PathBuf,
    pub metadata: SceneMetadata,
}

impl ProductEntry {
    /// Path of `{product_id}_{band}.TIF` inside the product folder
    pub fn band_path(&self, band: &str) -> PathBuf {
        let upper = self.directory.join(format!("{}_{}.TIF", self.metadata.scene_id, band));
        if upper.exists() {
            return upper;
        }
        let lower = self.directory.join(format!("{}_{}.tif", self.metadata.scene_id, band));
        if lower.exists() {
            lower
        } else {
            upper
        }
    }
}

/// Catalog over a local directory of unpacked Landsat Collection 2 products.
///
/// Each product lives in its own folder holding an `*_MTL.xml` file and one
/// GeoTIFF per band. Filtering only needs the MTL; band rasters are read
/// (feature `gdal`) for the products that pass the query.
#[derive(Debug, Clone)]
pub struct LandsatDirectoryCatalog {
    root: PathBuf,
    bands: Vec<String>,
    target_grid: Option<GridSpec>,
}

impl LandsatDirectoryCatalog {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            bands: DEFAULT_BANDS.iter().map(|b| b.to_string()).collect(),
            target_grid: None,
        }
    }

    pub fn with_bands(mut self, bands: &[&str]) -> Self {
        self.bands = bands.iter().map(|b| b.to_string()).collect();
        self
    }

    /// Read every scene as a window of this grid. Without a target grid each
    /// scene keeps its native grid, so scenes of different footprints cannot
    /// be composited together.
    pub fn with_target_grid(mut self, grid: GridSpec) -> Self {
        self.target_grid = Some(grid);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All product folders under the root with a readable MTL file.
    /// Folders with a malformed MTL are logged and skipped.
    pub fn scan(&self) -> TerraResult<Vec<ProductEntry>> {
        let mut entries = Vec::new();

        for dir_entry in fs::read_dir(&self.root)? {
            let path = dir_entry?.path();
            if !path.is_dir() {
                continue;
            }
            let Some(mtl_path) = find_mtl(&path)? else {
                log::debug!("No MTL file in {}", path.display());
                continue;
            };

            let content = fs::read_to_string(&mtl_path)?;
            match parse_mtl_xml(&content).and_then(|mtl| mtl.scene_metadata()) {
                Ok(metadata) => entries.push(ProductEntry { directory: path, metadata }),
                Err(e) => log::warn!("Skipping {}: {}", mtl_path.display(), e),
            }
        }

        entries.sort_by(|a, b| a.metadata.acquired.cmp(&b.metadata.acquired));
        log::debug!("Found {} Landsat products under {}", entries.len(), self.root.display());
        Ok(entries)
    }

    /// Products of the queried archive passing the metadata filters
    pub fn matching_products(&self, query: &SceneQuery) -> TerraResult<Vec<ProductEntry>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|entry| entry.metadata.sensor.archive_id() == query.archive)
            .filter(|entry| query.matches_metadata(&entry.metadata))
            .collect())
    }

    #[cfg(feature = "gdal")]
    fn load_scene(&self, entry: &ProductEntry) -> TerraResult<Scene> {
        log::info!("Loading {} bands of {}", self.bands.len(), entry.metadata.scene_id);

        let mut grid = self.target_grid;
        let mut bands = BTreeMap::new();
        for name in &self.bands {
            let (data, band_grid) = read_band(&entry.band_path(name), self.target_grid.as_ref())?;
            grid.get_or_insert(band_grid);
            bands.insert(name.clone(), data);
        }
        let (qa, qa_grid) = read_band(&entry.band_path(QA_BAND), self.target_grid.as_ref())?;
        let grid = grid.unwrap_or(qa_grid);

        Scene::new(entry.metadata.clone(), grid, bands, Some(qa))
    }

    #[cfg(not(feature = "gdal"))]
    fn load_scene(&self, entry: &ProductEntry) -> TerraResult<crate::types::Scene> {
        Err(TerraError::Processing(format!(
            "Reading {} ({} and {}) requires the `gdal` feature",
            entry.metadata.scene_id,
            self.bands.join(", "),
            QA_BAND
        )))
    }
}

impl ImageCatalog for LandsatDirectoryCatalog {
    fn query_scenes(&self, query: &SceneQuery) -> TerraResult<SceneCollection> {
        let products = self.matching_products(query).map_err(|e| TerraError::ArchiveQuery {
            archive: query.archive.clone(),
            message: format!("scanning {}: {}", self.root.display(), e),
        })?;

        log::info!(
            "{} products of {} match {} under {}",
            products.len(),
            query.archive,
            query.window,
            self.root.display()
        );

        let scenes = products
            .iter()
            .map(|entry| self.load_scene(entry))
            .collect::<TerraResult<Vec<_>>>()?;
        Ok(SceneCollection::new(scenes))
    }
}

fn find_mtl(dir: &Path) -> TerraResult<Option<PathBuf>> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_mtl = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with("_MTL.xml"))
            .unwrap_or(false);
        if is_mtl {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Read band 1 of a GeoTIFF as f32 with the nodata value turned into NaN.
///
/// With a target grid the matching window is read and pixels beyond the
/// file's extent are NaN. The file must share the target's pixel size.
#[cfg(feature = "gdal")]
fn read_band(path: &Path, target: Option<&GridSpec>) -> TerraResult<(Band, GridSpec)> {
    use gdal::Dataset;
    use ndarray::{s, Array2};

    log::debug!("Reading band {}", path.display());
    let dataset = Dataset::open(path)?;
    let source_gt = GeoTransform::from_gdal(dataset.geo_transform()?);
    let (width, height) = dataset.raster_size();
    let rasterband = dataset.rasterband(1)?;
    let nodata = rasterband.no_data_value();

    let to_no_value = |v: f32| match nodata {
        Some(nd) if (v as f64 - nd).abs() < f64::EPSILON => f32::NAN,
        _ => v,
    };

    let Some(grid) = target else {
        let buffer = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
        let data = Array2::from_shape_vec((height, width), buffer.data)
            .map_err(|e| TerraError::Processing(format!("Failed to reshape {}: {}", path.display(), e)))?
            .mapv(to_no_value);
        return Ok((data, GridSpec::new(height, width, source_gt)));
    };

    let target_gt = &grid.geo_transform;
    if (target_gt.pixel_width - source_gt.pixel_width).abs() > 1e-6
        || (target_gt.pixel_height - source_gt.pixel_height).abs() > 1e-6
    {
        return Err(TerraError::InvalidFormat(format!(
            "{} has pixel size {}x{}, target grid {}x{}",
            path.display(),
            source_gt.pixel_width,
            source_gt.pixel_height,
            target_gt.pixel_width,
            target_gt.pixel_height
        )));
    }

    // Offset of the target origin inside the source, in source pixels
    let col_off = ((target_gt.top_left_x - source_gt.top_left_x) / source_gt.pixel_width).round() as isize;
    let row_off = ((target_gt.top_left_y - source_gt.top_left_y) / source_gt.pixel_height).round() as isize;

    let mut data = Array2::from_elem(grid.shape(), f32::NAN);
    let src_col0 = col_off.max(0);
    let src_row0 = row_off.max(0);
    let src_col1 = (col_off + grid.cols as isize).min(width as isize);
    let src_row1 = (row_off + grid.rows as isize).min(height as isize);

    if src_col0 >= src_col1 || src_row0 >= src_row1 {
        log::warn!("{} does not overlap the target grid", path.display());
        return Ok((data, *grid));
    }

    let win_w = (src_col1 - src_col0) as usize;
    let win_h = (src_row1 - src_row0) as usize;
    let buffer = rasterband.read_as::<f32>((src_col0, src_row0), (win_w, win_h), (win_w, win_h), None)?;
    let window = Array2::from_shape_vec((win_h, win_w), buffer.data)
        .map_err(|e| TerraError::Processing(format!("Failed to reshape {}: {}", path.display(), e)))?;

    let dst_row0 = (src_row0 - row_off) as usize;
    let dst_col0 = (src_col0 - col_off) as usize;
    data.slice_mut(s![dst_row0..dst_row0 + win_h, dst_col0..dst_col0 + win_w])
        .assign(&window.mapv(to_no_value));

    Ok((data, *grid))
}
