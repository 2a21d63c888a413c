use chrono::{DateTime, NaiveDate, Utc};
use geo::{Area, BoundingRect, Contains, Coord, Intersects, LineString, MultiPolygon, Point, Polygon, Rect};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Real-valued pixel data (reflectance, digital numbers, temperatures, indices)
pub type PixelValue = f32;

/// 2D band data array (rows x cols)
pub type Band = Array2<PixelValue>;

/// Quality-assurance band. Integer QA codes stored as floats so that
/// no-value pixels can be carried as NaN like every other band.
pub type QaBand = Array2<PixelValue>;

/// Pixel state meaning "no usable measurement"
pub const NO_VALUE: PixelValue = f32::NAN;

/// Name of the quality-assurance band in Landsat Collection 2 Level-2 products
pub const QA_BAND: &str = "QA_PIXEL";

/// Returns true when a pixel carries a usable measurement
#[inline]
pub fn is_defined(value: PixelValue) -> bool {
    value.is_finite()
}

/// Landsat sensors whose archives are harmonized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sensor {
    Landsat8,
    Landsat9,
}

impl Sensor {
    /// Collection 2 Tier 1 Level-2 archive identifier
    pub fn archive_id(&self) -> &'static str {
        match self {
            Sensor::Landsat8 => "LANDSAT/LC08/C02/T1_L2",
            Sensor::Landsat9 => "LANDSAT/LC09/C02/T1_L2",
        }
    }

    /// Two-character mission code used in product identifiers (e.g. `LC09_...`)
    pub fn product_prefix(&self) -> &'static str {
        match self {
            Sensor::Landsat8 => "LC08",
            Sensor::Landsat9 => "LC09",
        }
    }

    pub fn from_product_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "LC08" => Some(Sensor::Landsat8),
            "LC09" => Some(Sensor::Landsat9),
            _ => None,
        }
    }
}

impl std::fmt::Display for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sensor::Landsat8 => write!(f, "Landsat-8"),
            Sensor::Landsat9 => write!(f, "Landsat-9"),
        }
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y].iter().all(|v| v.is_finite())
            && self.min_x < self.max_x
            && self.min_y < self.max_y
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        Rect::new(
            Coord { x: self.min_x, y: self.min_y },
            Coord { x: self.max_x, y: self.max_y },
        )
        .to_polygon()
    }
}

/// Geospatial transformation parameters (GDAL ordering, north-up)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square pixels of `pixel_size` ground units
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            top_left_x: coeffs[0],
            pixel_width: coeffs[1],
            rotation_x: coeffs[2],
            top_left_y: coeffs[3],
            rotation_y: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Geographic coordinates of the centre of pixel (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let col_f = col as f64 + 0.5;
        let row_f = row as f64 + 0.5;
        let x = self.top_left_x + col_f * self.pixel_width + row_f * self.rotation_x;
        let y = self.top_left_y + col_f * self.rotation_y + row_f * self.pixel_height;
        (x, y)
    }

    /// Ground sample distance (mean absolute pixel size)
    pub fn ground_resolution(&self) -> f64 {
        (self.pixel_width.abs() + self.pixel_height.abs()) / 2.0
    }
}

/// Pixel grid shared by every band of a scene or raster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub rows: usize,
    pub cols: usize,
    pub geo_transform: GeoTransform,
}

impl GridSpec {
    pub fn new(rows: usize, cols: usize, geo_transform: GeoTransform) -> Self {
        Self { rows, cols, geo_transform }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Same shape and same ground placement, up to a thousandth of a pixel
    pub fn is_aligned_with(&self, other: &GridSpec) -> bool {
        let tolerance = 1e-3 * self.geo_transform.ground_resolution().max(f64::EPSILON);
        self.shape() == other.shape()
            && self
                .geo_transform
                .to_gdal()
                .iter()
                .zip(other.geo_transform.to_gdal().iter())
                .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let gt = &self.geo_transform;
        let x0 = gt.top_left_x;
        let y0 = gt.top_left_y;
        let x1 = x0 + self.cols as f64 * gt.pixel_width + self.rows as f64 * gt.rotation_x;
        let y1 = y0 + self.cols as f64 * gt.rotation_y + self.rows as f64 * gt.pixel_height;
        BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

/// Immutable analysis boundary. Used both to filter scenes (footprint must
/// intersect) and to clip and aggregate rasters (pixel centre must lie inside).
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    geometry: MultiPolygon<f64>,
}

impl Region {
    /// Build a region from a polygon set, rejecting degenerate geometry
    pub fn from_multipolygon(geometry: MultiPolygon<f64>) -> TerraResult<Self> {
        if geometry.0.is_empty() {
            return Err(TerraError::InvalidConfiguration(
                "Region geometry has no polygons".to_string(),
            ));
        }

        for (i, polygon) in geometry.0.iter().enumerate() {
            let exterior = polygon.exterior();
            if exterior.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
                return Err(TerraError::InvalidConfiguration(format!(
                    "Region polygon {} has non-finite coordinates",
                    i
                )));
            }
            let mut distinct: Vec<Coord<f64>> = Vec::new();
            for c in exterior.0.iter() {
                if !distinct.contains(c) {
                    distinct.push(*c);
                }
            }
            if distinct.len() < 3 {
                return Err(TerraError::InvalidConfiguration(format!(
                    "Region polygon {} needs at least 3 distinct vertices, found {}",
                    i,
                    distinct.len()
                )));
            }
        }

        if geometry.unsigned_area() <= 0.0 {
            return Err(TerraError::InvalidConfiguration(
                "Region geometry has zero area".to_string(),
            ));
        }

        Ok(Self { geometry })
    }

    /// Build a single-polygon region from rings of `[x, y]` pairs. The first
    /// ring is the exterior, the rest are holes.
    pub fn from_polygon_coords(rings: &[Vec<[f64; 2]>]) -> TerraResult<Self> {
        let mut rings = rings.iter().map(|ring| {
            LineString::from(ring.iter().map(|p| Coord { x: p[0], y: p[1] }).collect::<Vec<_>>())
        });
        let exterior = rings.next().ok_or_else(|| {
            TerraError::InvalidConfiguration("Region polygon has no exterior ring".to_string())
        })?;
        let polygon = Polygon::new(exterior, rings.collect());
        Self::from_multipolygon(MultiPolygon::new(vec![polygon]))
    }

    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> TerraResult<Self> {
        let bbox = BoundingBox::new(min_x, min_y, max_x, max_y);
        if !bbox.is_valid() {
            return Err(TerraError::InvalidConfiguration(format!(
                "Invalid region rectangle: {:?}",
                bbox
            )));
        }
        Self::from_multipolygon(MultiPolygon::new(vec![bbox.to_polygon()]))
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    pub fn bounding_box(&self) -> BoundingBox {
        // Validated geometry always has a bounding rectangle
        match self.geometry.bounding_rect() {
            Some(rect) => BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y),
            None => BoundingBox::new(0.0, 0.0, 0.0, 0.0),
        }
    }

    pub fn intersects_bbox(&self, bbox: &BoundingBox) -> bool {
        self.geometry.intersects(&bbox.to_polygon())
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.geometry.contains(&Point::new(x, y))
    }

    /// Per-pixel inside/outside mask for a grid, using pixel centres
    pub fn pixel_mask(&self, grid: &GridSpec) -> Array2<bool> {
        let bbox = self.bounding_box();
        Array2::from_shape_fn(grid.shape(), |(row, col)| {
            let (x, y) = grid.geo_transform.pixel_center(row, col);
            x >= bbox.min_x
                && x <= bbox.max_x
                && y >= bbox.min_y
                && y <= bbox.max_y
                && self.contains_point(x, y)
        })
    }
}

/// Half-open acquisition window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> TerraResult<Self> {
        if start >= end {
            return Err(TerraError::InvalidConfiguration(format!(
                "Date window start {} is not before end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        let date = timestamp.date_naive();
        date >= self.start && date < self.end
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Scalar metadata of one acquisition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMetadata {
    pub scene_id: String,
    pub sensor: Sensor,
    pub acquired: DateTime<Utc>,
    /// Scene-wide cloud cover percentage (0-100)
    pub cloud_cover: f32,
    pub footprint: BoundingBox,
}

/// One calibrated acquisition: named bands plus an optional QA band.
/// Immutable once materialized; every operation returns a new scene.
#[derive(Debug, Clone)]
pub struct Scene {
    pub metadata: SceneMetadata,
    pub grid: GridSpec,
    pub bands: BTreeMap<String, Band>,
    pub qa: Option<QaBand>,
}

impl Scene {
    pub fn new(
        metadata: SceneMetadata,
        grid: GridSpec,
        bands: BTreeMap<String, Band>,
        qa: Option<QaBand>,
    ) -> TerraResult<Self> {
        for (name, band) in bands.iter() {
            if band.dim() != grid.shape() {
                return Err(TerraError::GridMismatch {
                    expected: grid.shape(),
                    found: band.dim(),
                    context: format!("band {} of scene {}", name, metadata.scene_id),
                });
            }
        }
        if let Some(qa) = &qa {
            if qa.dim() != grid.shape() {
                return Err(TerraError::GridMismatch {
                    expected: grid.shape(),
                    found: qa.dim(),
                    context: format!("{} of scene {}", QA_BAND, metadata.scene_id),
                });
            }
        }
        Ok(Self { metadata, grid, bands, qa })
    }

    pub fn band(&self, name: &str) -> TerraResult<&Band> {
        self.bands.get(name).ok_or_else(|| {
            TerraError::MissingBand(format!("{} (scene {})", name, self.metadata.scene_id))
        })
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.keys().map(|k| k.as_str()).collect()
    }

    /// New scene carrying only the requested bands, renamed via `(source, target)` pairs
    pub fn select_bands(&self, selection: &[(String, String)]) -> TerraResult<Scene> {
        let mut bands = BTreeMap::new();
        for (source, target) in selection {
            bands.insert(target.clone(), self.band(source)?.clone());
        }
        Ok(Scene {
            metadata: self.metadata.clone(),
            grid: self.grid,
            bands,
            qa: self.qa.clone(),
        })
    }
}

/// Ordered sequence of scenes from one or more sensors
#[derive(Debug, Clone, Default)]
pub struct SceneCollection {
    pub scenes: Vec<Scene>,
}

impl SceneCollection {
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self { scenes }
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// Union of two collections. Scenes acquired on the same date by
    /// different sensors are all kept.
    pub fn merge(mut self, other: SceneCollection) -> SceneCollection {
        self.scenes.extend(other.scenes);
        self
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Scene> {
        self.scenes.iter()
    }
}

impl IntoIterator for SceneCollection {
    type Item = Scene;
    type IntoIter = std::vec::IntoIter<Scene>;

    fn into_iter(self) -> Self::IntoIter {
        self.scenes.into_iter()
    }
}

/// Derived single-band raster. Value type: transforms always build a new raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub name: String,
    pub grid: GridSpec,
    pub data: Band,
    /// Acquisition time of the originating scene; composites have none
    pub acquired: Option<DateTime<Utc>>,
}

impl Raster {
    pub fn new(name: impl Into<String>, grid: GridSpec, data: Band) -> TerraResult<Self> {
        let name = name.into();
        if data.dim() != grid.shape() {
            return Err(TerraError::GridMismatch {
                expected: grid.shape(),
                found: data.dim(),
                context: format!("raster {}", name),
            });
        }
        Ok(Self { name, grid, data, acquired: None })
    }

    pub fn with_acquired(mut self, acquired: DateTime<Utc>) -> Self {
        self.acquired = Some(acquired);
        self
    }

    pub fn defined_count(&self) -> usize {
        self.data.iter().filter(|v| is_defined(**v)).count()
    }

    /// True when no pixel carries a defined value
    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|v| is_defined(*v))
    }

    /// (min, max) over defined pixels
    pub fn value_range(&self) -> Option<(PixelValue, PixelValue)> {
        self.data
            .iter()
            .copied()
            .filter(|v| is_defined(*v))
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// Error types for land-surface processing
#[derive(Debug, thiserror::Error)]
pub enum TerraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Empty result: {0}")]
    EmptyResult(String),

    #[error("Archive query failed for {archive}: {message}")]
    ArchiveQuery { archive: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Grid mismatch in {context}: expected {expected:?}, found {found:?}")]
    GridMismatch {
        expected: (usize, usize),
        found: (usize, usize),
        context: String,
    },

    #[error("Missing band: {0}")]
    MissingBand(String),
}

impl TerraError {
    /// Empty composites and reductions are skips, not failures
    pub fn is_empty_result(&self) -> bool {
        matches!(self, TerraError::EmptyResult(_))
    }
}

/// Result type for land-surface operations
pub type TerraResult<T> = Result<T, TerraError>;
