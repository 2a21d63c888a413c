use crate::types::{BoundingBox, SceneMetadata, Sensor, TerraError, TerraResult};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

/// Root of a Landsat Collection 2 `_MTL.xml` metadata file.
/// Only the groups the catalog needs are modelled.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct LandsatMetadataFile {
    pub product_contents: ProductContents,
    pub image_attributes: ImageAttributes,
    pub projection_attributes: ProjectionAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ProductContents {
    pub landsat_product_id: String,
    pub processing_level: Option<String>,
    pub collection_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ImageAttributes {
    pub spacecraft_id: String,
    pub date_acquired: String,
    pub scene_center_time: String,
    pub cloud_cover: f32,
    pub wrs_path: Option<u16>,
    pub wrs_row: Option<u16>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ProjectionAttributes {
    pub corner_ul_projection_x_product: f64,
    pub corner_ul_projection_y_product: f64,
    pub corner_lr_projection_x_product: f64,
    pub corner_lr_projection_y_product: f64,
    pub grid_cell_size_thermal: Option<f64>,
    pub grid_cell_size_reflective: Option<f64>,
}

/// Components of a Collection 2 product identifier,
/// e.g. `LC09_L2SP_144048_20220410_20220412_02_T1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductId {
    pub sensor: Sensor,
    pub processing_level: String,
    pub wrs_path: u16,
    pub wrs_row: u16,
    pub acquired: NaiveDate,
    pub processed: NaiveDate,
    pub collection: u8,
    pub tier: String,
}

fn product_id_pattern() -> TerraResult<&'static Regex> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^(L[COTEM]0\d)_(L[12][A-Z]{2})_(\d{3})(\d{3})_(\d{8})_(\d{8})_(\d{2})_(T1|T2|RT)$")
        })
        .as_ref()
        .map_err(|e| TerraError::Processing(format!("Invalid product id pattern: {}", e)))
}

impl ProductId {
    pub fn parse(id: &str) -> TerraResult<Self> {
        let caps = product_id_pattern()?
            .captures(id.trim())
            .ok_or_else(|| TerraError::Metadata(format!("Unrecognised Landsat product id: {}", id)))?;

        let sensor = Sensor::from_product_prefix(&caps[1])
            .ok_or_else(|| TerraError::Metadata(format!("Unsupported mission {} in {}", &caps[1], id)))?;
        let parse_date = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y%m%d")
                .map_err(|e| TerraError::Metadata(format!("Bad date {} in {}: {}", s, id, e)))
        };
        let parse_num = |s: &str| {
            s.parse::<u16>()
                .map_err(|e| TerraError::Metadata(format!("Bad number {} in {}: {}", s, id, e)))
        };

        Ok(ProductId {
            sensor,
            processing_level: caps[2].to_string(),
            wrs_path: parse_num(&caps[3])?,
            wrs_row: parse_num(&caps[4])?,
            acquired: parse_date(&caps[5])?,
            processed: parse_date(&caps[6])?,
            collection: parse_num(&caps[7])? as u8,
            tier: caps[8].to_string(),
        })
    }
}

/// Parse `_MTL.xml` content
pub fn parse_mtl_xml(xml_content: &str) -> TerraResult<LandsatMetadataFile> {
    log::debug!("Parsing MTL metadata (length: {})", xml_content.len());
    from_str(xml_content).map_err(|e| TerraError::XmlParsing(format!("MTL metadata: {}", e)))
}

impl LandsatMetadataFile {
    pub fn product_id(&self) -> TerraResult<ProductId> {
        ProductId::parse(&self.product_contents.landsat_product_id)
    }

    /// Scene metadata for the catalog: id, sensor, acquisition time, cloud
    /// cover and projected footprint
    pub fn scene_metadata(&self) -> TerraResult<SceneMetadata> {
        let product = self.product_id()?;
        let attrs = &self.image_attributes;

        let date = NaiveDate::parse_from_str(attrs.date_acquired.trim(), "%Y-%m-%d")
            .map_err(|e| TerraError::Metadata(format!("Bad DATE_ACQUIRED {}: {}", attrs.date_acquired, e)))?;
        let time_str = attrs.scene_center_time.trim().trim_matches('"').trim_end_matches('Z');
        let time = NaiveTime::parse_from_str(time_str, "%H:%M:%S%.f")
            .map_err(|e| TerraError::Metadata(format!("Bad SCENE_CENTER_TIME {}: {}", attrs.scene_center_time, e)))?;
        let acquired = Utc.from_utc_datetime(&NaiveDateTime::new(date, time));

        if date != product.acquired {
            log::warn!(
                "DATE_ACQUIRED {} disagrees with product id {}",
                date,
                self.product_contents.landsat_product_id
            );
        }

        if !(0.0..=100.0).contains(&attrs.cloud_cover) {
            return Err(TerraError::Metadata(format!(
                "CLOUD_COVER {} outside 0-100",
                attrs.cloud_cover
            )));
        }

        let proj = &self.projection_attributes;
        let footprint = BoundingBox::new(
            proj.corner_ul_projection_x_product.min(proj.corner_lr_projection_x_product),
            proj.corner_ul_projection_y_product.min(proj.corner_lr_projection_y_product),
            proj.corner_ul_projection_x_product.max(proj.corner_lr_projection_x_product),
            proj.corner_ul_projection_y_product.max(proj.corner_lr_projection_y_product),
        );

        Ok(SceneMetadata {
            scene_id: self.product_contents.landsat_product_id.trim().to_string(),
            sensor: product.sensor,
            acquired,
            cloud_cover: attrs.cloud_cover,
            footprint,
        })
    }
}

#[cfg(test)]
pub(crate) const SAMPLE_MTL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<LANDSAT_METADATA_FILE>
  <PRODUCT_CONTENTS>
    <ORIGIN>Image courtesy of the U.S. Geological Survey</ORIGIN>
    <LANDSAT_PRODUCT_ID>LC09_L2SP_144048_20220410_20220412_02_T1</LANDSAT_PRODUCT_ID>
    <PROCESSING_LEVEL>L2SP</PROCESSING_LEVEL>
    <COLLECTION_NUMBER>02</COLLECTION_NUMBER>
    <FILE_NAME_BAND_ST_B10>LC09_L2SP_144048_20220410_20220412_02_T1_ST_B10.TIF</FILE_NAME_BAND_ST_B10>
  </PRODUCT_CONTENTS>
  <IMAGE_ATTRIBUTES>
    <SPACECRAFT_ID>LANDSAT_9</SPACECRAFT_ID>
    <SENSOR_ID>OLI_TIRS</SENSOR_ID>
    <WRS_PATH>144</WRS_PATH>
    <WRS_ROW>48</WRS_ROW>
    <DATE_ACQUIRED>2022-04-10</DATE_ACQUIRED>
    <SCENE_CENTER_TIME>05:06:07.1234560Z</SCENE_CENTER_TIME>
    <CLOUD_COVER>1.23</CLOUD_COVER>
  </IMAGE_ATTRIBUTES>
  <PROJECTION_ATTRIBUTES>
    <MAP_PROJECTION>UTM</MAP_PROJECTION>
    <GRID_CELL_SIZE_REFLECTIVE>30.00</GRID_CELL_SIZE_REFLECTIVE>
    <GRID_CELL_SIZE_THERMAL>30.00</GRID_CELL_SIZE_THERMAL>
    <CORNER_UL_PROJECTION_X_PRODUCT>166785.000</CORNER_UL_PROJECTION_X_PRODUCT>
    <CORNER_UL_PROJECTION_Y_PRODUCT>1942815.000</CORNER_UL_PROJECTION_Y_PRODUCT>
    <CORNER_LR_PROJECTION_X_PRODUCT>398715.000</CORNER_LR_PROJECTION_X_PRODUCT>
    <CORNER_LR_PROJECTION_Y_PRODUCT>1707885.000</CORNER_LR_PROJECTION_Y_PRODUCT>
  </PROJECTION_ATTRIBUTES>
</LANDSAT_METADATA_FILE>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_product_id_parsing() {
        let id = ProductId::parse("LC08_L2SP_144048_20190412_20200829_02_T1").unwrap();
        assert_eq!(id.sensor, Sensor::Landsat8);
        assert_eq!(id.processing_level, "L2SP");
        assert_eq!(id.wrs_path, 144);
        assert_eq!(id.wrs_row, 48);
        assert_eq!(id.acquired, NaiveDate::from_ymd_opt(2019, 4, 12).unwrap());
        assert_eq!(id.collection, 2);
        assert_eq!(id.tier, "T1");
    }

    #[test]
    fn test_product_id_rejects_other_missions() {
        assert!(ProductId::parse("LE07_L2SP_144048_20190412_20200829_02_T1").is_err());
        assert!(ProductId::parse("S2A_MSIL2A_20190412").is_err());
    }

    #[test]
    fn test_mtl_parsing() {
        let mtl = parse_mtl_xml(SAMPLE_MTL).unwrap();
        assert_eq!(mtl.image_attributes.spacecraft_id, "LANDSAT_9");
        assert_eq!(mtl.image_attributes.wrs_path, Some(144));

        let meta = mtl.scene_metadata().unwrap();
        assert_eq!(meta.scene_id, "LC09_L2SP_144048_20220410_20220412_02_T1");
        assert_eq!(meta.sensor, Sensor::Landsat9);
        assert_eq!(meta.acquired.year(), 2022);
        assert_eq!(meta.acquired.hour(), 5);
        assert!((meta.cloud_cover - 1.23).abs() < 1e-6);
        assert_eq!(meta.footprint.min_x, 166785.0);
        assert_eq!(meta.footprint.min_y, 1707885.0);
        assert_eq!(meta.footprint.max_y, 1942815.0);
    }

    #[test]
    fn test_malformed_mtl() {
        let result = parse_mtl_xml("<LANDSAT_METADATA_FILE><PRODUCT_CONTENTS/></LANDSAT_METADATA_FILE>");
        assert!(matches!(result, Err(TerraError::XmlParsing(_))));
    }
}
