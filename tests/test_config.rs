use std::io::Write;
use tempfile::NamedTempFile;
use terraheat::core::{Combination, QaFlag};
use terraheat::{Pipeline, PipelineConfig, TerraError};

const CONFIG_JSON: &str = r#"{
  "region": {
    "type": "polygon",
    "rings": [[[0.0, 0.0], [120.0, 0.0], [120.0, 90.0], [0.0, 90.0]]]
  },
  "area_name": "Riverside",
  "years": [2019, 2024],
  "zonal": {"scale": 60.0, "max_pixels": 5000},
  "parallel_years": false,
  "workflows": [
    {
      "name": "summer_heat",
      "window": {"start_suffix": "-06-01", "end_suffix": "-09-01"},
      "cloud_cover_max": 10.0,
      "mask": {"flags": ["Cloud", "CloudShadow"], "combination": "AllClear"},
      "products": [
        {
          "index": "Lst",
          "composite": {
            "description": "LST_Summer_{year}_{area}",
            "folder": "lst",
            "layer": "LST_{year}",
            "vis": {"min": 20.0, "max": 55.0, "palette": ["blue", "red"]}
          },
          "anomaly": {
            "description": "UHI_Summer_{year}_{area}",
            "folder": "uhi",
            "layer": "UHI_{year}",
            "vis": {"min": -5.0, "max": 10.0}
          }
        }
      ]
    }
  ]
}"#;

#[test]
fn test_load_config_from_file() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(CONFIG_JSON.as_bytes()).unwrap();

    let config = PipelineConfig::from_file(file.path()).unwrap();
    assert_eq!(config.area_name, "Riverside");
    assert_eq!(config.years, vec![2019, 2024]);
    assert_eq!(config.zonal.max_pixels, 5000);
    assert!(!config.parallel_years);

    let workflow = &config.workflows[0];
    assert_eq!(workflow.mask.flags, vec![QaFlag::Cloud, QaFlag::CloudShadow]);
    assert_eq!(workflow.mask.combination, Combination::AllClear);
    let anomaly = workflow.products[0].anomaly.as_ref().unwrap();
    assert_eq!(anomaly.description_for(2024, &config.area_name), "UHI_Summer_2024_Riverside");
    assert!(anomaly.vis.palette.is_empty());

    let window = workflow.window.for_year(2019).unwrap();
    assert_eq!(window.to_string(), "2019-06-01 to 2019-09-01");

    let pipeline = Pipeline::new(config).unwrap();
    assert!(pipeline.region().contains_point(60.0, 45.0));
}

#[test]
fn test_invalid_config_fails_before_running() {
    let json = CONFIG_JSON.replace("\"-09-01\"", "\"-05-01\"");
    let config = PipelineConfig::from_json_str(&json).unwrap();
    assert!(matches!(Pipeline::new(config), Err(TerraError::InvalidConfiguration(_))));

    let json = CONFIG_JSON.replace("\"cloud_cover_max\": 10.0", "\"cloud_cover_max\": 150.0");
    let config = PipelineConfig::from_json_str(&json).unwrap();
    assert!(matches!(Pipeline::new(config), Err(TerraError::InvalidConfiguration(_))));
}

#[test]
fn test_missing_config_file() {
    let result = PipelineConfig::from_file("/nonexistent/terraheat.json");
    assert!(matches!(result, Err(TerraError::Io(_))));
}

#[test]
fn test_polygon_rings_after_the_first_are_holes() {
    let json = CONFIG_JSON.replace(
        "[[[0.0, 0.0], [120.0, 0.0], [120.0, 90.0], [0.0, 90.0]]]",
        "[[[0.0, 0.0], [120.0, 0.0], [120.0, 90.0], [0.0, 90.0]], [[30.0, 30.0], [90.0, 30.0], [90.0, 60.0], [30.0, 60.0]]]",
    );
    let pipeline = Pipeline::new(PipelineConfig::from_json_str(&json).unwrap()).unwrap();

    assert!(pipeline.region().contains_point(10.0, 10.0));
    assert!(!pipeline.region().contains_point(60.0, 45.0));
}
