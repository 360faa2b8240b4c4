// Copyright 2016 The Cartographer Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! PDAL pipeline descriptors and the parsing of `pdal info` output.

use crate::errors::*;
use crate::tileset::ValueRange;
use error_chain::bail;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_PREVIEW_MAX_POINTS: u64 = 500_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Stage {
    #[serde(rename = "readers.las")]
    ReadLas { filename: String },
    #[serde(rename = "filters.colorization")]
    Colorization { raster: String },
    #[serde(rename = "filters.sample")]
    Sample { radius: f64 },
    #[serde(rename = "filters.reprojection")]
    Reprojection {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        in_srs: Option<String>,
        out_srs: String,
        error_on_failure: bool,
    },
    #[serde(rename = "filters.assign")]
    Assign { assignment: String },
    #[serde(rename = "filters.elm")]
    Elm,
    #[serde(rename = "filters.outlier")]
    Outlier,
    #[serde(rename = "filters.smrf")]
    Smrf { ignore: String },
    #[serde(rename = "filters.decimation")]
    Decimation { step: u64 },
    #[serde(rename = "filters.transformation")]
    Transformation { matrix: String },
    #[serde(rename = "writers.las")]
    WriteLas {
        filename: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        a_srs: Option<String>,
        compression: bool,
    },
    #[serde(rename = "writers.text")]
    WriteText {
        filename: String,
        format: String,
        order: String,
        keep_unspecified: bool,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Options of the LAS processing command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessParams {
    /// Raster in the data directory used to colorize the points.
    pub raster_file: Option<String>,
    pub output_name: Option<String>,
    pub crs_in: Option<String>,
    /// Defaults to `crs_in`.
    pub crs_out: Option<String>,
    pub ground_classification: bool,
    pub sample_radius: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreviewParams {
    pub max_points: u64,
}

impl Default for PreviewParams {
    fn default() -> Self {
        PreviewParams {
            max_points: DEFAULT_PREVIEW_MAX_POINTS,
        }
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub fn process_pipeline(
    input: &Path,
    output: &Path,
    raster: Option<&Path>,
    params: &ProcessParams,
) -> Pipeline {
    let mut stages = vec![Stage::ReadLas {
        filename: path_string(input),
    }];
    if let Some(raster) = raster {
        stages.push(Stage::Colorization {
            raster: path_string(raster),
        });
    }
    if let Some(radius) = params.sample_radius.filter(|r| *r > 0.) {
        stages.push(Stage::Sample { radius });
    }
    let crs_out = params.crs_out.clone().or_else(|| params.crs_in.clone());
    if let Some(out_srs) = &crs_out {
        if params.crs_in.as_ref() != Some(out_srs) {
            stages.push(Stage::Reprojection {
                in_srs: params.crs_in.clone(),
                out_srs: out_srs.clone(),
                error_on_failure: true,
            });
        }
    }
    if params.ground_classification {
        stages.push(Stage::Assign {
            assignment: "Classification[:]=0".to_string(),
        });
        stages.push(Stage::Elm);
        stages.push(Stage::Outlier);
        stages.push(Stage::Smrf {
            ignore: "Classification[7:7]".to_string(),
        });
    }
    stages.push(Stage::WriteLas {
        filename: path_string(output),
        a_srs: crs_out,
        compression: true,
    });
    Pipeline { stages }
}

/// Number of points to skip so that at most `max_points` remain.
pub fn decimation_step(count: u64, max_points: u64) -> u64 {
    if max_points == 0 || count <= max_points {
        1
    } else {
        (count + max_points - 1) / max_points
    }
}

/// Writes a decimated copy of the cloud as CSV with colors, the input of the
/// surface reconstruction. With `offset`, points are translated by `-offset`.
pub fn preview_pipeline(
    input: &Path,
    output: &Path,
    count: u64,
    params: &PreviewParams,
    offset: Option<[f64; 3]>,
) -> Pipeline {
    let mut stages = vec![Stage::ReadLas {
        filename: path_string(input),
    }];
    let step = decimation_step(count, params.max_points);
    if step > 1 {
        stages.push(Stage::Decimation { step });
    }
    if let Some([x, y, z]) = offset {
        stages.push(Stage::Transformation {
            matrix: format!("1 0 0 {} 0 1 0 {} 0 0 1 {} 0 0 0 1", -x, -y, -z),
        });
    }
    stages.push(Stage::WriteText {
        filename: path_string(output),
        format: "csv".to_string(),
        order: "X,Y,Z,Red,Green,Blue".to_string(),
        keep_unspecified: false,
    });
    Pipeline { stages }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointCloudMetadata {
    pub count: u64,
    pub horizontal_srs: JsonValue,
    pub vertical_srs: JsonValue,
}

/// Parses the output of `pdal info --metadata`.
pub fn parse_metadata(json: &str) -> Result<PointCloudMetadata> {
    let value: JsonValue =
        serde_json::from_str(json).chain_err(|| "Could not parse point cloud metadata")?;
    let metadata = &value["metadata"];
    let count = match metadata["count"].as_u64() {
        Some(count) => count,
        None => bail!(ErrorKind::InvalidInput(
            "point cloud metadata has no point count".to_string()
        )),
    };
    let srs = &metadata["srs"];
    let or_empty = |value: &JsonValue| match value {
        JsonValue::Null => JsonValue::Object(Default::default()),
        other => other.clone(),
    };
    Ok(PointCloudMetadata {
        count,
        horizontal_srs: or_empty(&srs["horizontal"]),
        vertical_srs: or_empty(&srs["vertical"]),
    })
}

/// Parses the dimension ranges of `pdal info --stats`.
pub fn parse_statistics(json: &str) -> Result<BTreeMap<String, ValueRange>> {
    let value: JsonValue =
        serde_json::from_str(json).chain_err(|| "Could not parse point cloud statistics")?;
    let statistics = match value["stats"]["statistic"].as_array() {
        Some(statistics) => statistics,
        None => bail!(ErrorKind::InvalidInput(
            "point cloud statistics are missing".to_string()
        )),
    };
    Ok(statistics
        .iter()
        .filter_map(|dimension| {
            let name = dimension["name"].as_str()?;
            Some((
                name.to_string(),
                ValueRange {
                    minimum: dimension["minimum"].as_f64(),
                    maximum: dimension["maximum"].as_f64(),
                },
            ))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_process_pipeline() {
        let pipeline = process_pipeline(
            Path::new("data/in.las"),
            Path::new("data/out.las"),
            None,
            &ProcessParams::default(),
        );
        assert_eq!(
            json!([
                {"type": "readers.las", "filename": "data/in.las"},
                {"type": "writers.las", "filename": "data/out.las", "compression": true}
            ]),
            serde_json::to_value(&pipeline).unwrap()
        );
    }

    #[test]
    fn test_full_process_pipeline() {
        let params = ProcessParams {
            raster_file: Some("ortho.tif".to_string()),
            output_name: Some("processed".to_string()),
            crs_in: Some("EPSG:6707".to_string()),
            crs_out: Some("EPSG:4326".to_string()),
            ground_classification: true,
            sample_radius: Some(0.5),
        };
        let pipeline = process_pipeline(
            Path::new("in.las"),
            Path::new("out.las"),
            Some(Path::new("ortho.tif")),
            &params,
        );
        let types: Vec<JsonValue> = serde_json::to_value(&pipeline)
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|stage| stage["type"].clone())
            .collect();
        assert_eq!(
            vec![
                "readers.las", "filters.colorization", "filters.sample", "filters.reprojection",
                "filters.assign", "filters.elm", "filters.outlier", "filters.smrf", "writers.las"
            ],
            types
        );
        let value = serde_json::to_value(&pipeline).unwrap();
        assert_eq!(
            json!({"type": "filters.reprojection", "in_srs": "EPSG:6707", "out_srs": "EPSG:4326", "error_on_failure": true}),
            value[3]
        );
        assert_eq!(json!("Classification[:]=0"), value[4]["assignment"]);
        assert_eq!(json!("Classification[7:7]"), value[7]["ignore"]);
        assert_eq!(json!("EPSG:4326"), value[8]["a_srs"]);
    }

    #[test]
    fn test_same_crs_is_not_reprojected() {
        let params = ProcessParams {
            crs_in: Some("EPSG:6707".to_string()),
            ..Default::default()
        };
        let pipeline = process_pipeline(Path::new("a.las"), Path::new("b.las"), None, &params);
        assert_eq!(2, pipeline.stages.len());
        assert_eq!(
            Stage::WriteLas {
                filename: "b.las".to_string(),
                a_srs: Some("EPSG:6707".to_string()),
                compression: true,
            },
            pipeline.stages[1]
        );
    }

    #[test]
    fn test_decimation_step() {
        assert_eq!(1, decimation_step(10, 500_000));
        assert_eq!(1, decimation_step(500_000, 500_000));
        assert_eq!(2, decimation_step(500_001, 500_000));
        assert_eq!(3, decimation_step(1_200_000, 500_000));
    }

    #[test]
    fn test_preview_pipeline() {
        let pipeline = preview_pipeline(
            Path::new("in.las"),
            Path::new("tmp/preview.xyz"),
            2_000_000,
            &PreviewParams::default(),
            Some([100., 200., 0.]),
        );
        assert_eq!(Stage::Decimation { step: 4 }, pipeline.stages[1]);
        assert_eq!(
            Stage::Transformation {
                matrix: "1 0 0 -100 0 1 0 -200 0 0 1 -0 0 0 0 1".to_string()
            },
            pipeline.stages[2]
        );
        let value = serde_json::to_value(&pipeline).unwrap();
        assert_eq!(json!("writers.text"), value[3]["type"]);
        assert_eq!(json!("X,Y,Z,Red,Green,Blue"), value[3]["order"]);

        let small = preview_pipeline(Path::new("in.las"), Path::new("out.xyz"), 10, &PreviewParams::default(), None);
        assert_eq!(2, small.stages.len());
    }

    #[test]
    fn test_parse_metadata() {
        let output = r#"{
            "filename": "cloud.las",
            "metadata": {
                "count": 1065,
                "srs": {"horizontal": "PROJCS[\"RDN2008\"]", "vertical": ""}
            }
        }"#;
        let metadata = parse_metadata(output).unwrap();
        assert_eq!(1065, metadata.count);
        assert_eq!(json!("PROJCS[\"RDN2008\"]"), metadata.horizontal_srs);
        assert_eq!(json!(""), metadata.vertical_srs);

        let without_srs = parse_metadata(r#"{"metadata": {"count": 3}}"#).unwrap();
        assert_eq!(json!({}), without_srs.horizontal_srs);

        assert!(parse_metadata(r#"{"metadata": {}}"#).is_err());
        assert!(parse_metadata("not json").is_err());
    }

    #[test]
    fn test_parse_statistics() {
        let output = r#"{"stats": {"statistic": [
            {"name": "X", "minimum": 1.5, "maximum": 3.0},
            {"name": "Classification", "minimum": 1, "maximum": 6}
        ]}}"#;
        let ranges = parse_statistics(output).unwrap();
        assert_eq!(
            ValueRange {
                minimum: Some(1.),
                maximum: Some(6.)
            },
            ranges["Classification"]
        );
        assert_eq!(2, ranges.len());
        assert!(parse_statistics("{}").is_err());
    }
}
