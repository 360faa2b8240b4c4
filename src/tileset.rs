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

//! Tileset descriptors for quadtree mesh pyramids, and patching of the
//! descriptors that external tilers write.
//!
//! A pyramid of depth `d` consists of files `{level}_{y}_{x}.glb` for
//! `level <= d`, described by an `info.json` with the extent of the level 0
//! tile. Tiles that were never rendered are simply missing on disk.

use crate::errors::*;
use crate::math::{enu_to_ecef_transform, to_column_major, Projection};
use error_chain::bail;
use nalgebra::Point2;
use quadtree::{Rect, Tile};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

pub const DEFAULT_GEOMETRIC_ERRORS: [f64; 5] = [200., 100., 20., 5., 0.];
pub const TILESET_FILE_NAME: &str = "tileset.json";
pub const INFO_FILE_NAME: &str = "info.json";

/// Description of a rendered mesh pyramid, as written by the mesh tiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileInfo {
    /// Width, height and depth of the level 0 tile in CRS units.
    pub size: [f64; 3],
    pub depth: u8,
    pub center: [f64; 3],
}

impl TileInfo {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).chain_err(|| format!("Could not open {}", path.display()))?;
        let info = serde_json::from_reader(BufReader::new(file))
            .chain_err(|| format!("Could not parse {}", path.display()))?;
        Ok(info)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TilesetOptions {
    /// Geometric error per level, non-increasing.
    pub geometric_errors: Vec<f64>,
    pub z_offset: f64,
    /// Added to the center of `TileInfo`, for tilers that write centers
    /// relative to an origin.
    pub origin: [f64; 3],
    pub scale: f64,
    pub content_extension: String,
    pub asset_version: String,
}

impl Default for TilesetOptions {
    fn default() -> Self {
        TilesetOptions {
            geometric_errors: DEFAULT_GEOMETRIC_ERRORS.to_vec(),
            z_offset: 0.,
            origin: [0.; 3],
            scale: 1.,
            content_extension: "glb".to_string(),
            asset_version: "1.1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Refine {
    #[serde(rename = "REPLACE")]
    Replace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingVolume {
    /// West, south, east, north in radians, minimum and maximum height in meters.
    pub region: [f64; 6],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileNode {
    pub bounding_volume: BoundingVolume,
    pub geometric_error: f64,
    pub refine: Refine,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<[f64; 16]>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TileNode>,
}

impl TileNode {
    /// This node and all its descendants, depth first.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &TileNode> + '_> {
        Box::new(std::iter::once(self).chain(self.children.iter().flat_map(|c| c.iter())))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tileset {
    pub asset: Asset,
    pub geometric_error: f64,
    pub root: TileNode,
}

impl Tileset {
    pub fn write(&self, path: &Path) -> Result<()> {
        let file =
            File::create(path).chain_err(|| format!("Could not create {}", path.display()))?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }
}

/// Geometric errors must be finite and non-increasing with depth.
pub fn check_geometric_errors(errors: &[f64]) -> Result<()> {
    if errors.is_empty()
        || errors.iter().any(|e| !e.is_finite())
        || errors.windows(2).any(|w| w[1] > w[0])
    {
        bail!(ErrorKind::InvalidGeometricErrors(errors.to_vec()));
    }
    Ok(())
}

/// Answers whether the content of a tile was rendered.
pub trait ContentProbe {
    fn has_content(&self, uri: &str) -> bool;
}

impl<F> ContentProbe for F
where
    F: Fn(&str) -> bool,
{
    fn has_content(&self, uri: &str) -> bool {
        self(uri)
    }
}

/// Looks for content files next to the tileset.
#[derive(Debug, Clone)]
pub struct DirectoryProbe {
    pub directory: PathBuf,
}

impl ContentProbe for DirectoryProbe {
    fn has_content(&self, uri: &str) -> bool {
        self.directory.join(uri).exists()
    }
}

pub struct TileQuadtreeBuilder {
    info: TileInfo,
    options: TilesetOptions,
    projection: Box<dyn Projection>,
}

impl TileQuadtreeBuilder {
    pub fn new(
        info: TileInfo,
        options: TilesetOptions,
        projection: Box<dyn Projection>,
    ) -> Result<Self> {
        check_geometric_errors(&options.geometric_errors)?;
        Ok(TileQuadtreeBuilder {
            info,
            options,
            projection,
        })
    }

    fn center(&self) -> [f64; 3] {
        let c = self.info.center;
        let o = self.options.origin;
        [c[0] + o[0], c[1] + o[1], c[2] + o[2]]
    }

    /// Error of the sequence at `index`, the last one for deeper levels.
    fn error_at(&self, index: usize) -> f64 {
        let errors = &self.options.geometric_errors;
        errors[index.min(errors.len() - 1)]
    }

    pub fn root_tile(&self) -> Tile {
        let center = self.center();
        Tile::root_with_bounding_rect(Rect::from_center(
            Point2::new(center[0], center[1]),
            self.info.size[0],
            self.info.size[1],
        ))
    }

    pub fn content_uri(&self, tile: &Tile) -> String {
        tile.id.content_name(&self.options.content_extension)
    }

    pub fn region(&self, rect: &Rect) -> [f64; 6] {
        let (west, south) = self.projection.to_geodetic(rect.min().x, rect.min().y);
        let (east, north) = self.projection.to_geodetic(rect.max().x, rect.max().y);
        let center_z = self.center()[2] + self.options.z_offset;
        let half_depth = self.info.size[2] / 2.;
        [
            west.to_radians(),
            south.to_radians(),
            east.to_radians(),
            north.to_radians(),
            center_z - half_depth,
            center_z + half_depth,
        ]
    }

    /// The ECEF placement of the whole pyramid, column-major.
    pub fn root_transform(&self) -> [f64; 16] {
        let center = self.center();
        let (longitude, latitude) = self.projection.to_geodetic(center[0], center[1]);
        to_column_major(&enu_to_ecef_transform(
            longitude,
            latitude,
            center[2] + self.options.z_offset,
            self.options.scale,
        ))
    }

    /// The node of a single tile, without children.
    pub fn leaf(&self, tile: &Tile) -> TileNode {
        TileNode {
            bounding_volume: BoundingVolume {
                region: self.region(&tile.bounding_rect),
            },
            geometric_error: self.error_at(usize::from(tile.level()) + 1),
            refine: Refine::Replace,
            content: Some(Content {
                uri: self.content_uri(tile),
            }),
            transform: None,
            children: Vec::new(),
        }
    }

    fn quad(&self, tile: &Tile, probe: &dyn ContentProbe) -> TileNode {
        let mut node = self.leaf(tile);
        if tile.level() < self.info.depth {
            node.children = tile
                .children()
                .filter(|child| probe.has_content(&self.content_uri(child)))
                .map(|child| self.quad(&child, probe))
                .collect();
        }
        node
    }

    pub fn build(&self, probe: &dyn ContentProbe) -> Tileset {
        let root_tile = self.root_tile();
        let mut leaf = self.quad(&root_tile, probe);
        if !probe.has_content(&self.content_uri(&root_tile)) {
            leaf.content = None;
        }
        let transform = Some(self.root_transform());
        let root = if leaf.children.is_empty() {
            leaf.transform = transform;
            leaf
        } else {
            TileNode {
                bounding_volume: leaf.bounding_volume.clone(),
                geometric_error: self.error_at(0),
                refine: Refine::Replace,
                content: None,
                transform,
                children: vec![leaf],
            }
        };
        Tileset {
            asset: Asset {
                version: self.options.asset_version.clone(),
            },
            geometric_error: self.error_at(0),
            root,
        }
    }
}

/// Value range of a tile attribute. Text attributes have neither bound.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

/// Multiplies every `geometricError` in the descriptor by `factor`.
pub fn scale_geometric_errors(tileset: &mut JsonValue, factor: f64) {
    match tileset {
        JsonValue::Object(map) => {
            for (key, value) in map.iter_mut() {
                match (key.as_str(), value.as_f64()) {
                    ("geometricError", Some(error)) => *value = JsonValue::from(error * factor),
                    _ => scale_geometric_errors(value, factor),
                }
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                scale_geometric_errors(item, factor);
            }
        }
        _ => (),
    }
}

/// Replaces the top-level `properties` map of the descriptor.
pub fn set_properties(tileset: &mut JsonValue, properties: &BTreeMap<String, ValueRange>) -> Result<()> {
    match tileset {
        JsonValue::Object(map) => {
            map.insert("properties".to_string(), serde_json::to_value(properties)?);
            Ok(())
        }
        _ => bail!(ErrorKind::InvalidInput(
            "tileset descriptor is not a JSON object".to_string()
        )),
    }
}

/// Reads the descriptor at `path`, lets `patch` modify it and writes it back.
pub fn patch_tileset_file<F>(path: &Path, patch: F) -> Result<()>
where
    F: FnOnce(&mut JsonValue) -> Result<()>,
{
    let mut tileset: JsonValue = {
        let file = File::open(path).chain_err(|| format!("Could not open {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .chain_err(|| format!("Could not parse {}", path.display()))?
    };
    patch(&mut tileset)?;
    let file = File::create(path).chain_err(|| format!("Could not write {}", path.display()))?;
    serde_json::to_writer(BufWriter::new(file), &tileset)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Wgs84;
    use approx::assert_abs_diff_eq;
    use serde_json::json;
    use std::collections::HashSet;
    use tempdir::TempDir;

    fn info(depth: u8) -> TileInfo {
        TileInfo {
            size: [0.02, 0.01, 20.],
            depth,
            center: [11., 43., 10.],
        }
    }

    fn builder(depth: u8) -> TileQuadtreeBuilder {
        TileQuadtreeBuilder::new(info(depth), TilesetOptions::default(), Box::new(Wgs84)).unwrap()
    }

    fn all_uris(depth: u8) -> HashSet<String> {
        let mut uris = HashSet::new();
        for level in 0..=depth {
            for y in 0..(1u64 << level) {
                for x in 0..(1u64 << level) {
                    uris.insert(format!("{}_{}_{}.glb", level, y, x));
                }
            }
        }
        uris
    }

    fn check_monotonic(node: &TileNode) {
        for child in &node.children {
            assert!(child.geometric_error <= node.geometric_error);
            check_monotonic(child);
        }
    }

    #[test]
    fn test_full_pyramid() {
        let uris = all_uris(3);
        let tileset = builder(3).build(&|uri: &str| uris.contains(uri));
        check_monotonic(&tileset.root);

        let contents: HashSet<String> = tileset
            .root
            .iter()
            .filter_map(|n| n.content.as_ref().map(|c| c.uri.clone()))
            .collect();
        assert_eq!(uris, contents);

        // Wrapper with the transform, then the level 0 tile.
        assert_eq!(200., tileset.root.geometric_error);
        assert!(tileset.root.transform.is_some());
        assert!(tileset.root.content.is_none());
        let level0 = &tileset.root.children[0];
        assert_eq!(100., level0.geometric_error);
        assert!(level0.transform.is_none());
        assert_eq!(4, level0.children.len());
        let leaf = &level0.children[0].children[0].children[0];
        assert_eq!("3_0_0.glb", leaf.content.as_ref().unwrap().uri);
        assert_eq!(0., leaf.geometric_error);
        assert!(leaf.children.is_empty());
    }

    #[test]
    fn test_missing_content_is_pruned() {
        let dir = TempDir::new("tileset").unwrap();
        for name in &["0_0_0.glb", "1_0_0.glb", "1_1_1.glb", "2_0_1.glb", "2_3_3.glb", "2_2_0.glb"] {
            File::create(dir.path().join(name)).unwrap();
        }
        let probe = DirectoryProbe {
            directory: dir.path().to_path_buf(),
        };
        let tileset = builder(2).build(&probe);
        check_monotonic(&tileset.root);

        let mut contents: Vec<String> = tileset
            .root
            .iter()
            .filter_map(|n| n.content.as_ref().map(|c| c.uri.clone()))
            .collect();
        contents.sort();
        // 2_2_0 exists but its parent 1_1_0 was never rendered.
        assert_eq!(
            vec!["0_0_0.glb", "1_0_0.glb", "1_1_1.glb", "2_0_1.glb", "2_3_3.glb"],
            contents
        );
        for node in tileset.root.iter() {
            if let Some(content) = &node.content {
                assert!(dir.path().join(&content.uri).exists());
            }
        }
    }

    #[test]
    fn test_root_without_children_collapses() {
        let uris = all_uris(0);
        let tileset = builder(2).build(&|uri: &str| uris.contains(uri));
        let root = &tileset.root;
        assert!(root.children.is_empty());
        assert!(root.transform.is_some());
        assert_eq!("0_0_0.glb", root.content.as_ref().unwrap().uri);
        assert_eq!(100., root.geometric_error);
    }

    #[test]
    fn test_regions() {
        let options = TilesetOptions {
            z_offset: 5.,
            ..Default::default()
        };
        let builder = TileQuadtreeBuilder::new(info(1), options, Box::new(Wgs84)).unwrap();
        let root = builder.root_tile();
        let region = builder.region(&root.bounding_rect);
        assert_abs_diff_eq!(region[0], 10.99f64.to_radians(), epsilon = 1e-12);
        assert_abs_diff_eq!(region[1], 42.995f64.to_radians(), epsilon = 1e-12);
        assert_abs_diff_eq!(region[2], 11.01f64.to_radians(), epsilon = 1e-12);
        assert_abs_diff_eq!(region[3], 43.005f64.to_radians(), epsilon = 1e-12);
        assert_abs_diff_eq!(region[4], 5.);
        assert_abs_diff_eq!(region[5], 25.);

        // The north-east child covers the upper right quadrant.
        let north_east = root.children().nth(1).unwrap();
        assert_eq!("1_0_1", north_east.id.to_string());
        let region = builder.region(&north_east.bounding_rect);
        assert_abs_diff_eq!(region[0], 11f64.to_radians(), epsilon = 1e-12);
        assert_abs_diff_eq!(region[1], 43f64.to_radians(), epsilon = 1e-12);
    }

    #[test]
    fn test_deep_levels_reuse_last_error() {
        let uris = all_uris(6);
        let tileset = builder(6).build(&|uri: &str| uris.contains(uri));
        let deepest = tileset.root.iter().filter(|n| n.children.is_empty()).next().unwrap();
        assert_eq!(0., deepest.geometric_error);
        check_monotonic(&tileset.root);
    }

    #[test]
    fn test_invalid_errors_are_rejected() {
        for errors in vec![vec![], vec![10., 20.], vec![10., std::f64::NAN]] {
            let options = TilesetOptions {
                geometric_errors: errors,
                ..Default::default()
            };
            assert!(TileQuadtreeBuilder::new(info(1), options, Box::new(Wgs84)).is_err());
        }
    }

    #[test]
    fn test_serialization() {
        let uris = all_uris(1);
        let tileset = builder(1).build(&|uri: &str| uris.contains(uri));
        let value = serde_json::to_value(&tileset).unwrap();
        assert_eq!(json!("1.1"), value["asset"]["version"]);
        assert_eq!(json!("REPLACE"), value["root"]["refine"]);
        assert_eq!(16, value["root"]["transform"].as_array().unwrap().len());
        assert_eq!(6, value["root"]["boundingVolume"]["region"].as_array().unwrap().len());
        let leaf = &value["root"]["children"][0]["children"][0];
        assert_eq!(json!("1_0_0.glb"), leaf["content"]["uri"]);
        assert!(leaf.get("children").is_none());
        assert!(leaf.get("transform").is_none());

        let parsed: Tileset = serde_json::from_value(value).unwrap();
        assert_eq!(tileset, parsed);
    }

    #[test]
    fn test_patch_tileset_file() {
        let dir = TempDir::new("tileset").unwrap();
        let path = dir.path().join(TILESET_FILE_NAME);
        let original = json!({
            "asset": {"version": "1.0", "tilesetVersion": "py3dtiles"},
            "geometricError": 100.0,
            "root": {"geometricError": 50.0, "children": [{"geometricError": 10.0}]}
        });
        serde_json::to_writer(File::create(&path).unwrap(), &original).unwrap();

        let mut properties = BTreeMap::new();
        properties.insert(
            "Classification".to_string(),
            ValueRange {
                minimum: Some(0.),
                maximum: Some(255.),
            },
        );
        properties.insert("name".to_string(), ValueRange::default());
        patch_tileset_file(&path, |tileset| {
            scale_geometric_errors(tileset, 0.5);
            set_properties(tileset, &properties)
        })
        .unwrap();

        let patched: JsonValue = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(json!(50.0), patched["geometricError"]);
        assert_eq!(json!(25.0), patched["root"]["geometricError"]);
        assert_eq!(json!(5.0), patched["root"]["children"][0]["geometricError"]);
        assert_eq!(json!("py3dtiles"), patched["asset"]["tilesetVersion"]);
        assert_eq!(
            json!({"Classification": {"minimum": 0.0, "maximum": 255.0}, "name": {}}),
            patched["properties"]
        );
    }

    #[test]
    fn test_tile_info_from_path() {
        let dir = TempDir::new("tileset").unwrap();
        let path = dir.path().join(INFO_FILE_NAME);
        serde_json::to_writer(
            File::create(&path).unwrap(),
            &json!({"size": [10.0, 20.0, 5.0], "depth": 3, "center": [1.0, 2.0, 3.0]}),
        )
        .unwrap();
        assert_eq!(
            TileInfo {
                size: [10., 20., 5.],
                depth: 3,
                center: [1., 2., 3.],
            },
            TileInfo::from_path(&path).unwrap()
        );
    }
}
