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

//! Configurations of the build commands. Per feature parameters are
//! expressions, resolved once per feature into typed options.

use crate::expression::Expression;
use crate::feature::Feature;
use crate::instances::InstanceOptions;
use crate::pdal::PreviewParams;
use crate::polyhedron::GeometryOptions;
use crate::tileset::DEFAULT_GEOMETRIC_ERRORS;
use crate::tools::{
    I3dmParams, MeshTilerParams, Pg2b3dmParams, Py3dtilesParams, ReconstructionParams,
};
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeometryExpressions {
    pub lower_limit: Option<Expression>,
    pub upper_limit: Option<Expression>,
    pub translate_z: Option<Expression>,
    pub width: Option<Expression>,
    pub remove_bottom_surface: bool,
}

fn number(expression: &Option<Expression>, feature: &Feature) -> Option<f64> {
    expression.as_ref().and_then(|e| e.number(feature))
}

impl GeometryExpressions {
    pub fn options(&self, feature: &Feature) -> GeometryOptions {
        GeometryOptions {
            lower_limit: number(&self.lower_limit, feature),
            upper_limit: number(&self.upper_limit, feature),
            translate_z: number(&self.translate_z, feature),
            width: number(&self.width, feature),
            remove_bottom_surface: self.remove_bottom_surface,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InstanceExpressions {
    pub scale: Option<Expression>,
    /// Degrees.
    pub rotation: Option<Expression>,
    pub translate_z: Option<Expression>,
    pub model: Option<Expression>,
}

impl InstanceExpressions {
    pub fn options(&self, feature: &Feature) -> InstanceOptions {
        InstanceOptions {
            scale: number(&self.scale, feature),
            rotation: number(&self.rotation, feature),
            translate_z: number(&self.translate_z, feature),
            model: self.model.as_ref().and_then(|e| e.text(feature)),
        }
    }
}

/// `mesh:tileset`: extruded vector features tiled by pg2b3dm.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MeshTilesetConfig {
    pub name: Option<String>,
    #[serde(flatten)]
    pub geometry: GeometryExpressions,
    #[serde(flatten)]
    pub tiler: Pg2b3dmParams,
}

/// `point-instance:tileset`: one model instance per feature, tiled by
/// i3dm.export.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PointInstanceTilesetConfig {
    pub name: Option<String>,
    #[serde(flatten)]
    pub instances: InstanceExpressions,
    #[serde(flatten)]
    pub tiler: I3dmParams,
}

/// `point-cloud:tileset`: LAS tiled by py3dtiles.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PointCloudTilesetConfig {
    pub name: Option<String>,
    #[serde(flatten)]
    pub tiler: Py3dtilesParams,
    /// Factor applied to every geometric error of the generated tileset.
    pub geometric_error_scale: Option<f64>,
}

/// `reconstructed-mesh:tileset`: a surface reconstructed from a point
/// cloud, split into a quadtree pyramid by the mesh tiler.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconstructedMeshConfig {
    pub name: Option<String>,
    /// CRS of the point cloud, see `math::parse_projection`.
    pub crs: String,
    /// Texture in the data directory.
    pub image: Option<String>,
    /// Points are moved by `-origin` before reconstruction.
    pub origin: Option<[f64; 3]>,
    pub z_offset: f64,
    pub scale: f64,
    pub geometric_errors: Vec<f64>,
    pub preview: Option<PreviewParams>,
    pub reconstruction: Option<ReconstructionParams>,
    pub mesh_tiler: Option<MeshTilerParams>,
}

impl Default for ReconstructedMeshConfig {
    fn default() -> Self {
        ReconstructedMeshConfig {
            name: None,
            crs: "EPSG:4326".to_string(),
            image: None,
            origin: None,
            z_offset: 0.,
            scale: 1.,
            geometric_errors: DEFAULT_GEOMETRIC_ERRORS.to_vec(),
            preview: None,
            reconstruction: None,
            mesh_tiler: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Geometry, Position};
    use serde_json::json;

    fn building() -> Feature {
        let ring = vec![
            Position::new(0., 0., Some(2.)),
            Position::new(1., 0., Some(4.)),
            Position::new(1., 1., Some(4.)),
            Position::new(0., 0., Some(2.)),
        ];
        Feature::new(
            Geometry::Polygon(vec![ring]),
            json!({"height": 12, "species": "Oak"}).as_object().cloned().unwrap(),
        )
    }

    #[test]
    fn test_mesh_config() {
        let config: MeshTilesetConfig = serde_json::from_value(json!({
            "name": "buildings",
            "lowerLimit": ["func", "$minZ"],
            "upperLimit": {"formula": "$minZ + height"},
            "width": 3,
            "doubleSided": true,
            "maxFeaturesPerTile": 50
        }))
        .unwrap();
        assert_eq!(Some("buildings".to_string()), config.name);
        assert!(config.tiler.double_sided);
        assert_eq!(50, config.tiler.max_features_per_tile);
        assert_eq!(250., config.tiler.max_geometric_error);

        let options = config.geometry.options(&building());
        assert_eq!(Some(2.), options.lower_limit);
        assert_eq!(Some(14.), options.upper_limit);
        assert_eq!(Some(3.), options.width);
        assert_eq!(None, options.translate_z);
    }

    #[test]
    fn test_instance_config() {
        let config: PointInstanceTilesetConfig = serde_json::from_value(json!({
            "scale": ["/", ["property", "height"], 4],
            "rotation": 45,
            "model": ["concat", ["lowercase", ["property", "species"]], ".glb"],
            "maxGeometricError": 1000
        }))
        .unwrap();
        let options = config.instances.options(&building());
        assert_eq!(Some(3.), options.scale);
        assert_eq!(Some(45.), options.rotation);
        assert_eq!(Some("oak.glb".to_string()), options.model);
        assert_eq!(1000., config.tiler.max_geometric_error);
        assert_eq!(1000, config.tiler.max_features_per_tile);
    }

    #[test]
    fn test_empty_configs() {
        let config: MeshTilesetConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(GeometryOptions::default(), config.geometry.options(&building()));

        let config: ReconstructedMeshConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!("EPSG:4326", config.crs);
        assert_eq!(DEFAULT_GEOMETRIC_ERRORS.to_vec(), config.geometric_errors);

        let config: PointCloudTilesetConfig =
            serde_json::from_value(json!({"crsIn": "EPSG:6707", "geometricErrorScale": 0.5}))
                .unwrap();
        assert_eq!(Some("EPSG:6707".to_string()), config.tiler.crs_in);
        assert!(config.tiler.classification);
        assert_eq!(Some(0.5), config.geometric_error_scale);
    }
}
