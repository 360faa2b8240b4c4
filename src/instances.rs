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

use crate::feature::{Feature, FeatureCollection};
use crate::math::to_ecef;
use fnv::FnvHashSet;
use log::warn;
use nalgebra::Point3;
use rayon::prelude::*;
use serde_json::Value;

pub const DEFAULT_MODEL: &str = "model.glb";

/// Per feature parameters of an instance. Rotation is in degrees.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceOptions {
    pub scale: Option<f64>,
    pub rotation: Option<f64>,
    pub model: Option<String>,
    pub translate_z: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointInstance {
    /// Longitude, latitude in degrees and height in meters, after translation.
    pub position: Point3<f64>,
    pub ecef: Point3<f64>,
    /// Yaw in radians.
    pub rotation: f64,
    pub scale: f64,
    pub model: String,
    /// Attribute keys normalized to lowercase with spaces replaced by `_`.
    pub tags: Vec<(String, Value)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Instances {
    pub features: Vec<PointInstance>,
    /// Every referenced model once, in order of first use.
    pub models: Vec<String>,
}

impl Instances {
    /// Instances grouped by model, one batch per entry of `models`.
    pub fn batches(&self) -> Vec<(&str, Vec<&PointInstance>)> {
        self.models
            .iter()
            .map(|model| {
                let members = self
                    .features
                    .iter()
                    .filter(|instance| &instance.model == model)
                    .collect();
                (model.as_str(), members)
            })
            .collect()
    }
}

pub fn tag_name(key: &str) -> String {
    key.replace(' ', "_").to_lowercase()
}

/// The instance of a single feature, `None` if its geometry has no position.
pub fn instance(feature: &Feature, options: &InstanceOptions) -> Option<PointInstance> {
    let position = feature.geometry.first_position()?;
    let height = position.z.unwrap_or(0.) + options.translate_z.unwrap_or(0.);
    let scale = options.scale.filter(|s| s.is_finite()).unwrap_or(1.);
    let rotation = options.rotation.filter(|r| r.is_finite()).unwrap_or(0.);
    Some(PointInstance {
        position: Point3::new(position.x, position.y, height),
        ecef: to_ecef(position.x, position.y, height),
        rotation: rotation.to_radians(),
        scale,
        model: options
            .model
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        tags: feature
            .properties
            .iter()
            .map(|(key, value)| (tag_name(key), value.clone()))
            .collect(),
    })
}

/// One instance per feature. Non-point geometries are placed at their first
/// position, features without any position are skipped.
pub fn build<F>(collection: &FeatureCollection, compute_options: F) -> Instances
where
    F: Fn(&Feature) -> InstanceOptions + Sync,
{
    let features: Vec<PointInstance> = collection
        .features
        .par_iter()
        .enumerate()
        .filter_map(|(i, feature)| {
            let instance = instance(feature, &compute_options(feature));
            if instance.is_none() {
                warn!("Skipping feature {} without position", i);
            }
            instance
        })
        .collect();
    let mut seen = FnvHashSet::default();
    let models = features
        .iter()
        .filter(|instance| seen.insert(instance.model.clone()))
        .map(|instance| instance.model.clone())
        .collect();
    Instances { features, models }
}
