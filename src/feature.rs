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

//! Vector features as loaded from GeoJSON files or zipped shapefiles.

use crate::errors::*;
use error_chain::bail;
use log::warn;
use serde_json::{Map, Value};
use shapefile::dbase::FieldValue;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

/// Extensions of the input files the workflows know how to handle.
pub const SUPPORTED_EXTENSIONS: [&str; 5] = [".geojson", ".json", ".zip", ".las", ".laz"];

/// A longitude/latitude position in degrees with an optional height in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Position {
    pub fn new(x: f64, y: f64, z: Option<f64>) -> Self {
        Position { x, y, z }
    }

    fn from_slice(coordinates: &[f64]) -> Result<Self> {
        match coordinates {
            [x, y] => Ok(Position::new(*x, *y, None)),
            [x, y, z, ..] => Ok(Position::new(*x, *y, Some(*z))),
            _ => bail!(ErrorKind::InvalidInput(format!(
                "a position needs at least two coordinates, got {:?}",
                coordinates
            ))),
        }
    }
}

pub type Ring = Vec<Position>;

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    /// Outer ring first, holes after.
    Polygon(Vec<Ring>),
    MultiPolygon(Vec<Vec<Ring>>),
}

impl Geometry {
    /// Iterates over every position of the geometry, holes included.
    pub fn positions<'a>(&'a self) -> Box<dyn Iterator<Item = &'a Position> + 'a> {
        match self {
            Geometry::Point(position) => Box::new(std::iter::once(position)),
            Geometry::MultiPoint(positions) | Geometry::LineString(positions) => {
                Box::new(positions.iter())
            }
            Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => {
                Box::new(lines.iter().flatten())
            }
            Geometry::MultiPolygon(polygons) => Box::new(polygons.iter().flatten().flatten()),
        }
    }

    pub fn first_position(&self) -> Option<&Position> {
        self.positions().next()
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::LineString(_) => "LineString",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
        }
    }

    fn from_geojson(value: &geojson::Value) -> Result<Option<Self>> {
        let positions = |line: &[Vec<f64>]| -> Result<Vec<Position>> {
            line.iter().map(|p| Position::from_slice(p)).collect()
        };
        let rings = |rings: &[Vec<Vec<f64>>]| -> Result<Vec<Ring>> {
            rings.iter().map(|r| positions(r.as_slice())).collect()
        };
        let geometry = match value {
            geojson::Value::Point(p) => Geometry::Point(Position::from_slice(p)?),
            geojson::Value::MultiPoint(p) => Geometry::MultiPoint(positions(p.as_slice())?),
            geojson::Value::LineString(l) => Geometry::LineString(positions(l.as_slice())?),
            geojson::Value::MultiLineString(l) => Geometry::MultiLineString(rings(l.as_slice())?),
            geojson::Value::Polygon(p) => Geometry::Polygon(rings(p.as_slice())?),
            geojson::Value::MultiPolygon(p) => Geometry::MultiPolygon(
                p.iter().map(|polygon| rings(polygon.as_slice())).collect::<Result<_>>()?,
            ),
            geojson::Value::GeometryCollection(_) => return Ok(None),
        };
        Ok(Some(geometry))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(geometry: Geometry, properties: Map<String, Value>) -> Self {
        Feature {
            geometry,
            properties,
        }
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Returns a copy of this feature with every Z value shifted by `dz`.
    /// Positions without Z are treated as being at 0.
    pub fn translated_z(&self, dz: f64) -> Feature {
        let shift = |p: &Position| Position::new(p.x, p.y, Some(p.z.unwrap_or(0.) + dz));
        let line = |l: &Vec<Position>| l.iter().map(shift).collect::<Vec<_>>();
        let geometry = match &self.geometry {
            Geometry::Point(p) => Geometry::Point(shift(p)),
            Geometry::MultiPoint(p) => Geometry::MultiPoint(line(p)),
            Geometry::LineString(l) => Geometry::LineString(line(l)),
            Geometry::MultiLineString(l) => Geometry::MultiLineString(l.iter().map(line).collect()),
            Geometry::Polygon(r) => Geometry::Polygon(r.iter().map(line).collect()),
            Geometry::MultiPolygon(p) => Geometry::MultiPolygon(
                p.iter().map(|r| r.iter().map(line).collect()).collect(),
            ),
        };
        Feature::new(geometry, self.properties.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        FeatureCollection { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }

    /// Loads a `.geojson`/`.json` file or a `.zip` containing a shapefile.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match extension.as_deref() {
            Some("geojson") | Some("json") => {
                let mut contents = String::new();
                File::open(path)
                    .chain_err(|| format!("Could not open {}", path.display()))?
                    .read_to_string(&mut contents)?;
                Self::from_geojson_str(&contents)
                    .chain_err(|| format!("Could not parse {}", path.display()))
            }
            Some("zip") => {
                let file = File::open(path)
                    .chain_err(|| format!("Could not open {}", path.display()))?;
                Self::from_zipped_shapefile(file)
                    .chain_err(|| format!("Could not read shapefile from {}", path.display()))
            }
            _ => bail!(ErrorKind::UnsupportedExtension(path.display().to_string())),
        }
    }

    pub fn from_geojson_str(contents: &str) -> Result<Self> {
        let geojson: geojson::GeoJson = contents.parse()?;
        let raw_features = match geojson {
            geojson::GeoJson::FeatureCollection(collection) => collection.features,
            geojson::GeoJson::Feature(feature) => vec![feature],
            geojson::GeoJson::Geometry(geometry) => vec![geojson::Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: None,
                foreign_members: None,
            }],
        };
        let mut features = Vec::with_capacity(raw_features.len());
        for (index, raw) in raw_features.into_iter().enumerate() {
            let geometry = match raw.geometry {
                Some(ref geometry) => Geometry::from_geojson(&geometry.value)?,
                None => None,
            };
            match geometry {
                Some(geometry) => {
                    features.push(Feature::new(geometry, raw.properties.unwrap_or_default()))
                }
                None => warn!(
                    "Skipping feature {} without a supported geometry.",
                    index
                ),
            }
        }
        Ok(FeatureCollection::new(features))
    }

    /// Reads the first `.shp` and its `.dbf` from a zip archive. Coordinates
    /// are expected to be longitude/latitude.
    pub fn from_zipped_shapefile<R: Read + std::io::Seek>(reader: R) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(reader)?;
        let mut shp_bytes = None;
        let mut dbf_bytes = None;
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            let name = entry.name().to_lowercase();
            let target = if name.ends_with(".shp") && shp_bytes.is_none() {
                &mut shp_bytes
            } else if name.ends_with(".dbf") && dbf_bytes.is_none() {
                &mut dbf_bytes
            } else {
                continue;
            };
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes)?;
            *target = Some(bytes);
        }
        let shp_bytes = shp_bytes.ok_or_else(|| {
            ErrorKind::InvalidInput("the archive does not contain a .shp file".to_string())
        })?;

        let records: Vec<Map<String, Value>> = match dbf_bytes {
            Some(bytes) => shapefile::dbase::Reader::new(Cursor::new(bytes))
                .and_then(|mut reader| reader.read())
                .map_err(|err| ErrorKind::InvalidInput(format!("invalid .dbf file: {}", err)))?
                .into_iter()
                .map(record_to_properties)
                .collect(),
            None => Vec::new(),
        };

        let mut shape_reader = shapefile::ShapeReader::new(Cursor::new(shp_bytes))?;
        let mut features = Vec::new();
        for (index, shape) in shape_reader.iter_shapes().enumerate() {
            let geometry = match shape_to_geometry(&shape?) {
                Some(geometry) => geometry,
                None => {
                    warn!("Skipping shape {} of an unsupported type.", index);
                    continue;
                }
            };
            let properties = records.get(index).cloned().unwrap_or_default();
            features.push(Feature::new(geometry, properties));
        }
        Ok(FeatureCollection::new(features))
    }
}

fn record_to_properties(record: shapefile::dbase::Record) -> Map<String, Value> {
    let fields: HashMap<String, FieldValue> = record.into();
    fields
        .into_iter()
        .map(|(name, value)| {
            let value = match value {
                FieldValue::Character(Some(text)) => Value::String(text.trim().to_string()),
                FieldValue::Numeric(Some(number)) => Value::from(number),
                FieldValue::Float(Some(number)) => Value::from(f64::from(number)),
                FieldValue::Double(number) => Value::from(number),
                FieldValue::Currency(number) => Value::from(number),
                FieldValue::Integer(number) => Value::from(number),
                FieldValue::Logical(Some(flag)) => Value::Bool(flag),
                FieldValue::Memo(text) => Value::String(text),
                _ => Value::Null,
            };
            (name, value)
        })
        .collect()
}

trait ShapePoint {
    fn position(&self) -> Position;
}

impl ShapePoint for shapefile::Point {
    fn position(&self) -> Position {
        Position::new(self.x, self.y, None)
    }
}

impl ShapePoint for shapefile::PointZ {
    fn position(&self) -> Position {
        Position::new(self.x, self.y, Some(self.z))
    }
}

fn polygon_rings<P: ShapePoint>(rings: &[shapefile::PolygonRing<P>]) -> Geometry {
    let mut polygons: Vec<Vec<Ring>> = Vec::new();
    for ring in rings {
        let positions: Ring = ring.points().iter().map(ShapePoint::position).collect();
        match ring {
            shapefile::PolygonRing::Outer(_) => polygons.push(vec![positions]),
            shapefile::PolygonRing::Inner(_) => match polygons.last_mut() {
                Some(polygon) => polygon.push(positions),
                None => polygons.push(vec![positions]),
            },
        }
    }
    if polygons.len() == 1 {
        Geometry::Polygon(polygons.remove(0))
    } else {
        Geometry::MultiPolygon(polygons)
    }
}

fn polyline_parts<P: ShapePoint>(parts: &[Vec<P>]) -> Geometry {
    let mut lines: Vec<Vec<Position>> = parts
        .iter()
        .map(|part| part.iter().map(ShapePoint::position).collect())
        .collect();
    if lines.len() == 1 {
        Geometry::LineString(lines.remove(0))
    } else {
        Geometry::MultiLineString(lines)
    }
}

fn shape_to_geometry(shape: &shapefile::Shape) -> Option<Geometry> {
    use shapefile::Shape;
    let geometry = match shape {
        Shape::Point(p) => Geometry::Point(p.position()),
        Shape::PointZ(p) => Geometry::Point(p.position()),
        Shape::Multipoint(m) => Geometry::MultiPoint(m.points().iter().map(|p| p.position()).collect()),
        Shape::MultipointZ(m) => {
            Geometry::MultiPoint(m.points().iter().map(|p| p.position()).collect())
        }
        Shape::Polyline(l) => polyline_parts(l.parts()),
        Shape::PolylineZ(l) => polyline_parts(l.parts()),
        Shape::Polygon(p) => polygon_rings(p.rings()),
        Shape::PolygonZ(p) => polygon_rings(p.rings()),
        _ => return None,
    };
    Some(geometry)
}
