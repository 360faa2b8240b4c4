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

//! Staging of generated geometry in PostGIS tables, from where the tilers
//! read it.

use crate::errors::*;
use crate::feature::{Feature, FeatureCollection};
use crate::instances::{Instances, PointInstance};
use crate::polyhedron::{self, GeometryOptions, PolyhedralSurface};
use crate::settings::DatabaseSettings;
use crate::subprocess::{run_checked, Stream, TempArtifact};
use crate::tileset::ValueRange;
use crate::tools::Tools;
use fnv::FnvHashSet;
use log::{debug, warn};
use rayon::prelude::*;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const GEOMETRY_COLUMN: &str = "geom";
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

const RESERVED_COLUMNS: [&str; 2] = ["id", GEOMETRY_COLUMN];

/// Lowercase identifier with every character that is not alphanumeric
/// replaced by `_`, e.g. "Trees 2020" -> "trees_2020".
pub fn table_name(dataset: &str) -> String {
    let name: String = dataset
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    match name.chars().next() {
        None => "tiles".to_string(),
        Some(c) if c.is_ascii_digit() => format!("_{}", name),
        Some(_) => name,
    }
}

fn column_name(key: &str) -> String {
    let name = table_name(key);
    if RESERVED_COLUMNS.contains(&name.as_str()) {
        format!("{}_", name)
    } else {
        name
    }
}

/// Escapes a string for use inside a single quoted SQL literal.
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    Numeric,
    Text,
}

impl AttributeType {
    pub fn sql_type(self) -> &'static str {
        match self {
            AttributeType::Numeric => "double precision",
            AttributeType::Text => "varchar",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Property key in the features.
    pub key: String,
    pub column: String,
    pub kind: AttributeType,
}

impl Attribute {
    fn sql_value(&self, feature: &Feature) -> String {
        match (self.kind, feature.property(&self.key)) {
            (_, None) | (_, Some(Value::Null)) => "NULL".to_string(),
            (AttributeType::Numeric, Some(Value::Number(n))) => n.to_string(),
            (AttributeType::Numeric, Some(_)) => "NULL".to_string(),
            (AttributeType::Text, Some(Value::String(s))) => quote(s),
            (AttributeType::Text, Some(other)) => quote(&other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSchema {
    pub attributes: Vec<Attribute>,
}

impl AttributeSchema {
    /// Collects the property keys of the first `sample` features in order of
    /// appearance. An attribute is numeric iff every non-null sampled value
    /// is a number.
    pub fn infer(collection: &FeatureCollection, sample: usize) -> Self {
        let sampled = &collection.features[..sample.min(collection.len())];
        let mut keys: Vec<&str> = Vec::new();
        let mut columns = FnvHashSet::default();
        for feature in sampled {
            for key in feature.properties.keys() {
                if columns.insert(column_name(key)) {
                    keys.push(key);
                }
            }
        }
        let attributes = keys
            .into_iter()
            .map(|key| {
                let mut values = sampled
                    .iter()
                    .filter_map(|f| f.property(key))
                    .filter(|v| !v.is_null())
                    .peekable();
                let numeric = values.peek().is_some() && values.all(Value::is_number);
                Attribute {
                    key: key.to_string(),
                    column: column_name(key),
                    kind: if numeric {
                        AttributeType::Numeric
                    } else {
                        AttributeType::Text
                    },
                }
            })
            .collect();
        AttributeSchema { attributes }
    }

    pub fn columns(&self) -> Vec<String> {
        self.attributes.iter().map(|a| a.column.clone()).collect()
    }

    fn column_definitions(&self) -> String {
        self.attributes
            .iter()
            .map(|a| format!(",\n  {} {}", a.column, a.kind.sql_type()))
            .collect()
    }
}

/// Value ranges of the numeric attributes over all features. Text
/// attributes get an empty range.
pub fn attribute_ranges(
    collection: &FeatureCollection,
    schema: &AttributeSchema,
) -> BTreeMap<String, ValueRange> {
    schema
        .attributes
        .iter()
        .map(|attribute| {
            let range = match attribute.kind {
                AttributeType::Text => ValueRange::default(),
                AttributeType::Numeric => collection
                    .iter()
                    .filter_map(|f| f.property(&attribute.key).and_then(Value::as_f64))
                    .fold(ValueRange::default(), |range, v| ValueRange {
                        minimum: Some(range.minimum.map_or(v, |m| m.min(v))),
                        maximum: Some(range.maximum.map_or(v, |m| m.max(v))),
                    }),
            };
            (attribute.column.clone(), range)
        })
        .collect()
}

pub fn polyhedral_table_ddl(table: &str, schema: &AttributeSchema) -> String {
    format!(
        "DROP TABLE IF EXISTS {table};\n\
         CREATE TABLE {table}(\n  id serial PRIMARY KEY,\n  {geom} geometry(POLYHEDRALSURFACEZ, 4978){columns}\n);\n\
         CREATE INDEX {table}_geom_idx ON {table} USING gist(st_centroid(st_envelope({geom})));\n",
        table = table,
        geom = GEOMETRY_COLUMN,
        columns = schema.column_definitions()
    )
}

pub fn instance_table_ddl(table: &str) -> String {
    format!(
        "DROP TABLE IF EXISTS {table};\n\
         CREATE TABLE {table}(\n  id serial PRIMARY KEY,\n  {geom} geometry(POINTZ, 4326),\n  \
         scale double precision,\n  rotation double precision,\n  model varchar,\n  tags json\n);\n\
         CREATE INDEX {table}_geom_idx ON {table} USING GIST ({geom});\n",
        table = table,
        geom = GEOMETRY_COLUMN
    )
}

pub fn polyhedral_insert(
    table: &str,
    schema: &AttributeSchema,
    rows: &[(&Feature, &PolyhedralSurface)],
) -> String {
    let columns: String = schema
        .attributes
        .iter()
        .map(|a| format!(", {}", a.column))
        .collect();
    let values: Vec<String> = rows
        .iter()
        .map(|(feature, surface)| {
            let attributes: String = schema
                .attributes
                .iter()
                .map(|a| format!(", {}", a.sql_value(feature)))
                .collect();
            format!(
                "(ST_GeomFromText({}, 4978){})",
                quote(&surface.to_wkt()),
                attributes
            )
        })
        .collect();
    format!(
        "INSERT INTO {}({}{})\nVALUES {};\n",
        table,
        GEOMETRY_COLUMN,
        columns,
        values.join(",\n")
    )
}

pub fn instance_insert(table: &str, instances: &[&PointInstance]) -> String {
    let values: Vec<String> = instances
        .iter()
        .map(|instance| {
            let tags: Map<String, Value> = instance.tags.iter().cloned().collect();
            format!(
                "(ST_GeomFromText('POINT Z({} {} {})', 4326), {}, {}, {}, {})",
                instance.position.x,
                instance.position.y,
                instance.position.z,
                instance.scale,
                instance.rotation.to_degrees(),
                quote(&instance.model),
                quote(&Value::Object(tags).to_string())
            )
        })
        .collect();
    format!(
        "INSERT INTO {}({}, scale, rotation, model, tags)\nVALUES {};\n",
        table,
        GEOMETRY_COLUMN,
        values.join(",\n")
    )
}

/// Receives the SQL statements of a staging run.
pub trait StagingStore {
    fn execute(&mut self, sql: &str) -> Result<()>;
}

impl StagingStore for Vec<String> {
    fn execute(&mut self, sql: &str) -> Result<()> {
        self.push(sql.to_string());
        Ok(())
    }
}

/// Appends all statements to a SQL script.
#[derive(Debug)]
pub struct SqlScriptStore {
    path: PathBuf,
}

impl SqlScriptStore {
    /// Creates or truncates the script at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        File::create(path).chain_err(|| format!("Could not create {}", path.display()))?;
        Ok(SqlScriptStore {
            path: path.to_path_buf(),
        })
    }
}

impl StagingStore for SqlScriptStore {
    fn execute(&mut self, sql: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .chain_err(|| format!("Could not open {}", self.path.display()))?;
        file.write_all(sql.as_bytes())?;
        Ok(())
    }
}

/// Runs every statement through `psql`.
#[derive(Debug, Clone)]
pub struct PsqlStore {
    pub tools: Tools,
    pub database: DatabaseSettings,
    pub tmp_dir: PathBuf,
    pub fatal_markers: Vec<String>,
}

impl StagingStore for PsqlStore {
    fn execute(&mut self, sql: &str) -> Result<()> {
        let script = TempArtifact::with_contents(&self.tmp_dir, "staging", "sql", sql.as_bytes())?;
        let job = self.tools.psql(&self.database, script.path());
        run_checked(&job, &self.fatal_markers, &mut |stream: Stream, line: &str| {
            match stream {
                Stream::Stdout => debug!("psql: {}", line),
                Stream::Stderr => warn!("psql: {}", line),
            }
        })
        .chain_err(|| "Could not stage features")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

/// Creates the polyhedral table and inserts the surfaces of all features,
/// built chunk by chunk. Features with an empty surface are skipped.
pub fn stage_polyhedra<F>(
    store: &mut dyn StagingStore,
    table: &str,
    schema: &AttributeSchema,
    collection: &FeatureCollection,
    compute_options: F,
    chunk_size: usize,
    on_progress: &mut dyn FnMut(Progress),
) -> Result<()>
where
    F: Fn(&Feature) -> GeometryOptions + Sync,
{
    store.execute(&polyhedral_table_ddl(table, schema))?;
    let total = collection.len();
    let mut processed = 0;
    for chunk in collection.features.chunks(chunk_size.max(1)) {
        let surfaces = chunk
            .par_iter()
            .enumerate()
            .map(|(i, feature)| {
                polyhedron::build(feature, &compute_options(feature))
                    .chain_err(|| format!("Could not build feature {}", processed + i))
            })
            .collect::<Result<Vec<PolyhedralSurface>>>()?;
        let rows: Vec<(&Feature, &PolyhedralSurface)> = chunk
            .iter()
            .zip(surfaces.iter())
            .filter(|(_, surface)| !surface.is_empty())
            .collect();
        if rows.len() < chunk.len() {
            debug!("Skipping {} features without surface", chunk.len() - rows.len());
        }
        if !rows.is_empty() {
            store.execute(&polyhedral_insert(table, schema, &rows))?;
        }
        processed += chunk.len();
        on_progress(Progress { processed, total });
    }
    Ok(())
}

pub fn stage_instances(
    store: &mut dyn StagingStore,
    table: &str,
    instances: &Instances,
    chunk_size: usize,
    on_progress: &mut dyn FnMut(Progress),
) -> Result<()> {
    store.execute(&instance_table_ddl(table))?;
    let total = instances.features.len();
    let mut processed = 0;
    for chunk in instances.features.chunks(chunk_size.max(1)) {
        let rows: Vec<&PointInstance> = chunk.iter().collect();
        store.execute(&instance_insert(table, &rows))?;
        processed += chunk.len();
        on_progress(Progress { processed, total });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Geometry, Position};
    use crate::instances::{self, InstanceOptions};
    use serde_json::json;
    use tempdir::TempDir;

    fn square(properties: Value) -> Feature {
        let ring = vec![
            Position::new(11., 43., None),
            Position::new(11.001, 43., None),
            Position::new(11.001, 43.001, None),
            Position::new(11., 43.001, None),
            Position::new(11., 43., None),
        ];
        Feature::new(
            Geometry::Polygon(vec![ring]),
            properties.as_object().cloned().unwrap_or_default(),
        )
    }

    #[test]
    fn test_table_name() {
        assert_eq!("trees_2020", table_name("Trees 2020"));
        assert_eq!("via_roma_buildings", table_name("Via-Roma.buildings"));
        assert_eq!("_3d_buildings", table_name("3D buildings"));
        assert_eq!("tiles", table_name(""));
    }

    #[test]
    fn test_schema_inference() {
        let collection = FeatureCollection::new(vec![
            square(json!({"Height": 10, "name": "a", "id": 1, "mixed": 1})),
            square(json!({"Height": null, "name": "b", "mixed": "x", "extra": 2.5})),
            square(json!({"Height": 12.5, "name": null, "late": 1})),
        ]);
        let schema = AttributeSchema::infer(&collection, 2);
        let summary: Vec<(&str, &str, AttributeType)> = schema
            .attributes
            .iter()
            .map(|a| (a.key.as_str(), a.column.as_str(), a.kind))
            .collect();
        assert_eq!(
            vec![
                ("Height", "height", AttributeType::Numeric),
                ("id", "id_", AttributeType::Numeric),
                ("mixed", "mixed", AttributeType::Text),
                ("name", "name", AttributeType::Text),
                ("extra", "extra", AttributeType::Numeric),
            ],
            summary
        );
    }

    #[test]
    fn test_attribute_ranges() {
        let collection = FeatureCollection::new(vec![
            square(json!({"height": 10, "name": "a"})),
            square(json!({"height": 2.5, "name": "b"})),
            square(json!({"height": 7})),
        ]);
        let schema = AttributeSchema::infer(&collection, 100);
        let ranges = attribute_ranges(&collection, &schema);
        assert_eq!(
            json!({"height": {"minimum": 2.5, "maximum": 10.0}, "name": {}}),
            serde_json::to_value(&ranges).unwrap()
        );
    }

    #[test]
    fn test_ddl() {
        let collection = FeatureCollection::new(vec![square(json!({"height": 10, "name": "a"}))]);
        let schema = AttributeSchema::infer(&collection, 10);
        let ddl = polyhedral_table_ddl("buildings", &schema);
        assert!(ddl.starts_with("DROP TABLE IF EXISTS buildings;\n"));
        assert!(ddl.contains("geom geometry(POLYHEDRALSURFACEZ, 4978),\n  height double precision,\n  name varchar\n);"));
        assert!(ddl.contains("CREATE INDEX buildings_geom_idx ON buildings USING gist("));

        let ddl = instance_table_ddl("trees");
        assert!(ddl.contains("geom geometry(POINTZ, 4326)"));
        assert!(ddl.contains("tags json"));
        assert!(ddl.contains("USING GIST (geom)"));
    }

    #[test]
    fn test_quotes_are_escaped() {
        let feature = square(json!({"name": "Piazza dell'Unità", "height": 3}));
        let collection = FeatureCollection::new(vec![feature.clone()]);
        let schema = AttributeSchema::infer(&collection, 10);
        let surface = polyhedron::build(&feature, &GeometryOptions::default()).unwrap();
        let sql = polyhedral_insert("squares", &schema, &[(&feature, &surface)]);
        assert!(sql.starts_with("INSERT INTO squares(geom, height, name)\nVALUES (ST_GeomFromText('POLYHEDRALSURFACE Z ((("));
        assert!(sql.ends_with(", 4978), 3, 'Piazza dell''Unità');\n"));
    }

    #[test]
    fn test_stage_polyhedra_in_chunks() {
        let mut features: Vec<Feature> = (0..2500).map(|i| square(json!({ "index": i }))).collect();
        // A degenerate polygon yields no surface and is not inserted.
        features[10] = Feature::new(Geometry::Polygon(vec![vec![]]), Map::new());
        let collection = FeatureCollection::new(features);
        let schema = AttributeSchema::infer(&collection, 100);
        let mut store: Vec<String> = Vec::new();
        let mut progress = Vec::new();
        stage_polyhedra(
            &mut store,
            "squares",
            &schema,
            &collection,
            |_| GeometryOptions::default(),
            DEFAULT_CHUNK_SIZE,
            &mut |p| progress.push((p.processed, p.total)),
        )
        .unwrap();
        assert_eq!(4, store.len());
        assert!(store[0].starts_with("DROP TABLE IF EXISTS squares;"));
        assert_eq!(999, store[1].matches("ST_GeomFromText").count());
        assert_eq!(500, store[3].matches("ST_GeomFromText").count());
        assert_eq!(vec![(1000, 2500), (2000, 2500), (2500, 2500)], progress);
    }

    #[test]
    fn test_stage_instances_to_script() {
        let dir = TempDir::new("staging").unwrap();
        let path = dir.path().join("trees.sql");
        let collection = FeatureCollection::new(vec![Feature::new(
            Geometry::Point(Position::new(11., 43., Some(2.))),
            json!({"Species": "O'Neil oak"}).as_object().cloned().unwrap(),
        )]);
        let instances = instances::build(&collection, |_| InstanceOptions {
            rotation: Some(90.),
            ..Default::default()
        });
        let mut store = SqlScriptStore::create(&path).unwrap();
        let mut progress = Vec::new();
        stage_instances(&mut store, "trees", &instances, 1000, &mut |p| progress.push(p)).unwrap();
        let script = std::fs::read_to_string(&path).unwrap();
        assert!(script.starts_with("DROP TABLE IF EXISTS trees;"));
        assert!(script.contains("(ST_GeomFromText('POINT Z(11 43 2)', 4326), 1, "));
        assert!(script.contains(", 'model.glb', '{\"species\":\"O''Neil oak\"}')"));
        let rotation: f64 = script
            .split("4326), 1, ")
            .nth(1)
            .and_then(|rest| rest.split(',').next())
            .unwrap()
            .parse()
            .unwrap();
        assert!((rotation - 90.).abs() < 1e-9);
        assert_eq!(vec![Progress { processed: 1, total: 1 }], progress);
    }
}
