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

use crate::errors::*;
use crate::pdal::PreviewParams;
use crate::tools::{MeshTilerParams, ReconstructionParams, Tools};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
        }
    }
}

impl DatabaseSettings {
    /// libpq connection string, as understood by `psql`.
    pub fn conninfo(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, self.user, self.password
        )
    }

    /// Npgsql connection string.
    pub fn npgsql_connection(&self) -> String {
        format!(
            "Host={};Username={};password={};Port={};Database={}",
            self.host, self.user, self.password, self.port, self.database
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Input datasets.
    pub data_dir: PathBuf,
    /// Root of the generated tilesets, one directory per tileset.
    pub tilesets_dir: PathBuf,
    /// glTF models referenced by point instances.
    pub models_dir: PathBuf,
    pub tmp_dir: PathBuf,
    /// Persisted command configurations, one file per dataset.
    pub options_dir: PathBuf,
    /// Prefix of the links reported for datasets and tilesets.
    pub public_url: String,
    pub database: DatabaseSettings,
    /// When set, staging statements are written to this SQL script instead
    /// of being run through psql.
    pub staging_script: Option<PathBuf>,
    pub tools: Tools,
    /// Tool stderr lines containing one of these abort the job.
    pub fatal_markers: Vec<String>,
    /// Number of features inspected to decide attribute column types.
    pub schema_sample: usize,
    pub insert_chunk_size: usize,
    pub preview: PreviewParams,
    pub reconstruction: ReconstructionParams,
    pub mesh_tiler: MeshTilerParams,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_dir: PathBuf::from("static/data"),
            tilesets_dir: PathBuf::from("static/tilesets"),
            models_dir: PathBuf::from("static/glb"),
            tmp_dir: PathBuf::from("tmp"),
            options_dir: PathBuf::from("static/options"),
            public_url: "http://localhost:8080".to_string(),
            database: DatabaseSettings::default(),
            staging_script: None,
            tools: Tools::default(),
            fatal_markers: vec!["CRSError".to_string()],
            schema_sample: 100,
            insert_chunk_size: 1000,
            preview: PreviewParams::default(),
            reconstruction: ReconstructionParams::default(),
            mesh_tiler: MeshTilerParams::default(),
        }
    }
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).chain_err(|| format!("Could not open {}", path.display()))?;
        let settings = serde_json::from_reader(BufReader::new(file))
            .chain_err(|| format!("Could not parse settings {}", path.display()))?;
        Ok(settings)
    }

    pub fn data_link(&self, file_name: &str) -> String {
        format!("{}/data/{}", self.public_url.trim_end_matches('/'), file_name)
    }

    pub fn tileset_link(&self, name: &str) -> String {
        format!(
            "{}/tilesets/{}/tileset.json",
            self.public_url.trim_end_matches('/'),
            name
        )
    }
}
