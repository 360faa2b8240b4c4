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
use crate::staging::table_name;
use error_chain::bail;
use serde_json::Value as JsonValue;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// The last configuration used for each dataset, one JSON file per dataset.
#[derive(Debug, Clone)]
pub struct OptionsStore {
    directory: PathBuf,
}

impl OptionsStore {
    pub fn new(directory: &Path) -> Self {
        OptionsStore {
            directory: directory.to_path_buf(),
        }
    }

    fn path(&self, dataset: &str) -> PathBuf {
        self.directory.join(format!("{}.json", table_name(dataset)))
    }

    pub fn load(&self, dataset: &str) -> Result<Option<JsonValue>> {
        let path = self.path(dataset);
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(&path).chain_err(|| format!("Could not open {}", path.display()))?;
        let value = serde_json::from_reader(BufReader::new(file))
            .chain_err(|| format!("Could not parse {}", path.display()))?;
        Ok(Some(value))
    }

    pub fn save(&self, dataset: &str, config: &JsonValue) -> Result<()> {
        fs::create_dir_all(&self.directory)
            .chain_err(|| format!("Could not create {}", self.directory.display()))?;
        let path = self.path(dataset);
        let file =
            File::create(&path).chain_err(|| format!("Could not create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), config)?;
        Ok(())
    }

    /// Overlays `config` on the stored configuration of `dataset`, stores the
    /// result and returns it. Keys set to `null` in `config` are removed.
    pub fn update(&self, dataset: &str, config: &JsonValue) -> Result<JsonValue> {
        let mut merged = match self.load(dataset)? {
            Some(JsonValue::Object(stored)) => stored,
            _ => Default::default(),
        };
        match config {
            JsonValue::Object(overrides) => {
                for (key, value) in overrides {
                    if value.is_null() {
                        merged.remove(key);
                    } else {
                        merged.insert(key.clone(), value.clone());
                    }
                }
            }
            JsonValue::Null => (),
            other => bail!(ErrorKind::InvalidInput(format!(
                "configuration must be an object, got {}",
                other
            ))),
        }
        let merged = JsonValue::Object(merged);
        self.save(dataset, &merged)?;
        Ok(merged)
    }
}
