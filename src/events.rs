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

//! Messages exchanged with the client. Every message is one JSON object
//! `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A dataset in the data directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetFile {
    /// File name without extension.
    pub name: String,
    #[serde(default)]
    pub link: String,
    /// Extension including the leading dot, e.g. ".geojson".
    pub extension: String,
}

impl DatasetFile {
    pub fn file_name(&self) -> String {
        format!("{}{}", self.name, self.extension)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilesetLink {
    pub name: String,
    pub link: String,
}

/// A build request for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub file: DatasetFile,
    #[serde(default)]
    pub config: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Command {
    #[serde(rename = "list-datasets")]
    ListDatasets,
    #[serde(rename = "list-tilesets")]
    ListTilesets,
    #[serde(rename = "mesh:tileset")]
    MeshTileset(Job),
    #[serde(rename = "point-instance:tileset")]
    PointInstanceTileset(Job),
    #[serde(rename = "point-cloud:tileset")]
    PointCloudTileset(Job),
    #[serde(rename = "point-cloud:process-las")]
    ProcessLas(Job),
    #[serde(rename = "point-cloud:count")]
    PointCloudCount(Job),
    #[serde(rename = "point-cloud:projection")]
    PointCloudProjection(Job),
    #[serde(rename = "reconstructed-mesh:tileset")]
    ReconstructedMeshTileset(Job),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::ListDatasets => "list-datasets",
            Command::ListTilesets => "list-tilesets",
            Command::MeshTileset(_) => "mesh:tileset",
            Command::PointInstanceTileset(_) => "point-instance:tileset",
            Command::PointCloudTileset(_) => "point-cloud:tileset",
            Command::ProcessLas(_) => "point-cloud:process-las",
            Command::PointCloudCount(_) => "point-cloud:count",
            Command::PointCloudProjection(_) => "point-cloud:projection",
            Command::ReconstructedMeshTileset(_) => "reconstructed-mesh:tileset",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub link: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogOptions {
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub message: String,
    #[serde(rename = "type")]
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<LogOptions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum Event {
    Data { files: Vec<DatasetFile> },
    Tilesets { tilesets: Vec<TilesetLink> },
    HideProgressUi,
    ShowProgressUi,
    Log(LogMessage),
    /// Progress of a long running step, e.g. staging.
    Progress {
        message: String,
        processed: usize,
        total: usize,
    },
}

impl Event {
    fn log(message: impl Into<String>, level: LogLevel) -> Self {
        Event::Log(LogMessage {
            message: message.into(),
            level,
            options: None,
        })
    }

    pub fn info(message: impl Into<String>) -> Self {
        Event::log(message, LogLevel::Info)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Event::log(message, LogLevel::Success)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Event::log(message, LogLevel::Error)
    }

    /// Success message with a link to the preview of tileset `name`.
    pub fn tileset_ready(name: &str) -> Self {
        Event::Log(LogMessage {
            message: String::new(),
            level: LogLevel::Success,
            options: Some(LogOptions {
                action: Action {
                    link: format!("/preview/?{}", name),
                    kind: "popup".to_string(),
                    label: "Tileset preview".to_string(),
                },
            }),
        })
    }
}
