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

//! Runs the build commands. Every command reports through `Event`s: build
//! commands are bracketed by `hide-progress-ui` and `show-progress-ui` and
//! end with either a success or a single error log entry.

use crate::errors::*;
use crate::events::{Command, DatasetFile, Event, Job, TilesetLink};
use crate::feature::FeatureCollection;
use crate::instances::{self, tag_name};
use crate::math::parse_projection;
use crate::options::{
    MeshTilesetConfig, PointCloudTilesetConfig, PointInstanceTilesetConfig,
    ReconstructedMeshConfig,
};
use crate::options_store::OptionsStore;
use crate::pdal::{self, PointCloudMetadata, ProcessParams};
use crate::settings::Settings;
use crate::staging::{self, AttributeSchema, Progress, PsqlStore, SqlScriptStore, StagingStore};
use crate::subprocess::{ensure_output_absent, run_checked, CollectingSink, OutputSink, Stream};
use crate::subprocess::{StagedDirectory, TempArtifact, ToolJob};
use crate::tileset::{
    self, DirectoryProbe, TileInfo, TileQuadtreeBuilder, TilesetOptions, ValueRange,
    INFO_FILE_NAME, TILESET_FILE_NAME,
};
use crate::tools::PdalInfo;
use crate::utils::dataset_file;
use crossbeam::channel::{self, Sender};
use crossbeam::sync::WaitGroup;
use error_chain::bail;
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use walkdir::WalkDir;

/// Cloneable handle to the outgoing event channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: Sender<Event>,
}

impl EventSink {
    pub fn new(sender: Sender<Event>) -> Self {
        EventSink { sender }
    }

    /// Sends `event`. Events are dropped once the receiving side is gone.
    pub fn emit(&self, event: Event) {
        if self.sender.send(event).is_err() {
            debug!("Event receiver disconnected");
        }
    }

    fn info(&self, message: impl Into<String>) {
        self.emit(Event::info(message));
    }

    fn progress(&self, message: &str, progress: Progress) {
        self.emit(Event::Progress {
            message: message.to_string(),
            processed: progress.processed,
            total: progress.total,
        });
    }
}

/// Forwards tool output to the client: stdout as info, stderr as error.
struct ToolOutput<'a> {
    program: &'a str,
    events: &'a EventSink,
}

impl<'a> OutputSink for ToolOutput<'a> {
    fn line(&mut self, stream: Stream, line: &str) {
        match stream {
            Stream::Stdout => {
                debug!("{}: {}", self.program, line);
                self.events.info(line);
            }
            Stream::Stderr => {
                warn!("{}: {}", self.program, line);
                self.events.emit(Event::error(line));
            }
        }
    }
}

/// Joins the messages of the error and all its causes.
pub fn describe(error: &Error) -> String {
    error
        .iter()
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}

pub struct Workflows {
    settings: Settings,
    options: OptionsStore,
}

impl Workflows {
    pub fn new(settings: Settings) -> Self {
        let options = OptionsStore::new(&settings.options_dir);
        Workflows { settings, options }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Supported files in the data directory, sorted by file name.
    pub fn list_datasets(&self) -> Result<Vec<DatasetFile>> {
        let mut files = Vec::new();
        if !self.settings.data_dir.is_dir() {
            return Ok(files);
        }
        let walker = WalkDir::new(&self.settings.data_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()));
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let link = self
                .settings
                .data_link(&entry.file_name().to_string_lossy());
            if let Some(file) = dataset_file(entry.path(), link) {
                files.push(file);
            }
        }
        Ok(files)
    }

    /// Directories of the tilesets directory that contain a descriptor. Hidden
    /// directories are tilesets still being built.
    pub fn list_tilesets(&self) -> Result<Vec<TilesetLink>> {
        let mut tilesets = Vec::new();
        if !self.settings.tilesets_dir.is_dir() {
            return Ok(tilesets);
        }
        let walker = WalkDir::new(&self.settings.tilesets_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()));
        for entry in walker {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.')
                || !entry.file_type().is_dir()
                || !entry.path().join(TILESET_FILE_NAME).exists()
            {
                continue;
            }
            tilesets.push(TilesetLink {
                link: self.settings.tileset_link(&name),
                name,
            });
        }
        Ok(tilesets)
    }

    fn input_path(&self, file: &DatasetFile) -> PathBuf {
        self.settings.data_dir.join(file.file_name())
    }

    /// Merges the job configuration into the one stored for this command and
    /// dataset and parses the result.
    fn config<T: DeserializeOwned>(&self, command: &str, job: &Job) -> Result<T> {
        let key = format!("{} {}", command, job.file.name);
        let merged = self.options.update(&key, &job.config)?;
        let config = serde_json::from_value(merged)
            .chain_err(|| format!("Invalid configuration for {}", command))?;
        Ok(config)
    }

    fn tileset_name(&self, name: &Option<String>, file: &DatasetFile) -> String {
        let name = name
            .as_ref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&file.name);
        staging::table_name(name)
    }

    /// The output directory of tileset `name`, built aside and only moved into
    /// place once the whole job succeeded.
    fn prepare_output(&self, name: &str) -> Result<StagedDirectory> {
        StagedDirectory::new(&self.settings.tilesets_dir.join(name))
    }

    fn staging_store(&self) -> Result<Box<dyn StagingStore>> {
        Ok(match &self.settings.staging_script {
            Some(path) => Box::new(SqlScriptStore::create(path)?),
            None => Box::new(PsqlStore {
                tools: self.settings.tools.clone(),
                database: self.settings.database.clone(),
                tmp_dir: self.settings.tmp_dir.clone(),
                fatal_markers: self.settings.fatal_markers.clone(),
            }),
        })
    }

    fn run_tool(&self, job: &ToolJob, events: &EventSink) -> Result<()> {
        info!("Running {}", job);
        let mut output = ToolOutput {
            program: &job.program,
            events,
        };
        run_checked(job, &self.settings.fatal_markers, &mut output)
    }

    /// Runs `pdal info` and returns its JSON output. Diagnostics are forwarded
    /// as error events.
    fn pdal_info(&self, input: &Path, kind: PdalInfo, events: &EventSink) -> Result<String> {
        let job = self.settings.tools.pdal_info(input, kind);
        info!("Running {}", job);
        let mut sink = CollectingSink::default();
        let result = run_checked(&job, &self.settings.fatal_markers, &mut sink);
        for line in &sink.stderr {
            events.emit(Event::error(line.as_str()));
        }
        result?;
        Ok(sink.stdout_text())
    }

    pub fn mesh_tileset(&self, job: &Job, events: &EventSink) -> Result<String> {
        let config: MeshTilesetConfig = self.config("mesh:tileset", job)?;
        events.info("Initialize tiling process");
        let collection = FeatureCollection::from_path(&self.input_path(&job.file))?;
        events.info(format!("Features loaded! ({})", collection.len()));

        let table = staging::table_name(&job.file.name);
        let schema = AttributeSchema::infer(&collection, self.settings.schema_sample);
        let mut store = self.staging_store()?;
        staging::stage_polyhedra(
            store.as_mut(),
            &table,
            &schema,
            &collection,
            |feature| config.geometry.options(feature),
            self.settings.insert_chunk_size,
            &mut |progress: Progress| events.progress("Staging features", progress),
        )?;

        let name = self.tileset_name(&config.name, &job.file);
        let staged = self.prepare_output(&name)?;
        let output = staged.path();
        events.info("Init tiling...");
        let tiler = self.settings.tools.pg2b3dm(
            &self.settings.database,
            output,
            &table,
            staging::GEOMETRY_COLUMN,
            &schema.columns(),
            &config.tiler,
        );
        self.run_tool(&tiler, events)?;

        let ranges = staging::attribute_ranges(&collection, &schema);
        tileset::patch_tileset_file(&output.join(TILESET_FILE_NAME), |descriptor| {
            tileset::set_properties(descriptor, &ranges)
        })?;
        staged.commit()?;
        events.emit(Event::tileset_ready(&name));
        Ok(name)
    }

    pub fn point_instance_tileset(&self, job: &Job, events: &EventSink) -> Result<String> {
        let config: PointInstanceTilesetConfig = self.config("point-instance:tileset", job)?;
        events.info("Initialize tiling process");
        let collection = FeatureCollection::from_path(&self.input_path(&job.file))?;
        events.info(format!("Features loaded! ({})", collection.len()));

        let instances = instances::build(&collection, |feature| config.instances.options(feature));
        let table = staging::table_name(&job.file.name);
        let mut store = self.staging_store()?;
        staging::stage_instances(
            store.as_mut(),
            &table,
            &instances,
            self.settings.insert_chunk_size,
            &mut |progress: Progress| events.progress("Staging instances", progress),
        )?;

        let name = self.tileset_name(&config.name, &job.file);
        let staged = self.prepare_output(&name)?;
        let output = staged.path();
        events.info("Init tiling...");
        let tiler = self.settings.tools.i3dm_export(
            &self.settings.database,
            &table,
            output,
            staging::GEOMETRY_COLUMN,
            &config.tiler,
        );
        self.run_tool(&tiler, events)?;

        let content = output.join("content");
        fs::create_dir_all(&content)
            .chain_err(|| format!("Could not create {}", content.display()))?;
        for model in &instances.models {
            let file_name = match Path::new(model).file_name() {
                Some(file_name) => file_name,
                None => bail!(ErrorKind::InvalidInput(format!(
                    "\"{}\" is not a model file name",
                    model
                ))),
            };
            let source = self.settings.models_dir.join(file_name);
            fs::copy(&source, content.join(file_name))
                .chain_err(|| format!("Could not copy model {}", source.display()))?;
        }

        let schema = AttributeSchema::infer(&collection, self.settings.schema_sample);
        let mut column_ranges = staging::attribute_ranges(&collection, &schema);
        let ranges: BTreeMap<String, ValueRange> = schema
            .attributes
            .iter()
            .filter_map(|attribute| {
                column_ranges
                    .remove(&attribute.column)
                    .map(|range| (tag_name(&attribute.key), range))
            })
            .collect();
        tileset::patch_tileset_file(&output.join(TILESET_FILE_NAME), |descriptor| {
            tileset::set_properties(descriptor, &ranges)
        })?;
        staged.commit()?;
        events.emit(Event::tileset_ready(&name));
        Ok(name)
    }

    pub fn point_cloud_tileset(&self, job: &Job, events: &EventSink) -> Result<String> {
        let config: PointCloudTilesetConfig = self.config("point-cloud:tileset", job)?;
        let input = self.input_path(&job.file);
        let name = self.tileset_name(&config.name, &job.file);
        let staged = self.prepare_output(&name)?;
        let output = staged.path();
        events.info("Init tiling...");
        let tiler = self
            .settings
            .tools
            .py3dtiles_convert(&input, output, &config.tiler);
        self.run_tool(&tiler, events)?;

        let statistics = match self
            .pdal_info(&input, PdalInfo::Stats, events)
            .and_then(|json| pdal::parse_statistics(&json))
        {
            Ok(statistics) => statistics,
            Err(e) => {
                warn!("No point cloud statistics: {}", describe(&e));
                BTreeMap::new()
            }
        };
        let mut properties = BTreeMap::new();
        properties.insert(
            "Classification".to_string(),
            statistics
                .get("Classification")
                .cloned()
                .unwrap_or(ValueRange {
                    minimum: Some(0.),
                    maximum: Some(255.),
                }),
        );
        if config.tiler.intensity {
            if let Some(range) = statistics.get("Intensity") {
                properties.insert("Intensity".to_string(), range.clone());
            }
        }
        tileset::patch_tileset_file(&output.join(TILESET_FILE_NAME), |descriptor| {
            if let Some(factor) = config.geometric_error_scale {
                tileset::scale_geometric_errors(descriptor, factor);
            }
            tileset::set_properties(descriptor, &properties)
        })?;
        staged.commit()?;
        events.emit(Event::tileset_ready(&name));
        Ok(name)
    }

    /// Writes a processed copy of a LAS file into the data directory and
    /// returns its path. Fails if the output already exists.
    pub fn process_las(&self, job: &Job, events: &EventSink) -> Result<PathBuf> {
        let params: ProcessParams = if job.config.is_null() {
            ProcessParams::default()
        } else {
            serde_json::from_value(job.config.clone())
                .chain_err(|| "Invalid point cloud processing options")?
        };
        let stem = params
            .output_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("{}_processed", job.file.name));
        let output = self
            .settings
            .data_dir
            .join(format!("{}{}", stem, job.file.extension));
        ensure_output_absent(&output)?;

        let raster = params
            .raster_file
            .as_ref()
            .map(|raster| self.settings.data_dir.join(raster));
        let pipeline =
            pdal::process_pipeline(&self.input_path(&job.file), &output, raster.as_deref(), &params);
        let descriptor = TempArtifact::with_contents(
            &self.settings.tmp_dir,
            "pipeline",
            "json",
            pipeline.to_json()?.as_bytes(),
        )?;
        events.info("Init point cloud processing...");
        self.run_tool(&self.settings.tools.pdal_pipeline(descriptor.path()), events)?;
        events.emit(Event::success("Process completed!"));
        events.emit(Event::Data {
            files: self.list_datasets()?,
        });
        Ok(output)
    }

    pub fn point_cloud_metadata(
        &self,
        file: &DatasetFile,
        events: &EventSink,
    ) -> Result<PointCloudMetadata> {
        events.info("Reading point cloud metadata...");
        let json = self.pdal_info(&self.input_path(file), PdalInfo::Metadata, events)?;
        pdal::parse_metadata(&json)
    }

    /// Reconstructs a surface from a decimated copy of the cloud, tiles it and
    /// writes the quadtree descriptor.
    pub fn reconstructed_mesh_tileset(&self, job: &Job, events: &EventSink) -> Result<String> {
        let config: ReconstructedMeshConfig = self.config("reconstructed-mesh:tileset", job)?;
        let projection = parse_projection(&config.crs)?;
        tileset::check_geometric_errors(&config.geometric_errors)?;
        let input = self.input_path(&job.file);
        let metadata = self.point_cloud_metadata(&job.file, events)?;
        let tmp_dir = &self.settings.tmp_dir;
        let tools = &self.settings.tools;

        let preview = config.preview.as_ref().unwrap_or(&self.settings.preview);
        let points = TempArtifact::new(tmp_dir, "preview", "xyz")?;
        let pipeline =
            pdal::preview_pipeline(&input, points.path(), metadata.count, preview, config.origin);
        let descriptor = TempArtifact::with_contents(
            tmp_dir,
            "pipeline",
            "json",
            pipeline.to_json()?.as_bytes(),
        )?;
        events.info(format!("Decimating {} points...", metadata.count));
        self.run_tool(&tools.pdal_pipeline(descriptor.path()), events)?;

        let mesh = TempArtifact::new(tmp_dir, "mesh", "ply")?;
        let reconstruction = config
            .reconstruction
            .as_ref()
            .unwrap_or(&self.settings.reconstruction);
        events.info("Reconstructing surface...");
        self.run_tool(
            &tools.reconstruction(points.path(), mesh.path(), reconstruction),
            events,
        )?;

        let name = self.tileset_name(&config.name, &job.file);
        let staged = self.prepare_output(&name)?;
        let output = staged.path();
        let image = config
            .image
            .as_ref()
            .map(|image| self.settings.data_dir.join(image));
        let tiler = config.mesh_tiler.as_ref().unwrap_or(&self.settings.mesh_tiler);
        events.info("Init tiling...");
        self.run_tool(
            &tools.mesh_tiler(mesh.path(), output, tiler, image.as_deref()),
            events,
        )?;

        let info = TileInfo::from_path(&output.join(INFO_FILE_NAME))?;
        let options = TilesetOptions {
            geometric_errors: config.geometric_errors.clone(),
            z_offset: config.z_offset,
            origin: config.origin.unwrap_or([0.; 3]),
            scale: config.scale,
            ..Default::default()
        };
        let builder = TileQuadtreeBuilder::new(info, options, projection)?;
        let descriptor = builder.build(&DirectoryProbe {
            directory: output.to_path_buf(),
        });
        descriptor.write(&output.join(TILESET_FILE_NAME))?;
        staged.commit()?;
        events.emit(Event::tileset_ready(&name));
        Ok(name)
    }

    fn run_build(&self, command: &Command, events: &EventSink) -> Result<()> {
        match command {
            Command::MeshTileset(job) => self.mesh_tileset(job, events).map(|_| ()),
            Command::PointInstanceTileset(job) => {
                self.point_instance_tileset(job, events).map(|_| ())
            }
            Command::PointCloudTileset(job) => self.point_cloud_tileset(job, events).map(|_| ()),
            Command::ProcessLas(job) => self.process_las(job, events).map(|_| ()),
            Command::PointCloudCount(job) => {
                let metadata = self.point_cloud_metadata(&job.file, events)?;
                events.emit(Event::success(format!("Point count: {}", metadata.count)));
                Ok(())
            }
            Command::PointCloudProjection(job) => {
                let metadata = self.point_cloud_metadata(&job.file, events)?;
                events.emit(Event::success(format!(
                    "Horizontal SRS:\n\n{}",
                    serde_json::to_string_pretty(&metadata.horizontal_srs)?
                )));
                events.emit(Event::success(format!(
                    "Vertical SRS:\n\n{}",
                    serde_json::to_string_pretty(&metadata.vertical_srs)?
                )));
                Ok(())
            }
            Command::ReconstructedMeshTileset(job) => {
                self.reconstructed_mesh_tileset(job, events).map(|_| ())
            }
            Command::ListDatasets | Command::ListTilesets => Ok(()),
        }
    }

    /// Runs `command` to completion. Failures are reported as one error event
    /// and returned.
    pub fn handle(&self, command: &Command, events: &EventSink) -> Result<()> {
        debug!("Handling {}", command.name());
        let result = match command {
            Command::ListDatasets => self
                .list_datasets()
                .map(|files| events.emit(Event::Data { files })),
            Command::ListTilesets => self
                .list_tilesets()
                .map(|tilesets| events.emit(Event::Tilesets { tilesets })),
            _ => {
                events.emit(Event::HideProgressUi);
                let result = self.run_build(command, events);
                if let Err(e) = &result {
                    error!("{} failed: {}", command.name(), describe(e));
                }
                result
            }
        };
        if let Err(e) = &result {
            events.emit(Event::error(describe(e)));
        }
        match command {
            Command::ListDatasets | Command::ListTilesets => (),
            _ => events.emit(Event::ShowProgressUi),
        }
        result
    }
}

/// Receives commands on a channel and runs each on its own worker thread.
pub struct WorkflowController {
    commands: Option<Sender<Command>>,
    coordinator: Option<thread::JoinHandle<()>>,
}

impl WorkflowController {
    pub fn start(workflows: Workflows, events: Sender<Event>) -> Self {
        let (sender, receiver) = channel::unbounded::<Command>();
        let workflows = Arc::new(workflows);
        let coordinator = thread::spawn(move || {
            let running = WaitGroup::new();
            for command in receiver.iter() {
                let workflows = Arc::clone(&workflows);
                let events = EventSink::new(events.clone());
                let running = running.clone();
                thread::spawn(move || {
                    if workflows.handle(&command, &events).is_err() {
                        debug!("{} finished with an error", command.name());
                    }
                    drop(running);
                });
            }
            running.wait();
        });
        WorkflowController {
            commands: Some(sender),
            coordinator: Some(coordinator),
        }
    }

    pub fn submit(&self, command: Command) -> Result<()> {
        match &self.commands {
            Some(commands) if commands.send(command).is_ok() => Ok(()),
            _ => bail!("The workflow controller is stopped"),
        }
    }

    /// Stops accepting commands and waits for the running ones.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.commands.take();
        if let Some(coordinator) = self.coordinator.take() {
            if coordinator.join().is_err() {
                error!("The workflow coordinator panicked.");
            }
        }
    }
}

impl Drop for WorkflowController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn settings(root: &Path) -> Settings {
        Settings {
            data_dir: root.join("data"),
            tilesets_dir: root.join("tilesets"),
            tmp_dir: root.join("tmp"),
            options_dir: root.join("options"),
            public_url: "http://example.org/".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_list_datasets_and_tilesets() {
        let dir = TempDir::new("workflow").unwrap();
        let workflows = Workflows::new(settings(dir.path()));
        assert!(workflows.list_datasets().unwrap().is_empty());
        assert!(workflows.list_tilesets().unwrap().is_empty());

        fs::create_dir_all(dir.path().join("data/nested")).unwrap();
        for name in &["trees.geojson", "cloud.LAZ", "notes.txt", "a.zip"] {
            fs::write(dir.path().join("data").join(name), "").unwrap();
        }
        fs::create_dir_all(dir.path().join("tilesets/trees")).unwrap();
        fs::write(dir.path().join("tilesets/trees/tileset.json"), "{}").unwrap();
        fs::create_dir_all(dir.path().join("tilesets/partial")).unwrap();
        fs::create_dir_all(dir.path().join("tilesets/.trees-1234")).unwrap();
        fs::write(dir.path().join("tilesets/.trees-1234/tileset.json"), "{}").unwrap();

        let files = workflows.list_datasets().unwrap();
        let names: Vec<String> = files.iter().map(|f| f.file_name()).collect();
        assert_eq!(vec!["a.zip", "cloud.LAZ", "trees.geojson"], names);
        assert_eq!("http://example.org/data/trees.geojson", files[2].link);

        assert_eq!(
            vec![TilesetLink {
                name: "trees".to_string(),
                link: "http://example.org/tilesets/trees/tileset.json".to_string(),
            }],
            workflows.list_tilesets().unwrap()
        );
    }

    #[test]
    fn test_failed_build_reports_one_error() {
        let dir = TempDir::new("workflow").unwrap();
        let workflows = Workflows::new(settings(dir.path()));
        let (sender, receiver) = channel::unbounded();
        let command = Command::MeshTileset(Job {
            file: DatasetFile {
                name: "missing".to_string(),
                link: String::new(),
                extension: ".csv".to_string(),
            },
            config: serde_json::Value::Null,
        });
        assert!(workflows.handle(&command, &EventSink::new(sender)).is_err());
        let events: Vec<Event> = receiver.try_iter().collect();
        assert_eq!(Event::HideProgressUi, events[0]);
        assert_eq!(Some(&Event::ShowProgressUi), events.last());
        let errors: Vec<&Event> = events
            .iter()
            .filter(|e| match e {
                Event::Log(message) => message.level == crate::events::LogLevel::Error,
                _ => false,
            })
            .collect();
        assert_eq!(1, errors.len());
    }

    #[test]
    fn test_controller_waits_for_every_worker() {
        let dir = TempDir::new("workflow").unwrap();
        let (sender, receiver) = channel::unbounded();
        let controller = WorkflowController::start(Workflows::new(settings(dir.path())), sender);
        for _ in 0..64 {
            controller.submit(Command::ListTilesets).unwrap();
        }
        controller.shutdown();
        let events: Vec<Event> = receiver.iter().collect();
        assert_eq!(64, events.len());
        assert!(events.iter().all(|e| match e {
            Event::Tilesets { tilesets } => tilesets.is_empty(),
            _ => false,
        }));
    }

    #[test]
    fn test_tileset_name() {
        let dir = TempDir::new("workflow").unwrap();
        let workflows = Workflows::new(settings(dir.path()));
        let file = DatasetFile {
            name: "Trees 2020".to_string(),
            link: String::new(),
            extension: ".geojson".to_string(),
        };
        assert_eq!("trees_2020", workflows.tileset_name(&None, &file));
        assert_eq!("trees_2020", workflows.tileset_name(&Some(" ".to_string()), &file));
        assert_eq!("oaks", workflows.tileset_name(&Some("Oaks".to_string()), &file));
    }
}
