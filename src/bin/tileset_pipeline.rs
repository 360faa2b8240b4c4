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

use crossbeam::channel::{self, Receiver};
use error_chain::bail;
use log::{error, info, warn};
use pbr::ProgressBar;
use std::fs;
use std::io::{self, BufRead, Stdout, Write};
use std::path::{Path, PathBuf};
use structopt::StructOpt;
use tileset_pipeline::errors::*;
use tileset_pipeline::events::{Command, Event, Job, LogLevel, LogMessage};
use tileset_pipeline::math::parse_projection;
use tileset_pipeline::settings::Settings;
use tileset_pipeline::tileset::{
    DirectoryProbe, TileInfo, TileQuadtreeBuilder, TilesetOptions, INFO_FILE_NAME,
    TILESET_FILE_NAME,
};
use tileset_pipeline::utils::{create_progress_bar, dataset_file};
use tileset_pipeline::workflow::{describe, EventSink, WorkflowController, Workflows};

#[derive(StructOpt, Debug)]
#[structopt(name = "tileset_pipeline")]
struct CommandlineArguments {
    /// Settings file (JSON). Defaults are used for missing keys.
    #[structopt(long, parse(from_os_str))]
    settings: Option<PathBuf>,

    /// Overrides the data directory of the settings.
    #[structopt(long, parse(from_os_str))]
    data_dir: Option<PathBuf>,

    /// Overrides the tilesets directory of the settings.
    #[structopt(long, parse(from_os_str))]
    tilesets_dir: Option<PathBuf>,

    #[structopt(subcommand)]
    command: Subcommand,
}

#[derive(StructOpt, Debug)]
struct JobArguments {
    /// File name of the dataset in the data directory.
    file: String,

    /// Command configuration as JSON.
    #[structopt(long)]
    config: Option<String>,

    /// Command configuration read from a JSON file.
    #[structopt(long, parse(from_os_str), conflicts_with = "config")]
    config_file: Option<PathBuf>,
}

#[derive(StructOpt, Debug)]
enum Subcommand {
    /// Reads commands as JSON lines from stdin and writes events as JSON lines
    /// to stdout.
    Serve,
    ListDatasets,
    ListTilesets,
    /// Extrudes vector features and tiles them with pg2b3dm.
    MeshTileset(JobArguments),
    /// Places one model per feature and tiles them with i3dm.export.
    PointInstanceTileset(JobArguments),
    /// Tiles a LAS/LAZ file with py3dtiles.
    PointCloudTileset(JobArguments),
    /// Runs a PDAL processing pipeline over a LAS/LAZ file.
    ProcessLas(JobArguments),
    PointCloudCount(JobArguments),
    PointCloudProjection(JobArguments),
    /// Reconstructs a surface from a point cloud and tiles it.
    ReconstructedMeshTileset(JobArguments),
    /// Writes tileset.json for the output of the mesh tiler in `directory`.
    TilesetJson {
        #[structopt(parse(from_os_str))]
        directory: PathBuf,
        #[structopt(long, default_value = "EPSG:4326")]
        crs: String,
        #[structopt(long, default_value = "0", allow_hyphen_values = true)]
        z_offset: f64,
        #[structopt(long, default_value = "1")]
        scale: f64,
        /// Comma separated geometric errors per level.
        #[structopt(long, use_delimiter = true)]
        geometric_errors: Vec<f64>,
    },
}

fn job(arguments: &JobArguments, settings: &Settings) -> Result<Job> {
    let file = match dataset_file(Path::new(&arguments.file), settings.data_link(&arguments.file)) {
        Some(file) => file,
        None => bail!(ErrorKind::UnsupportedExtension(arguments.file.clone())),
    };
    let config = match (&arguments.config, &arguments.config_file) {
        (Some(config), _) => serde_json::from_str(config).chain_err(|| "Invalid --config")?,
        (None, Some(path)) => {
            let contents = fs::read_to_string(path)
                .chain_err(|| format!("Could not read {}", path.display()))?;
            serde_json::from_str(&contents)
                .chain_err(|| format!("Could not parse {}", path.display()))?
        }
        (None, None) => serde_json::Value::Null,
    };
    Ok(Job { file, config })
}

/// Logs events and shows progress bars.
fn print_events(receiver: Receiver<Event>) {
    let mut progress: Option<(String, ProgressBar<Stdout>)> = None;
    for event in receiver.iter() {
        match event {
            Event::Progress {
                message,
                processed,
                total,
            } => {
                let restart = progress
                    .as_ref()
                    .map_or(true, |(current, _)| *current != message);
                if restart {
                    progress = Some((message.clone(), create_progress_bar(total, &message)));
                }
                if let Some((_, progress_bar)) = progress.as_mut() {
                    progress_bar.set(processed as u64);
                    if processed >= total {
                        progress_bar.finish();
                    }
                }
                if processed >= total {
                    progress = None;
                }
            }
            Event::Log(LogMessage {
                message,
                level,
                options,
            }) => match (level, options) {
                (LogLevel::Error, _) => error!("{}", message),
                (LogLevel::Success, Some(options)) => {
                    info!("{} ({})", options.action.label, options.action.link)
                }
                (_, _) => info!("{}", message),
            },
            Event::Data { files } => {
                for file in files {
                    println!("{}\t{}", file.file_name(), file.link);
                }
            }
            Event::Tilesets { tilesets } => {
                for tileset in tilesets {
                    println!("{}\t{}", tileset.name, tileset.link);
                }
            }
            Event::HideProgressUi | Event::ShowProgressUi => (),
        }
    }
}

fn run_once(workflows: &Workflows, command: Command) -> Result<()> {
    let (sender, receiver) = channel::unbounded();
    crossbeam::scope(|scope| {
        scope.spawn(move |_| print_events(receiver));
        workflows.handle(&command, &EventSink::new(sender))
    })
    .map_err(|_| Error::from("The event printer panicked"))?
}

fn write_events(receiver: Receiver<Event>) -> Result<()> {
    let stdout = io::stdout();
    for event in receiver.iter() {
        let mut out = stdout.lock();
        serde_json::to_writer(&mut out, &event)?;
        writeln!(out)?;
        out.flush()?;
    }
    Ok(())
}

fn serve(workflows: Workflows) -> Result<()> {
    let (sender, receiver) = channel::unbounded();
    crossbeam::scope(|scope| {
        let writer = scope.spawn(move |_| write_events(receiver));
        let rejected = EventSink::new(sender.clone());
        let controller = WorkflowController::start(workflows, sender);
        controller.submit(Command::ListDatasets)?;
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Command>(&line) {
                Ok(command) => controller.submit(command)?,
                Err(e) => {
                    warn!("Ignoring command {}: {}", line, e);
                    rejected.emit(Event::error(format!("Invalid command: {}", e)));
                }
            }
        }
        info!("Input closed, waiting for running jobs.");
        controller.shutdown();
        drop(rejected);
        writer
            .join()
            .map_err(|_| Error::from("The event writer panicked"))?
    })
    .map_err(|_| Error::from("The event server panicked"))?
}

fn tileset_json(
    directory: &Path,
    crs: &str,
    z_offset: f64,
    scale: f64,
    geometric_errors: Vec<f64>,
) -> Result<()> {
    let info = TileInfo::from_path(&directory.join(INFO_FILE_NAME))?;
    let mut options = TilesetOptions {
        z_offset,
        scale,
        ..Default::default()
    };
    if !geometric_errors.is_empty() {
        options.geometric_errors = geometric_errors;
    }
    let builder = TileQuadtreeBuilder::new(info, options, parse_projection(crs)?)?;
    let tileset = builder.build(&DirectoryProbe {
        directory: directory.to_path_buf(),
    });
    let path = directory.join(TILESET_FILE_NAME);
    tileset.write(&path)?;
    info!(
        "Wrote {} with {} tiles.",
        path.display(),
        tileset.root.iter().filter(|n| n.content.is_some()).count()
    );
    Ok(())
}

fn run(args: CommandlineArguments) -> Result<()> {
    let mut settings = match &args.settings {
        Some(path) => Settings::from_path(path)?,
        None => Settings::default(),
    };
    if let Some(data_dir) = args.data_dir {
        settings.data_dir = data_dir;
    }
    if let Some(tilesets_dir) = args.tilesets_dir {
        settings.tilesets_dir = tilesets_dir;
    }

    let command = match &args.command {
        Subcommand::Serve => return serve(Workflows::new(settings)),
        Subcommand::TilesetJson {
            directory,
            crs,
            z_offset,
            scale,
            geometric_errors,
        } => return tileset_json(directory, crs, *z_offset, *scale, geometric_errors.clone()),
        Subcommand::ListDatasets => Command::ListDatasets,
        Subcommand::ListTilesets => Command::ListTilesets,
        Subcommand::MeshTileset(arguments) => Command::MeshTileset(job(arguments, &settings)?),
        Subcommand::PointInstanceTileset(arguments) => {
            Command::PointInstanceTileset(job(arguments, &settings)?)
        }
        Subcommand::PointCloudTileset(arguments) => {
            Command::PointCloudTileset(job(arguments, &settings)?)
        }
        Subcommand::ProcessLas(arguments) => Command::ProcessLas(job(arguments, &settings)?),
        Subcommand::PointCloudCount(arguments) => {
            Command::PointCloudCount(job(arguments, &settings)?)
        }
        Subcommand::PointCloudProjection(arguments) => {
            Command::PointCloudProjection(job(arguments, &settings)?)
        }
        Subcommand::ReconstructedMeshTileset(arguments) => {
            Command::ReconstructedMeshTileset(job(arguments, &settings)?)
        }
    };
    run_once(&Workflows::new(settings), command)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = CommandlineArguments::from_args();
    if let Err(e) = run(args) {
        error!("{}", describe(&e));
        std::process::exit(1);
    }
}
