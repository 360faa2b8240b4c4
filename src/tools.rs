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

//! Argument contracts of the external tools.

use crate::settings::DatabaseSettings;
use crate::subprocess::{EnvironmentWrapper, ToolJob};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How to start one tool: program, leading arguments (e.g. the script of an
/// interpreter) and an optional environment to run it in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub environment: Option<String>,
}

impl ToolCommand {
    pub fn new(program: &str) -> Self {
        ToolCommand {
            program: program.to_string(),
            args: Vec::new(),
            environment: None,
        }
    }

    pub fn with_args(mut self, args: &[&str]) -> Self {
        self.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn in_environment(mut self, environment: &str) -> Self {
        self.environment = Some(environment.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdalInfo {
    Metadata,
    Stats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Py3dtilesParams {
    pub crs_in: Option<String>,
    pub classification: bool,
    pub intensity: bool,
}

impl Default for Py3dtilesParams {
    fn default() -> Self {
        Py3dtilesParams {
            crs_in: None,
            classification: true,
            intensity: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Pg2b3dmParams {
    pub max_geometric_error: f64,
    pub min_geometric_error: f64,
    pub double_sided: bool,
    pub max_features_per_tile: u32,
}

impl Default for Pg2b3dmParams {
    fn default() -> Self {
        Pg2b3dmParams {
            max_geometric_error: 250.,
            min_geometric_error: 0.,
            double_sided: false,
            max_features_per_tile: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct I3dmParams {
    pub max_geometric_error: f64,
    pub max_features_per_tile: u32,
}

impl Default for I3dmParams {
    fn default() -> Self {
        I3dmParams {
            max_geometric_error: 5000.,
            max_features_per_tile: 1000,
        }
    }
}

/// Parameters of the mesh tiler, which splits a mesh into a quadtree of
/// `{level}_{y}_{x}.glb` files and writes `info.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MeshTilerParams {
    pub depth: u8,
    pub mesh_faces: u64,
    pub tile_faces: u64,
    pub remove_doubles_factor: f64,
}

impl Default for MeshTilerParams {
    fn default() -> Self {
        MeshTilerParams {
            depth: 3,
            mesh_faces: 500_000,
            tile_faces: 40_000,
            remove_doubles_factor: 0.025,
        }
    }
}

/// Parameters of the poisson surface reconstruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconstructionParams {
    pub depth: u32,
    pub scale: f64,
    pub remove_threshold: f64,
    pub voxel_multiplier: f64,
}

impl Default for ReconstructionParams {
    fn default() -> Self {
        ReconstructionParams {
            depth: 10,
            scale: 1.1,
            remove_threshold: 0.002,
            voxel_multiplier: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tools {
    /// Program that runs a tool inside its environment.
    pub runner: String,
    pub pdal: ToolCommand,
    pub py3dtiles: ToolCommand,
    pub pg2b3dm: ToolCommand,
    pub i3dm_export: ToolCommand,
    pub mesh_tiler: ToolCommand,
    pub reconstruction: ToolCommand,
    pub psql: ToolCommand,
}

impl Default for Tools {
    fn default() -> Self {
        Tools {
            runner: "micromamba".to_string(),
            pdal: ToolCommand::new("pdal").in_environment("pdal_env"),
            py3dtiles: ToolCommand::new("py3dtiles").in_environment("tools_env"),
            pg2b3dm: ToolCommand::new("pg2b3dm"),
            i3dm_export: ToolCommand::new("i3dm.export"),
            mesh_tiler: ToolCommand::new("blender").with_args(&[
                "-b",
                "-P",
                "scripts/ply_to_tileset.py",
                "--",
            ]),
            reconstruction: ToolCommand::new("python3")
                .with_args(&["scripts/xyz_to_mesh.py"])
                .in_environment("tools_env"),
            psql: ToolCommand::new("psql"),
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl Tools {
    fn job(&self, command: &ToolCommand) -> ToolJob {
        ToolJob::new(command.program.as_str())
            .args(&command.args)
            .wrapped(command.environment.as_ref().map(|environment| EnvironmentWrapper {
                program: self.runner.clone(),
                environment: environment.clone(),
            }))
    }

    pub fn pdal_info(&self, input: &Path, info: PdalInfo) -> ToolJob {
        let flag = match info {
            PdalInfo::Metadata => "--metadata",
            PdalInfo::Stats => "--stats",
        };
        self.job(&self.pdal)
            .arg("info")
            .arg(path_arg(input))
            .arg(flag)
    }

    pub fn pdal_pipeline(&self, descriptor: &Path) -> ToolJob {
        self.job(&self.pdal).arg("pipeline").arg(path_arg(descriptor))
    }

    pub fn py3dtiles_convert(
        &self,
        input: &Path,
        output_dir: &Path,
        params: &Py3dtilesParams,
    ) -> ToolJob {
        let mut job = self
            .job(&self.py3dtiles)
            .arg("convert")
            .arg(path_arg(input))
            .arg("--overwrite");
        if params.classification {
            job = job.arg("--classification");
        }
        if params.intensity {
            job = job.arg("--intensity");
        }
        job = job
            .args(&["--color_scale", "255", "--out"])
            .arg(path_arg(output_dir));
        if let Some(crs_in) = &params.crs_in {
            job = job.arg("--srs_in").arg(crs_in);
        }
        job.args(&["--srs_out", "4978"])
    }

    pub fn pg2b3dm(
        &self,
        database: &DatabaseSettings,
        output_dir: &Path,
        table: &str,
        geometry_column: &str,
        attributes: &[String],
        params: &Pg2b3dmParams,
    ) -> ToolJob {
        self.job(&self.pg2b3dm)
            .arg("-h")
            .arg(&database.host)
            .arg("-p")
            .arg(database.port)
            .arg("-d")
            .arg(&database.database)
            .arg("-U")
            .arg(&database.user)
            .arg("-o")
            .arg(path_arg(output_dir))
            .arg("-c")
            .arg(geometry_column)
            .arg("-t")
            .arg(table)
            .arg("-a")
            .arg(attributes.join(","))
            .arg("-g")
            .arg(format!(
                "{},{}",
                params.max_geometric_error, params.min_geometric_error
            ))
            .arg("--double_sided")
            .arg(params.double_sided)
            .args(&["--use_implicit_tiling", "false"])
            .arg("--max_features_per_tile")
            .arg(params.max_features_per_tile)
    }

    pub fn i3dm_export(
        &self,
        database: &DatabaseSettings,
        table: &str,
        output_dir: &Path,
        geometry_column: &str,
        params: &I3dmParams,
    ) -> ToolJob {
        self.job(&self.i3dm_export)
            .arg("-c")
            .arg(database.npgsql_connection())
            .arg("-t")
            .arg(table)
            .arg("-o")
            .arg(path_arg(output_dir))
            .args(&["-f", "cesium", "-g"])
            .arg(params.max_geometric_error)
            .args(&[
                "--use_external_model",
                "true",
                "--use_scale_non_uniform",
                "false",
                "--geometrycolumn",
            ])
            .arg(geometry_column)
            .arg("--max_features_per_tile")
            .arg(params.max_features_per_tile)
            .args(&[
                "--use_gpu_instancing",
                "false",
                "--boundingvolume_heights",
                "0,10",
            ])
    }

    pub fn mesh_tiler(
        &self,
        input: &Path,
        output_dir: &Path,
        params: &MeshTilerParams,
        image: Option<&Path>,
    ) -> ToolJob {
        let job = self
            .job(&self.mesh_tiler)
            .arg(path_arg(input))
            .arg(path_arg(output_dir))
            .arg(params.depth)
            .arg(params.mesh_faces)
            .arg(params.tile_faces)
            .arg(params.remove_doubles_factor);
        match image {
            Some(image) => job.arg(path_arg(image)),
            None => job,
        }
    }

    pub fn reconstruction(
        &self,
        input: &Path,
        output: &Path,
        params: &ReconstructionParams,
    ) -> ToolJob {
        self.job(&self.reconstruction)
            .arg(path_arg(input))
            .arg(path_arg(output))
            .arg("--depth")
            .arg(params.depth)
            .arg("--scale")
            .arg(params.scale)
            .arg("--remove-threshold")
            .arg(params.remove_threshold)
            .arg("--voxel-multiplier")
            .arg(params.voxel_multiplier)
    }

    pub fn psql(&self, database: &DatabaseSettings, script: &Path) -> ToolJob {
        self.job(&self.psql)
            .arg(database.conninfo())
            .args(&["-v", "ON_ERROR_STOP=1", "-q", "-f"])
            .arg(path_arg(script))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_pdal_runs_in_its_environment() {
        let job = Tools::default().pdal_info(Path::new("data/cloud.las"), PdalInfo::Metadata);
        assert_eq!(
            vec!["micromamba", "run", "-n", "pdal_env", "pdal", "info", "data/cloud.las", "--metadata"],
            job.command_line()
        );
        let job = Tools::default().pdal_pipeline(Path::new("tmp/pipeline.json"));
        assert_eq!(vec!["pipeline", "tmp/pipeline.json"], job.args);
    }

    #[test]
    fn test_py3dtiles_arguments() {
        let params = Py3dtilesParams {
            crs_in: Some("EPSG:6707".to_string()),
            classification: true,
            intensity: true,
        };
        let job = Tools::default().py3dtiles_convert(
            Path::new("data/cloud.las"),
            Path::new("tilesets/cloud"),
            &params,
        );
        assert_eq!(
            vec![
                "convert", "data/cloud.las", "--overwrite", "--classification", "--intensity",
                "--color_scale", "255", "--out", "tilesets/cloud", "--srs_in", "EPSG:6707",
                "--srs_out", "4978"
            ],
            job.args
        );
    }

    #[test]
    fn test_pg2b3dm_arguments() {
        let database = DatabaseSettings::default();
        let job = Tools::default().pg2b3dm(
            &database,
            Path::new("tilesets/buildings"),
            "buildings",
            "geom",
            &["height".to_string(), "name".to_string()],
            &Pg2b3dmParams::default(),
        );
        let port = database.port.to_string();
        let expected: Vec<String> = vec![
            "-h", database.host.as_str(), "-p", port.as_str(), "-d", database.database.as_str(),
            "-U", database.user.as_str(), "-o", "tilesets/buildings", "-c", "geom", "-t", "buildings",
            "-a", "height,name", "-g", "250,0", "--double_sided", "false",
            "--use_implicit_tiling", "false", "--max_features_per_tile", "100",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert_eq!(expected, job.args);
        assert!(job.wrapper.is_none());
    }

    #[test]
    fn test_i3dm_export_arguments() {
        let database = DatabaseSettings::default();
        let job = Tools::default().i3dm_export(
            &database,
            "trees",
            Path::new("tilesets/trees"),
            "geom",
            &I3dmParams::default(),
        );
        assert_eq!("i3dm.export", job.program);
        assert_eq!(database.npgsql_connection(), job.args[1]);
        assert_eq!(
            vec!["-g", "5000"],
            job.args[8..10].iter().map(String::as_str).collect::<Vec<_>>()
        );
        assert!(job.args.ends_with(&[
            "--use_gpu_instancing".to_string(),
            "false".to_string(),
            "--boundingvolume_heights".to_string(),
            "0,10".to_string()
        ]));
    }

    #[test]
    fn test_mesh_tiler_and_reconstruction_arguments() {
        let tools = Tools::default();
        let job = tools.mesh_tiler(
            Path::new("mesh.ply"),
            Path::new("out"),
            &MeshTilerParams::default(),
            Some(&PathBuf::from("texture.png")),
        );
        assert_eq!(
            vec!["blender", "-b", "-P", "scripts/ply_to_tileset.py", "--", "mesh.ply", "out", "3", "500000", "40000", "0.025", "texture.png"],
            job.command_line()
        );

        let job = tools.reconstruction(Path::new("in.xyz"), Path::new("out.ply"), &ReconstructionParams::default());
        assert_eq!(
            vec![
                "scripts/xyz_to_mesh.py", "in.xyz", "out.ply", "--depth", "10", "--scale", "1.1",
                "--remove-threshold", "0.002", "--voxel-multiplier", "0.15"
            ],
            job.args
        );
    }

    #[test]
    fn test_psql_arguments() {
        let database = DatabaseSettings::default();
        let job = Tools::default().psql(&database, Path::new("tmp/table.sql"));
        let conninfo = database.conninfo();
        assert_eq!(
            vec![conninfo.as_str(), "-v", "ON_ERROR_STOP=1", "-q", "-f", "tmp/table.sql"],
            job.args.iter().map(String::as_str).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_tool_command_from_json() {
        let command: ToolCommand = serde_json::from_str(r#"{"program": "/opt/bin/pdal"}"#).unwrap();
        assert_eq!(ToolCommand::new("/opt/bin/pdal"), command);
    }
}
