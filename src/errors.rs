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

use error_chain::error_chain;
use std::io;
use std::path::PathBuf;

error_chain! {
    foreign_links {
        Io(io::Error);
        Json(serde_json::Error);
        GeoJson(geojson::Error);
        Zip(zip::result::ZipError);
        Shapefile(shapefile::Error);
        WalkDir(walkdir::Error);
    }

    errors {
        UnsupportedExtension(file: String) {
            description("unsupported file extension")
            display("The file \"{}\" has an unsupported extension. Supported are {}.",
                    file, crate::feature::SUPPORTED_EXTENSIONS.join(", "))
        }
        InvalidInput(message: String) {
            description("invalid input data")
            display("Invalid input: {}", message)
        }
        OutputExists(path: PathBuf) {
            description("output already exists")
            display("Please change output name. A file called \"{}\" already exists", path.display())
        }
        ToolSpawn(program: String) {
            description("could not start external tool")
            display("Could not start \"{}\". Is it installed and on the PATH?", program)
        }
        ToolFailed(program: String, code: Option<i32>) {
            description("external tool failed")
            display("\"{}\" failed with exit code {}", program,
                    code.map(|c| c.to_string()).unwrap_or_else(|| "none (terminated by signal)".to_string()))
        }
        ToolFatal(program: String, line: String) {
            description("external tool reported a fatal error")
            display("\"{}\" reported a fatal error: {}", program, line)
        }
        InvalidGeometricErrors(errors: Vec<f64>) {
            description("invalid geometric error sequence")
            display("Geometric errors must be a non-empty, non-increasing sequence, got {:?}", errors)
        }
        UnknownProjection(name: String) {
            description("unknown projection")
            display("Unknown projection \"{}\". Use EPSG:4326, EPSG:3857 or local:<lon>,<lat>,<height>", name)
        }
        InvalidFormula(formula: String, reason: String) {
            description("invalid formula")
            display("Could not parse formula \"{}\": {}", formula, reason)
        }
    }
}
