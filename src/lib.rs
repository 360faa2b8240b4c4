// Copyright 2016 Google Inc.
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

//! Turns vector datasets and point clouds into 3D Tiles tilesets. Geometry
//! is built in process, tiling is delegated to external tools.

#![allow(renamed_and_removed_lints)]
#![recursion_limit = "1024"]

// TODO(feuerste): Remove this, once https://github.com/rust-lang-nursery/error-chain/pull/255 is merged.
#[allow(deprecated)]
pub mod errors;
pub mod events;
pub mod expression;
pub mod feature;
pub mod instances;
pub mod math;
pub mod options;
pub mod options_store;
pub mod pdal;
pub mod polyhedron;
pub mod settings;
pub mod staging;
pub mod subprocess;
pub mod tileset;
pub mod tools;
pub mod utils;
pub mod workflow;
