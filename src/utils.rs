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

use crate::events::DatasetFile;
use crate::feature::SUPPORTED_EXTENSIONS;
use pbr::ProgressBar;
use std::io::Stdout;
use std::path::Path;
use std::time::Duration;

pub const PROGRESS_REFRESH_RATE_SECS: u64 = 2;

pub fn create_progress_bar(total: usize, message: &str) -> ProgressBar<Stdout> {
    let mut progress_bar = ProgressBar::new(total as u64);
    progress_bar.set_max_refresh_rate(Some(Duration::from_secs(PROGRESS_REFRESH_RATE_SECS)));
    progress_bar.message(&format!("{}: ", message));
    progress_bar
}

/// Splits `path` into a dataset name and a supported extension. Returns
/// `None` for unsupported files.
pub fn dataset_file(path: &Path, link: String) -> Option<DatasetFile> {
    let name = path.file_stem()?.to_string_lossy().into_owned();
    let extension = format!(".{}", path.extension()?.to_string_lossy());
    if !SUPPORTED_EXTENSIONS.contains(&extension.to_lowercase().as_str()) {
        return None;
    }
    Some(DatasetFile {
        name,
        link,
        extension,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_file() {
        let file = dataset_file(Path::new("static/data/Trees 2020.GeoJSON"), String::new()).unwrap();
        assert_eq!("Trees 2020", file.name);
        assert_eq!(".GeoJSON", file.extension);
        assert!(dataset_file(Path::new("notes.txt"), String::new()).is_none());
        assert!(dataset_file(Path::new("README"), String::new()).is_none());
    }
}
