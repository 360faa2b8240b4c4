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

//! Running external tools. A `ToolJob` is a plain description of a process,
//! `run` executes it and streams its output line by line into an
//! `OutputSink` while it is running.

use crate::errors::*;
use error_chain::bail;
use log::debug;
use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Receives tool output as it arrives, one line at a time.
pub trait OutputSink {
    fn line(&mut self, stream: Stream, line: &str);
}

impl<F> OutputSink for F
where
    F: FnMut(Stream, &str),
{
    fn line(&mut self, stream: Stream, line: &str) {
        self(stream, line)
    }
}

/// Keeps all output in memory.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl CollectingSink {
    pub fn stdout_text(&self) -> String {
        self.stdout.join("\n")
    }
}

impl OutputSink for CollectingSink {
    fn line(&mut self, stream: Stream, line: &str) {
        match stream {
            Stream::Stdout => self.stdout.push(line.to_string()),
            Stream::Stderr => self.stderr.push(line.to_string()),
        }
    }
}

/// Runs a program inside a named environment, e.g. `micromamba run -n <env>`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentWrapper {
    pub program: String,
    pub environment: String,
}

impl EnvironmentWrapper {
    pub fn micromamba(environment: &str) -> Self {
        EnvironmentWrapper {
            program: "micromamba".to_string(),
            environment: environment.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolJob {
    pub program: String,
    pub args: Vec<String>,
    pub wrapper: Option<EnvironmentWrapper>,
}

impl ToolJob {
    pub fn new(program: impl Into<String>) -> Self {
        ToolJob {
            program: program.into(),
            args: Vec::new(),
            wrapper: None,
        }
    }

    pub fn arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToString,
    {
        self.args.extend(args.into_iter().map(|a| a.to_string()));
        self
    }

    pub fn wrapped(mut self, wrapper: Option<EnvironmentWrapper>) -> Self {
        self.wrapper = wrapper;
        self
    }

    /// The full argument vector, including the environment wrapper.
    pub fn command_line(&self) -> Vec<String> {
        let mut line = match &self.wrapper {
            Some(wrapper) => vec![
                wrapper.program.clone(),
                "run".to_string(),
                "-n".to_string(),
                wrapper.environment.clone(),
            ],
            None => Vec::new(),
        };
        line.push(self.program.clone());
        line.extend(self.args.iter().cloned());
        line
    }
}

impl fmt::Display for ToolJob {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.command_line().join(" "))
    }
}

fn forward<R: Read>(reader: R, stream: Stream, tx: &crossbeam::channel::Sender<(Stream, String)>) {
    for line in BufReader::new(reader).split(b'\n') {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let text = String::from_utf8_lossy(&line);
        if tx
            .send((stream, text.trim_end_matches('\r').to_string()))
            .is_err()
        {
            break;
        }
    }
}

/// Waits for the child when dropped, so that it is reaped on every exit path.
struct ReapedChild(Child);

impl Drop for ReapedChild {
    fn drop(&mut self) {
        if let Err(e) = self.0.wait() {
            debug!("Could not wait for child {}: {}", self.0.id(), e);
        }
    }
}

/// Runs the job to completion and returns its exit code, `None` if it was
/// terminated by a signal.
pub fn run(job: &ToolJob, sink: &mut dyn OutputSink) -> Result<Option<i32>> {
    let command_line = job.command_line();
    debug!("Running {}", job);
    let mut child = ReapedChild(
        Command::new(&command_line[0])
            .args(&command_line[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .chain_err(|| ErrorKind::ToolSpawn(command_line[0].clone()))?,
    );

    let stdout = child.0.stdout.take();
    let stderr = child.0.stderr.take();
    let readers = crossbeam::scope(|s| {
        let (tx, rx) = crossbeam::channel::unbounded::<(Stream, String)>();
        if let Some(stdout) = stdout {
            let tx = tx.clone();
            s.spawn(move |_| forward(stdout, Stream::Stdout, &tx));
        }
        if let Some(stderr) = stderr {
            let tx = tx.clone();
            s.spawn(move |_| forward(stderr, Stream::Stderr, &tx));
        }
        // the channel closes once both readers hit end of file
        drop(tx);
        for (stream, line) in rx.iter() {
            sink.line(stream, &line);
        }
    });

    let status = child.0.wait()?;
    debug!("{} exited with {}", job.program, status);
    readers.map_err(|_| Error::from(format!("Output reader of \"{}\" panicked", job.program)))?;
    Ok(status.code())
}

/// Like `run`, but fails on a non-zero exit code and on stderr lines
/// containing one of `fatal_markers`.
pub fn run_checked(
    job: &ToolJob,
    fatal_markers: &[String],
    sink: &mut dyn OutputSink,
) -> Result<()> {
    let mut fatal = None;
    let code = {
        let mut checking_sink = |stream: Stream, line: &str| {
            if stream == Stream::Stderr
                && fatal.is_none()
                && fatal_markers.iter().any(|marker| line.contains(marker.as_str()))
            {
                fatal = Some(line.to_string());
            }
            sink.line(stream, line);
        };
        run(job, &mut checking_sink)?
    };
    if let Some(line) = fatal {
        bail!(ErrorKind::ToolFatal(job.program.clone(), line));
    }
    if code != Some(0) {
        bail!(ErrorKind::ToolFailed(job.program.clone(), code));
    }
    Ok(())
}

/// A uniquely named file that is removed when dropped.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    /// Reserves `<directory>/<prefix>-<uuid>.<extension>`. The file itself is
    /// not created.
    pub fn new(directory: &Path, prefix: &str, extension: &str) -> Result<Self> {
        fs::create_dir_all(directory)
            .chain_err(|| format!("Could not create {}", directory.display()))?;
        let name = format!("{}-{}.{}", prefix, Uuid::new_v4(), extension);
        Ok(TempArtifact {
            path: directory.join(name),
        })
    }

    /// Reserves a name and writes `contents` to it.
    pub fn with_contents(
        directory: &Path,
        prefix: &str,
        extension: &str,
        contents: &[u8],
    ) -> Result<Self> {
        let artifact = Self::new(directory, prefix, extension)?;
        fs::write(&artifact.path, contents)
            .chain_err(|| format!("Could not write {}", artifact.path.display()))?;
        Ok(artifact)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.path.is_dir() {
            let _ = fs::remove_dir_all(&self.path);
        } else if self.path.exists() {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// An output directory that is built under a hidden sibling name and only
/// moved to its final place by `commit`. Dropped uncommitted, the partial
/// build is removed and a previous directory at the target stays as it was.
#[derive(Debug)]
pub struct StagedDirectory {
    staging: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedDirectory {
    /// Reserves `<parent>/.<name>-<uuid>` next to `target`. The staging
    /// directory itself is not created.
    pub fn new(target: &Path) -> Result<Self> {
        let (parent, name) = match (target.parent(), target.file_name()) {
            (Some(parent), Some(name)) => (parent, name.to_string_lossy()),
            _ => bail!(ErrorKind::InvalidInput(format!(
                "{} is not a valid output directory",
                target.display()
            ))),
        };
        fs::create_dir_all(parent)
            .chain_err(|| format!("Could not create {}", parent.display()))?;
        Ok(StagedDirectory {
            staging: parent.join(format!(".{}-{}", name, Uuid::new_v4())),
            target: target.to_path_buf(),
            committed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.staging
    }

    /// Replaces the target with the staged directory.
    pub fn commit(mut self) -> Result<PathBuf> {
        if self.target.exists() {
            debug!("Replacing {}", self.target.display());
            fs::remove_dir_all(&self.target)
                .chain_err(|| format!("Could not remove {}", self.target.display()))?;
        }
        fs::rename(&self.staging, &self.target).chain_err(|| {
            format!(
                "Could not move {} to {}",
                self.staging.display(),
                self.target.display()
            )
        })?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for StagedDirectory {
    fn drop(&mut self) {
        if !self.committed && self.staging.exists() {
            let _ = fs::remove_dir_all(&self.staging);
        }
    }
}

/// Fails if `path` exists, so that no tool overwrites a previous result.
pub fn ensure_output_absent(path: &Path) -> Result<()> {
    if path.exists() {
        bail!(ErrorKind::OutputExists(path.to_path_buf()));
    }
    Ok(())
}
