use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use umb_core::errors::{ErrorInfo, UmbError};
use umb_core::{TrajectoryRecord, TrajectoryStore, TrajectoryWriter, Vec3, Window};

use crate::dcd::{read_header, DcdHeader, DcdWriter};

const EXTENSION: &str = "dcd";
const PARTIAL_SUFFIX: &str = "partial";
const PROBE_NAME: &str = ".umbrella-write-probe";

/// Trajectory files of one run, addressed by window.
#[derive(Debug, Clone)]
pub struct DcdStore {
    dir: PathBuf,
    atoms: usize,
    interval: usize,
    timestep_ps: f64,
}

impl DcdStore {
    /// Opens a store over an existing, writable directory.
    ///
    /// `interval` is the number of integrator steps between frames and
    /// `timestep_ps` the integrator step size.
    pub fn new(
        dir: impl Into<PathBuf>,
        atoms: usize,
        interval: usize,
        timestep_ps: f64,
    ) -> Result<Self, UmbError> {
        let dir = dir.into();
        ensure_writable_dir(&dir)?;
        Ok(Self {
            dir,
            atoms,
            interval,
            timestep_ps,
        })
    }

    /// Directory holding the trajectories.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the in-progress file for `window`.
    pub fn partial_location(&self, window: &Window) -> PathBuf {
        partial_path(&self.location(window))
    }
}

impl TrajectoryStore for DcdStore {
    type Writer = DcdFileWriter;

    fn location(&self, window: &Window) -> PathBuf {
        trajectory_path(&self.dir, window)
    }

    fn create(&self, window: &Window) -> Result<Self::Writer, UmbError> {
        let final_path = self.location(window);
        let partial = partial_path(&final_path);
        if final_path.exists() {
            fs::remove_file(&final_path).map_err(|err| resource("trajectory-remove", &final_path, err))?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&partial)
            .map_err(|err| resource("trajectory-create", &partial, err))?;
        let titles = [
            "umbrella window trajectory".to_string(),
            window.to_string(),
        ];
        let title_refs: Vec<&str> = titles.iter().map(String::as_str).collect();
        let writer = DcdWriter::new(
            BufWriter::new(file),
            self.atoms,
            self.interval,
            self.timestep_ps,
            &title_refs,
        )
        .map_err(|err| resource("trajectory-write", &partial, err))?;
        log::debug!("opened {}", partial.display());
        Ok(DcdFileWriter {
            inner: Some(writer),
            partial,
            final_path,
        })
    }

    fn completed_frames(&self, window: &Window) -> Result<Option<usize>, UmbError> {
        let path = self.location(window);
        if !path.exists() {
            return Ok(None);
        }
        let summary = match inspect(&path) {
            Ok(summary) => summary,
            Err(err) => {
                log::warn!("ignoring unreadable trajectory {}: {}", path.display(), err);
                return Ok(None);
            }
        };
        if !summary.consistent() || summary.header.atoms != self.atoms {
            log::warn!(
                "ignoring inconsistent trajectory {} (header frames {}, on disk {}, atoms {})",
                path.display(),
                summary.header.frames,
                summary.frames_on_disk,
                summary.header.atoms
            );
            return Ok(None);
        }
        Ok(Some(summary.frames_on_disk))
    }
}

/// Writer for one window. Output lives under a `.partial` name until
/// [`TrajectoryWriter::finish`] renames it.
pub struct DcdFileWriter {
    inner: Option<DcdWriter<BufWriter<File>>>,
    partial: PathBuf,
    final_path: PathBuf,
}

impl TrajectoryWriter for DcdFileWriter {
    fn write_frame(&mut self, positions: &[Vec3]) -> Result<(), UmbError> {
        let partial = &self.partial;
        let writer = self.inner.as_mut().ok_or_else(|| {
            UmbError::Resource(
                ErrorInfo::new("trajectory-closed", "writer already finished")
                    .with_context("path", partial.display().to_string()),
            )
        })?;
        writer
            .write_frame(positions)
            .map_err(|err| resource("trajectory-write", partial, err))
    }

    fn frames_written(&self) -> usize {
        self.inner.as_ref().map_or(0, DcdWriter::frames)
    }

    fn finish(mut self) -> Result<TrajectoryRecord, UmbError> {
        let writer = self.inner.take().ok_or_else(|| {
            UmbError::Resource(ErrorInfo::new("trajectory-closed", "writer already finished"))
        })?;
        let frames = writer.frames();
        let buffered = writer
            .finish()
            .map_err(|err| resource("trajectory-finalize", &self.partial, err))?;
        let file = buffered
            .into_inner()
            .map_err(|err| resource("trajectory-finalize", &self.partial, err.into_error()))?;
        file.sync_all()
            .map_err(|err| resource("trajectory-finalize", &self.partial, err))?;
        drop(file);
        fs::rename(&self.partial, &self.final_path)
            .map_err(|err| resource("trajectory-rename", &self.final_path, err))?;
        log::debug!("finalized {} ({frames} frames)", self.final_path.display());
        Ok(TrajectoryRecord {
            path: self.final_path.clone(),
            frames,
        })
    }
}

impl Drop for DcdFileWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.inner.take() {
            log::warn!(
                "trajectory {} left incomplete after {} frames",
                self.partial.display(),
                writer.frames()
            );
        }
    }
}

/// Header and on-disk frame count of a trajectory file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcdSummary {
    /// File inspected.
    pub path: PathBuf,
    /// Decoded header.
    pub header: DcdHeader,
    /// Whole frames present after the header.
    pub frames_on_disk: usize,
    /// Bytes that do not form a whole frame.
    pub trailing_bytes: u64,
}

impl DcdSummary {
    /// Header and body agree and no torn frame is present.
    pub fn consistent(&self) -> bool {
        self.header.frames == self.frames_on_disk && self.trailing_bytes == 0
    }
}

/// Reads the header of `path` and counts the frames stored after it.
pub fn inspect(path: &Path) -> Result<DcdSummary, UmbError> {
    let file = File::open(path).map_err(|err| resource("trajectory-open", path, err))?;
    let len = file
        .metadata()
        .map_err(|err| resource("trajectory-open", path, err))?
        .len();
    let mut reader = BufReader::new(file);
    let header = read_header(&mut reader).map_err(|err| resource("trajectory-header", path, err))?;
    let body_start = reader
        .stream_position()
        .map_err(|err| resource("trajectory-header", path, err))?;
    let body = len.saturating_sub(body_start);
    let frame_bytes = header.frame_bytes();
    let frames_on_disk = (body / frame_bytes) as usize;
    Ok(DcdSummary {
        path: path.to_path_buf(),
        frames_on_disk,
        trailing_bytes: body % frame_bytes,
        header,
    })
}

fn ensure_writable_dir(dir: &Path) -> Result<(), UmbError> {
    let metadata = fs::metadata(dir).map_err(|err| {
        UmbError::Config(
            ErrorInfo::new("output-dir-missing", err.to_string())
                .with_context("path", dir.display().to_string())
                .with_hint("create the trajectory directory before starting the run"),
        )
    })?;
    if !metadata.is_dir() {
        return Err(UmbError::Config(
            ErrorInfo::new("output-dir-missing", "trajectory path is not a directory")
                .with_context("path", dir.display().to_string()),
        ));
    }
    let probe = dir.join(PROBE_NAME);
    File::create(&probe)
        .and_then(|_| fs::remove_file(&probe))
        .map_err(|err| {
            UmbError::Config(
                ErrorInfo::new("output-dir-readonly", err.to_string())
                    .with_context("path", dir.display().to_string()),
            )
        })
}

/// Final trajectory path of `window` under `dir`.
pub fn trajectory_path(dir: &Path, window: &Window) -> PathBuf {
    dir.join(format!("{}.{EXTENSION}", window.file_stem()))
}

/// In-progress name of a trajectory at `final_path`.
pub fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

fn resource(code: &str, path: &Path, err: std::io::Error) -> UmbError {
    UmbError::Resource(
        ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
    )
}
