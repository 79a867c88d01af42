//! Persistence of emitted samples.

use std::io::Write;

use anyhow::{Context, Result, bail};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use tracing::error;

use crate::error::{ErrorCode, SightError};
use crate::models::sample::{Sample, StableSample};

pub trait SampleSink {
    fn persist(&mut self, sample: &Sample) -> Result<()>;
}

impl SampleSink for Vec<Sample> {
    fn persist(&mut self, sample: &Sample) -> Result<()> {
        self.push(sample.clone());
        Ok(())
    }
}

/// Writes one JSON line per sample.
///
/// With a source directory, each stable sample's source is also stored at
/// `<dir>/<baseline commit>/not-refactored/<baseline path>`.
pub struct NdjsonSink<W: Write> {
    writer: W,
    source_dir: Option<Utf8PathBuf>,
}

impl<W: Write> NdjsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            source_dir: None,
        }
    }

    pub fn with_source_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.source_dir = Some(dir.into());
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn store_source(dir: &Utf8Path, sample: &StableSample) -> Result<()> {
        let relative = Utf8Path::new(&sample.baseline_path);
        if !relative
            .components()
            .all(|c| matches!(c, Utf8Component::Normal(_)))
        {
            bail!(SightError::new(
                ErrorCode::PersistError,
                format!("Refusing to store source outside {dir}: {relative}"),
            ));
        }
        let target = dir
            .join(&sample.baseline_commit_id)
            .join("not-refactored")
            .join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {parent}"))?;
        }
        std::fs::write(&target, &sample.source)
            .with_context(|| format!("Failed to write {target}"))?;
        Ok(())
    }
}

impl<W: Write> SampleSink for NdjsonSink<W> {
    fn persist(&mut self, sample: &Sample) -> Result<()> {
        if let Sample::Stable(stable) = sample
            && let Some(dir) = &self.source_dir
        {
            Self::store_source(dir, stable)?;
        }

        let mut line = serde_json::to_string(sample)?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.flush())
            .map_err(|e| {
                SightError::new(
                    ErrorCode::PersistError,
                    format!("Failed to write sample for {}: {e}", sample.file_path()),
                )
            })?;
        Ok(())
    }
}

/// Persist each sample independently; returns how many were lost.
pub fn persist_all(sink: &mut dyn SampleSink, samples: &[Sample]) -> usize {
    let mut failures = 0;
    for sample in samples {
        if let Err(e) = sink.persist(sample) {
            error!(
                path = %sample.file_path(),
                commit = %sample.commit_id(),
                error = %e,
                "Failed to persist sample"
            );
            failures += 1;
        }
    }
    failures
}
