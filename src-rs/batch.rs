//! Sequential job orchestration and result export.
//!
//! Jobs are processed one at a time in input order. A failed job records its
//! message and the loop moves on; nothing aborts the batch and nothing is
//! retried.

use crate::error::StudioError;
use crate::gateway::EditGateway;
use crate::media::{ImagePayload, SourceImage};
use crate::util::{ensure_parent_dir, sanitize_file_name, timestamp_iso};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Error,
}

/// Per-image status. `result` is set only when done, `error` only on error.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub image_id: String,
    pub name: String,
    status: JobStatus,
    result: Option<ImagePayload>,
    error: Option<String>,
}

impl BatchJob {
    pub fn pending(image: &SourceImage) -> Self {
        Self {
            image_id: image.id.clone(),
            name: image.name.clone(),
            status: JobStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn result(&self) -> Option<&ImagePayload> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn start(&mut self) {
        self.status = JobStatus::Processing;
        self.result = None;
        self.error = None;
    }

    fn finish(&mut self, outcome: Result<ImagePayload, String>) {
        match outcome {
            Ok(payload) => {
                self.status = JobStatus::Done;
                self.result = Some(payload);
            }
            Err(message) => {
                self.status = JobStatus::Error;
                self.error = Some(message);
            }
        }
    }

    /// Swaps in a post-processed result; only valid once done.
    pub(crate) fn replace_result(&mut self, payload: ImagePayload) -> bool {
        if self.status != JobStatus::Done {
            return false;
        }
        self.result = Some(payload);
        true
    }

    pub fn to_json(&self) -> Value {
        json!({
            "image_id": self.image_id,
            "name": self.name,
            "status": self.status,
            "result_mime": self.result.as_ref().map(|r| r.mime.clone()),
            "result_bytes": self.result.as_ref().map(|r| r.bytes.len()),
            "error": self.error,
        })
    }
}

/// Runs one job against the gateway, reporting both transitions.
pub fn process_job<G, F>(
    job: &mut BatchJob,
    gateway: &G,
    bytes: &[u8],
    mime: &str,
    prompt: &str,
    observer: &mut F,
) where
    G: EditGateway + ?Sized,
    F: FnMut(&BatchJob),
{
    job.start();
    observer(job);
    let outcome = gateway.edit_image(bytes, mime, prompt).map_err(|err| {
        warn!(image = %job.name, kind = err.kind(), "edit failed: {err}");
        format!("Failed to process {}: {err}", job.name)
    });
    job.finish(outcome);
    info!(image = %job.name, status = ?job.status, "job finished");
    observer(job);
}

/// Same as [`process_job`] for failures that happen before the gateway is
/// reached, e.g. a composite that could not be rendered.
pub fn fail_job<F>(job: &mut BatchJob, err: &StudioError, observer: &mut F)
where
    F: FnMut(&BatchJob),
{
    job.start();
    observer(job);
    job.finish(Err(format!("Failed to process {}: {err}", job.name)));
    observer(job);
}

/// Edits every image with the same prompt. The observer sees job N's
/// transitions before job N+1 starts.
pub fn run_batch<G, F>(
    gateway: &G,
    images: &[SourceImage],
    prompt: &str,
    mut observer: F,
) -> Vec<BatchJob>
where
    G: EditGateway + ?Sized,
    F: FnMut(&BatchJob),
{
    let mut jobs: Vec<BatchJob> = images.iter().map(BatchJob::pending).collect();
    for job in &jobs {
        observer(job);
    }
    for (job, image) in jobs.iter_mut().zip(images) {
        process_job(job, gateway, image.bytes(), &image.mime, prompt, &mut observer);
    }
    jobs
}

pub fn count_by_status(jobs: &[BatchJob], status: JobStatus) -> usize {
    jobs.iter().filter(|j| j.status == status).count()
}

pub fn status_report(jobs: &[BatchJob], tool: &str, prompt: &str) -> Value {
    json!({
        "generated_at": timestamp_iso(),
        "tool": tool,
        "prompt": prompt,
        "total": jobs.len(),
        "done": count_by_status(jobs, JobStatus::Done),
        "failed": count_by_status(jobs, JobStatus::Error),
        "jobs": jobs.iter().map(BatchJob::to_json).collect::<Vec<_>>(),
    })
}

/// `processed_<stem>.<ext of the result>`, unique within one export.
fn export_names(jobs: &[BatchJob]) -> Vec<(String, &ImagePayload)> {
    let mut used = HashSet::new();
    let mut out = Vec::new();
    for job in jobs {
        let Some(result) = job.result.as_ref().filter(|_| job.status == JobStatus::Done) else {
            continue;
        };
        let safe = sanitize_file_name(&job.name);
        let stem = Path::new(&safe)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image")
            .to_string();
        let ext = result.extension();
        let mut name = format!("processed_{stem}.{ext}");
        let mut n = 2;
        while !used.insert(name.clone()) {
            name = format!("processed_{stem}-{n}.{ext}");
            n += 1;
        }
        out.push((name, result));
    }
    out
}

/// Zip of every done result. Pending and failed jobs are left out.
pub fn export_archive(jobs: &[BatchJob], path: &Path) -> Result<Vec<String>> {
    ensure_parent_dir(path)?;
    let file = File::create(path)
        .with_context(|| format!("failed to create archive: {}", path.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut names = Vec::new();
    for (name, result) in export_names(jobs) {
        zip.start_file(name.as_str(), options)
            .with_context(|| format!("failed to add {name} to archive"))?;
        zip.write_all(&result.bytes)
            .with_context(|| format!("failed to write {name} into archive"))?;
        names.push(name);
    }
    zip.finish().context("failed to finalize archive")?;
    info!(path = %path.display(), files = names.len(), "archive written");
    Ok(names)
}

pub fn export_directory(jobs: &[BatchJob], dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory: {}", dir.display()))?;
    let mut written = Vec::new();
    for (name, result) in export_names(jobs) {
        let target = dir.join(&name);
        fs::write(&target, &result.bytes)
            .with_context(|| format!("failed to write result: {}", target.display()))?;
        written.push(target);
    }
    Ok(written)
}
