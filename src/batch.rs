//! Dated batch merging.
//!
//! A base directory holds today's PDFs; source directories hold files from
//! the past week. Every base PDF is merged with the sources that share its
//! match key and written under a dated goal directory.

use crate::assemble::{merge_files, MergeOptions, MergeReport};
use crate::error::Result;
use crate::source::is_pdf;
use chrono::{Days, Local, NaiveDate};
use log::{info, warn};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Days of sources considered, today included.
pub const SOURCE_WINDOW_DAYS: u64 = 7;

/// Length of the file name prefix that ties sources to a base file.
pub const MATCH_KEY_LEN: usize = 8;

/// Path component naming the base tree, swapped for [`GOAL_MARKER`] when no
/// goal directory is given.
pub const BASE_MARKER: &str = "主检";
pub const GOAL_MARKER: &str = "体检";

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub base_dir: PathBuf,
    pub source_dirs: Vec<PathBuf>,
    /// Outputs go to `goal_dir/YYYY-MM-DD/`; without it, next to the base
    /// file in the matching goal tree
    pub goal_dir: Option<PathBuf>,
    /// Appended after the sources of every job
    pub cover: Option<PathBuf>,
    pub today: NaiveDate,
}

impl BatchOptions {
    pub fn new(base_dir: PathBuf, source_dirs: Vec<PathBuf>, goal_dir: Option<PathBuf>) -> Self {
        Self {
            base_dir,
            source_dirs,
            goal_dir,
            cover: None,
            today: Local::now().date_naive(),
        }
    }
}

/// One merge to run: inputs in order and the output path.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchJob {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub merged: Vec<MergeReport>,
    /// Base files without enough inputs to merge
    pub skipped: Vec<PathBuf>,
}

fn stamp(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `YYYY-MM-DD` stamps of the last `days` days, oldest first.
pub fn date_stamps(today: NaiveDate, days: u64) -> Vec<String> {
    (0..days)
        .rev()
        .filter_map(|back| today.checked_sub_days(Days::new(back)))
        .map(stamp)
        .collect()
}

/// First characters of the file name, or `None` for shorter names.
pub fn match_key(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    let key: String = name.chars().take(MATCH_KEY_LEN).collect();
    (key.chars().count() == MATCH_KEY_LEN).then_some(key)
}

/// Regular files below `dir`, depth first, sorted within each directory.
///
/// Symbolic links are not followed.
pub fn walk_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn path_contains(path: &Path, needle: &str) -> bool {
    path.to_string_lossy().contains(needle)
}

/// Output for `base` when no goal directory is given: the same path with the
/// base marker swapped for the goal marker.
pub fn default_output(base: &Path) -> PathBuf {
    match base.to_str() {
        Some(s) => PathBuf::from(s.replace(BASE_MARKER, GOAL_MARKER)),
        None => base.to_path_buf(),
    }
}

/// PDFs below `base_dir` whose path carries today's date.
pub fn base_files(base_dir: &Path, today: NaiveDate) -> Result<Vec<PathBuf>> {
    let today = stamp(today);
    Ok(walk_files(base_dir)?
        .into_iter()
        .filter(|p| is_pdf(p) && path_contains(p, &today))
        .collect())
}

/// Files below `dir` dated within the source window, oldest date first.
pub fn source_files(dir: &Path, today: NaiveDate) -> Result<Vec<PathBuf>> {
    let files = walk_files(dir)?;
    let mut found: Vec<PathBuf> = Vec::new();
    for date in date_stamps(today, SOURCE_WINDOW_DAYS) {
        for path in files.iter().filter(|p| path_contains(p, &date)) {
            if !found.contains(path) {
                found.push(path.clone());
            }
        }
    }
    Ok(found)
}

/// Work out the merges for today without touching any output.
pub fn plan_jobs(options: &BatchOptions) -> Result<Vec<BatchJob>> {
    let mut sources = Vec::new();
    for dir in &options.source_dirs {
        sources.extend(source_files(dir, options.today)?);
    }

    let goal = options.goal_dir.as_ref().map(|dir| dir.join(stamp(options.today)));
    let mut jobs = Vec::new();
    for base in base_files(&options.base_dir, options.today)? {
        let (key, name) = match (match_key(&base), base.file_name()) {
            (Some(key), Some(name)) => (key, name.to_owned()),
            _ => {
                warn!("Skipping {}: file name too short to match", base.display());
                continue;
            }
        };

        let mut inputs = vec![base.clone()];
        inputs.extend(
            sources
                .iter()
                .filter(|s| match_key(s).as_deref() == Some(key.as_str()))
                .cloned(),
        );
        if let Some(cover) = &options.cover {
            inputs.push(cover.clone());
        }

        let output = match &goal {
            Some(goal) => goal.join(name),
            None => default_output(&base),
        };
        jobs.push(BatchJob { inputs, output });
    }

    Ok(jobs)
}

/// Plan and run today's merges.
pub fn run_batch(options: &BatchOptions, merge: &MergeOptions) -> Result<BatchReport> {
    let merge = MergeOptions {
        drop_last_page_of_first: true,
        ..merge.clone()
    };

    let mut report = BatchReport::default();
    for job in plan_jobs(options)? {
        if job.inputs.len() < 2 {
            warn!("Skipping {}: nothing to merge with", job.inputs[0].display());
            report.skipped.push(job.inputs[0].clone());
            continue;
        }
        if job.output == job.inputs[0] {
            warn!(
                "Skipping {}: no goal directory and no \"{}\" in its path",
                job.inputs[0].display(),
                BASE_MARKER
            );
            report.skipped.push(job.inputs[0].clone());
            continue;
        }
        info!("Merging {} file(s) into {}", job.inputs.len(), job.output.display());
        report.merged.push(merge_files(&job.inputs, &job.output, &merge)?);
    }

    Ok(report)
}
