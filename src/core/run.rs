use super::cache::{self, CacheError};
use super::creation_key::compose_creation_key;
use super::exiftool::{ExifToolError, MetadataTool};
use super::index::{IndexStore, RawIndexEntry};
use super::matcher::{MatchOptions, MatchOutcome, Matcher, Resolution};
use super::record::{self, MetadataRecord};
use super::reference::{ReferenceLookup, ReferenceResolver};
use super::scanner;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const HISTORY_FILE: &str = ".gps-graft-history.jsonl";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JPEG folder not found: {}", .0.display())]
    MissingJpegRoot(PathBuf),

    #[error("RAW folder not found: {}", .0.display())]
    MissingRawRoot(PathBuf),

    #[error("Reference folder not found: {}", .0.display())]
    MissingReferenceRoot(PathBuf),

    #[error("No file extensions given for the {population} population")]
    NoExtensions { population: &'static str },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    ExifTool(#[from] ExifToolError),
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub jpeg_root: PathBuf,
    pub raw_root: PathBuf,
    pub ref_root: Option<PathBuf>,
    /// Explicit cache file; `None` means the per-root, per-extension default.
    pub raw_cache: Option<PathBuf>,
    pub reindex: bool,
    pub dry_run: bool,
    pub match_options: MatchOptions,
    pub raw_extensions: Vec<String>,
    pub jpeg_extensions: Vec<String>,
    pub write_history: bool,
}

impl RunConfig {
    pub fn new(jpeg_root: impl Into<PathBuf>, raw_root: impl Into<PathBuf>) -> Self {
        Self {
            jpeg_root: jpeg_root.into(),
            raw_root: raw_root.into(),
            raw_cache: None,
            ref_root: None,
            reindex: false,
            dry_run: false,
            match_options: MatchOptions::default(),
            raw_extensions: vec!["nef".to_string()],
            jpeg_extensions: vec!["jpg".to_string(), "jpeg".to_string()],
            write_history: true,
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        self.raw_cache
            .clone()
            .unwrap_or_else(|| cache::default_cache_path(&self.raw_root, &self.raw_extensions))
    }

    /// Configuration problems are fatal and must surface before any work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.jpeg_root.is_dir() {
            return Err(ConfigError::MissingJpegRoot(self.jpeg_root.clone()));
        }
        if !self.raw_root.is_dir() {
            return Err(ConfigError::MissingRawRoot(self.raw_root.clone()));
        }
        if let Some(ref_root) = &self.ref_root {
            if !ref_root.is_dir() {
                return Err(ConfigError::MissingReferenceRoot(ref_root.clone()));
            }
        }
        if self.raw_extensions.is_empty() {
            return Err(ConfigError::NoExtensions { population: "RAW" });
        }
        if self.jpeg_extensions.is_empty() {
            return Err(ConfigError::NoExtensions { population: "JPEG" });
        }
        Ok(())
    }
}

/// Per-run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub scanned: usize,
    pub without_creation_key: usize,
    pub via_reference: usize,
    pub matched: usize,
    pub ambiguous: usize,
    pub grafted: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraftedPair {
    pub raw: PathBuf,
    pub jpeg: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub summary: RunSummary,
    pub grafted: Vec<GraftedPair>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GraftHistoryRecord {
    pub timestamp: String,
    pub jpeg_root: String,
    pub raw_root: String,
    pub summary: RunSummary,
    pub grafted: Vec<GraftedPair>,
}

/// RAW records from the cache, or from a fresh scan that then refreshes the
/// cache. A cache that cannot be read or written only costs a rescan.
pub fn load_raw_records(
    tool: &dyn MetadataTool,
    raw_root: &Path,
    extensions: &[String],
    cache_path: &Path,
    reindex: bool,
) -> Result<Vec<MetadataRecord>, ExifToolError> {
    if !reindex {
        match cache::load(cache_path) {
            Ok(records) => {
                log::info!(
                    "[CACHE] Loaded {} RAW record(s) from {}",
                    records.len(),
                    cache_path.display()
                );
                return Ok(records);
            }
            Err(CacheError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("[CACHE] No cache at {}", cache_path.display());
            }
            Err(e) => log::warn!("[CACHE] Could not read {}, rescanning: {}", cache_path.display(), e),
        }
    }

    let records = tool.scan_tree(raw_root, extensions, &record::raw_tags())?;

    match cache::store(cache_path, &records) {
        Ok(()) => log::info!(
            "[CACHE] Stored {} RAW record(s) in {}",
            records.len(),
            cache_path.display()
        ),
        Err(e) => log::warn!("RAW cache could not be written to {}: {}", cache_path.display(), e),
    }
    Ok(records)
}

pub struct Run<'t> {
    tool: &'t dyn MetadataTool,
    config: RunConfig,
}

impl<'t> Run<'t> {
    pub fn new(tool: &'t dyn MetadataTool, config: RunConfig) -> Self {
        Self { tool, config }
    }

    /// Index the RAWs, match every JPEG and graft GPS onto the unambiguous
    /// matches.
    pub fn execute(&self) -> Result<RunReport, RunError> {
        let config = &self.config;
        config.validate()?;

        let raw_records = load_raw_records(
            self.tool,
            &config.raw_root,
            &config.raw_extensions,
            &config.cache_path(),
            config.reindex,
        )?;
        let index = IndexStore::build(&raw_records);
        let stats = index.stats();
        log::info!(
            "RAW files indexed: {} | creation keys: {} | frame counters: {}",
            stats.files,
            stats.creation_keys,
            stats.frame_counters
        );

        let jpeg_records =
            self.tool
                .scan_tree(&config.jpeg_root, &config.jpeg_extensions, &record::jpeg_tags())?;

        let matcher = Matcher::new(&index, config.match_options);
        let mut resolver = config
            .ref_root
            .as_ref()
            .map(|root| ReferenceResolver::new(self.tool, root));

        let mut report = RunReport {
            summary: RunSummary {
                scanned: jpeg_records.len(),
                ..Default::default()
            },
            ..Default::default()
        };

        let pb = scanner::progress_bar(jpeg_records.len() as u64, "Matching");
        for jpeg in &jpeg_records {
            pb.inc(1);
            let Some(jpeg_path) = jpeg.source_path() else {
                continue;
            };

            if compose_creation_key(jpeg).is_none() {
                report.summary.without_creation_key += 1;
            }

            let lookup = resolver.as_mut().map(|r| r as &mut dyn ReferenceLookup);
            let outcome = matcher.match_jpeg(jpeg, lookup);

            let raw = match &outcome.resolution {
                Resolution::Matched(raw) => *raw,
                Resolution::Ambiguous(candidates) => {
                    report.summary.ambiguous += 1;
                    log_ambiguous(jpeg_path, &outcome, candidates);
                    continue;
                }
                Resolution::Unmatched => {
                    log::info!("[MISS] No unique RAW for {}", display_name(jpeg_path));
                    continue;
                }
            };

            if outcome.used_reference {
                report.summary.via_reference += 1;
            }
            report.summary.matched += 1;

            match self.tool.graft_gps(&raw.path, jpeg_path, config.dry_run) {
                Ok(()) => {
                    report.summary.grafted += 1;
                    pb.suspend(|| println!("{}", graft_line(&raw.path, jpeg_path, config.dry_run)));
                    report.grafted.push(GraftedPair {
                        raw: raw.path.clone(),
                        jpeg: jpeg_path.to_path_buf(),
                    });
                }
                Err(e) => pb.suspend(|| {
                    eprintln!(
                        "[ERR] GPS copy failed: {} -> {}: {}",
                        raw.path.display(),
                        jpeg_path.display(),
                        e
                    )
                }),
            }
        }
        pb.finish_and_clear();

        if config.write_history && !config.dry_run && !report.grafted.is_empty() {
            let path = config.jpeg_root.join(HISTORY_FILE);
            if let Err(e) = append_history(&path, config, &report) {
                log::warn!("Could not write history to {}: {}", path.display(), e);
            }
        }

        Ok(report)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Console line for a graft; dry runs show the copy that would happen.
fn graft_line(raw: &Path, jpeg: &Path, dry_run: bool) -> String {
    if dry_run {
        format!(
            "[DRY-RUN] GPS: {} -> {} (-TagsFromFile {} -GPS:all {})",
            display_name(raw),
            display_name(jpeg),
            raw.display(),
            jpeg.display()
        )
    } else {
        format!("[OK] GPS: {} -> {}", display_name(raw), display_name(jpeg))
    }
}

fn log_ambiguous(jpeg_path: &Path, outcome: &MatchOutcome, candidates: &[&RawIndexEntry]) {
    log::info!(
        "[AMB] Ambiguous for {} (candidates: {}) | key={:?}",
        display_name(jpeg_path),
        candidates.len(),
        outcome.creation_key
    );
    for c in candidates {
        log::info!(
            "      -> {} | serial={:?} | lens={:?} | counter={:?} | key={:?}",
            c.file_name(),
            c.serial_number,
            c.lens_id,
            c.shutter_count,
            c.create_key
        );
    }
}

fn append_history(path: &Path, config: &RunConfig, report: &RunReport) -> anyhow::Result<()> {
    let record = GraftHistoryRecord {
        timestamp: Utc::now().to_rfc3339(),
        jpeg_root: config.jpeg_root.to_string_lossy().into_owned(),
        raw_root: config.raw_root.to_string_lossy().into_owned(),
        summary: report.summary,
        grafted: report.grafted.clone(),
    };
    let mut out = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(out, "{}", serde_json::to_string(&record)?)?;
    Ok(())
}

/// Every line of a history file, parsed independently so one malformed
/// entry does not hide the rest.
pub fn read_history(path: &Path) -> std::io::Result<Vec<Result<GraftHistoryRecord, serde_json::Error>>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line));
    }
    Ok(records)
}
