use super::record::{MetadataRecord, Tag};
use super::scanner::{self, ScanError};
use rayon::prelude::*;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExifToolError {
    #[error("exiftool not found ({program}): {source}")]
    NotFound {
        program: String,
        source: std::io::Error,
    },

    #[error("Failed to run exiftool: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("exiftool exited with code {exit_code}: {message}")]
    CommandFailed { exit_code: i32, message: String },

    #[error("Invalid exiftool JSON output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// The metadata extraction/writing tool, seen from the matcher.
pub trait MetadataTool: Sync {
    /// Read `tags` from one file. Read failures yield `None`.
    fn read_tags(&self, path: &Path, tags: &[Tag]) -> Option<MetadataRecord>;

    /// Read `tags` from every file under `root` with one of `extensions`.
    /// Files that cannot be read are left out of the result.
    fn scan_tree(
        &self,
        root: &Path,
        extensions: &[String],
        tags: &[Tag],
    ) -> Result<Vec<MetadataRecord>, ExifToolError>;

    /// Copy all GPS tags from `source` into `target` in place. In dry-run
    /// mode nothing is written and the call succeeds.
    fn graft_gps(&self, source: &Path, target: &Path, dry_run: bool) -> Result<(), ExifToolError>;
}

/// `exiftool` driven as a subprocess, reading in parallel batches.
#[derive(Debug, Clone)]
pub struct ExifTool {
    program: PathBuf,
    workers: usize,
    batch_size: usize,
}

impl ExifTool {
    /// Check that `program` runs (`-ver`) before anything else happens.
    pub fn locate(program: impl Into<PathBuf>) -> Result<Self, ExifToolError> {
        let program = program.into();
        let output = Command::new(&program)
            .arg("-ver")
            .output()
            .map_err(|source| ExifToolError::NotFound {
                program: program.display().to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(ExifToolError::CommandFailed {
                exit_code: output.status.code().unwrap_or(-1),
                message: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        log::debug!(
            "Using exiftool {} ({})",
            String::from_utf8_lossy(&output.stdout).trim(),
            program.display()
        );

        Ok(Self {
            program,
            workers: rayon::current_num_threads(),
            batch_size: 32,
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn json_args(tags: &[Tag]) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-json", "-n", "-api", "RequestAll=3"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.extend(tags.iter().map(|t| OsString::from(t.arg())));
        args
    }

    /// Run exiftool in JSON mode over `files`.
    ///
    /// exiftool exits non-zero when any one file fails but still prints the
    /// others, so stdout is parsed whatever the status.
    fn run_json(&self, files: &[PathBuf], tags: &[Tag]) -> Result<Vec<MetadataRecord>, ExifToolError> {
        let output = Command::new(&self.program)
            .args(Self::json_args(tags))
            .args(files)
            .output()?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            if output.status.success() {
                return Ok(Vec::new());
            }
            return Err(ExifToolError::CommandFailed {
                exit_code: output.status.code().unwrap_or(-1),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if !output.status.success() {
            log::debug!(
                "exiftool reported errors: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(serde_json::from_str(&stdout)?)
    }

    /// Read one batch, dropping files exiftool could not read. A batch whose
    /// output cannot be used at all is retried one file at a time, so a
    /// single bad file only loses itself.
    fn read_batch(&self, files: &[PathBuf], tags: &[Tag]) -> Vec<MetadataRecord> {
        match self.run_json(files, tags) {
            Ok(records) => records.into_iter().filter(usable).collect(),
            Err(e) if files.len() > 1 => {
                log::debug!(
                    "Batch of {} file(s) failed, reading one by one: {}",
                    files.len(),
                    e
                );
                files
                    .iter()
                    .filter_map(|path| self.read_tags(path, tags))
                    .collect()
            }
            Err(e) => {
                log::debug!("Could not read {}: {}", files[0].display(), e);
                Vec::new()
            }
        }
    }
}

fn usable(record: &MetadataRecord) -> bool {
    if let Some(error) = record.error() {
        log::debug!(
            "No metadata for {}: {}",
            record
                .source_path()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            error
        );
        return false;
    }
    record.source_path().is_some()
}

impl MetadataTool for ExifTool {
    fn read_tags(&self, path: &Path, tags: &[Tag]) -> Option<MetadataRecord> {
        let files = [path.to_path_buf()];
        match self.run_json(&files, tags) {
            Ok(records) => records.into_iter().find(usable),
            Err(e) => {
                log::debug!("Could not read {}: {}", path.display(), e);
                None
            }
        }
    }

    fn scan_tree(
        &self,
        root: &Path,
        extensions: &[String],
        tags: &[Tag],
    ) -> Result<Vec<MetadataRecord>, ExifToolError> {
        let files = scanner::discover_files(root, &scanner::extension_set(extensions))?;
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()?;
        let pb = scanner::progress_bar(files.len() as u64, "Reading metadata");

        let batches: Vec<Vec<MetadataRecord>> = pool.install(|| {
            files
                .par_chunks(self.batch_size)
                .map(|batch| {
                    let records = self.read_batch(batch, tags);
                    pb.inc(batch.len() as u64);
                    records
                })
                .collect()
        });
        pb.finish_and_clear();

        let records: Vec<MetadataRecord> = batches.into_iter().flatten().collect();
        log::info!(
            "Read metadata for {}/{} file(s) under {}",
            records.len(),
            files.len(),
            root.display()
        );
        Ok(records)
    }

    fn graft_gps(&self, source: &Path, target: &Path, dry_run: bool) -> Result<(), ExifToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-overwrite_original_in_place")
            .arg("-m")
            .arg("-TagsFromFile")
            .arg(source)
            .arg("-GPS:all")
            .arg(target);

        if dry_run {
            log::debug!("[dry-run] {:?}", cmd);
            return Ok(());
        }

        let output = cmd.output()?;
        log::debug!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        if !output.status.success() {
            return Err(ExifToolError::CommandFailed {
                exit_code: output.status.code().unwrap_or(-1),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_args() {
        let args = ExifTool::json_args(&[Tag::CreateDate, Tag::LensID]);
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec!["-json", "-n", "-api", "RequestAll=3", "-CreateDate", "-LensID"]
        );
    }

    #[test]
    fn test_usable_records() {
        assert!(usable(&MetadataRecord::for_file("/a.jpg")));
        assert!(!usable(&MetadataRecord::new().with(Tag::CreateDate, "x")));

        let failed: MetadataRecord =
            serde_json::from_str(r#"{"SourceFile":"/a.jpg","Error":"File format error"}"#).unwrap();
        assert!(!usable(&failed));
    }

    /// Stand-in exiftool: emits one record per `.nef` argument, but prints
    /// truncated JSON and fails as soon as it meets `bad.nef`.
    #[cfg(unix)]
    fn stub_exiftool(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("exiftool");
        std::fs::write(
            &script,
            r#"#!/bin/sh
out="["
sep=""
for arg in "$@"; do
  case "$arg" in
    *bad.nef) printf '[{"SourceFile":'; exit 1 ;;
    *.nef) out="$out$sep{\"SourceFile\":\"$arg\",\"ShutterCount\":1}"; sep="," ;;
  esac
done
printf '%s]' "$out"
"#,
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_batch_falls_back_to_single_reads() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let bin = temp_dir.path().join("bin");
        let raw = temp_dir.path().join("raw");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::create_dir_all(&raw).unwrap();
        for name in ["a.nef", "b.nef", "bad.nef", "c.nef"] {
            std::fs::write(raw.join(name), b"raw").unwrap();
        }

        let tool = ExifTool {
            program: stub_exiftool(&bin),
            workers: 1,
            batch_size: 4,
        };
        let records = tool
            .scan_tree(&raw, &["nef".to_string()], &[Tag::ShutterCount])
            .unwrap();

        let mut names: Vec<String> = records
            .iter()
            .filter_map(|r| r.source_path())
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.nef", "b.nef", "c.nef"]);
        assert!(tool.read_tags(&raw.join("bad.nef"), &[Tag::ShutterCount]).is_none());
    }

    #[test]
    fn test_locate_missing_program() {
        let result = ExifTool::locate("/non/existent/exiftool");
        assert!(matches!(result, Err(ExifToolError::NotFound { .. })));
    }
}
