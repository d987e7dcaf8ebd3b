//! # Staging
//!
//! The soft stage holds one directory per sample plus arbitrary other entries.
//! Hard staging materializes a dereferenced copy of the parts to deliver under
//! a fresh hard-stage root, which the transfer tool consumes and removes.

pub mod lock;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{PathContext, PathsConfig};
use crate::constants::RUN_FOLDER_CHECKSUM_SUFFIX;
use crate::error::{DeliveryError, DeliveryResult};
use crate::state_machine::guards::{HardStageAbsentGuard, StateGuard};

pub use lock::{DeliveryLock, DirectoryLock};

#[derive(Debug, Clone)]
pub struct StagingManager {
    soft_root: PathBuf,
    hard_root: PathBuf,
}

impl StagingManager {
    pub fn new(soft_root: impl Into<PathBuf>, hard_root: impl Into<PathBuf>) -> Self {
        Self {
            soft_root: soft_root.into(),
            hard_root: hard_root.into(),
        }
    }

    /// Expand the configured templates for one project
    pub fn for_project(paths: &PathsConfig, context: &PathContext) -> DeliveryResult<Self> {
        Ok(Self::new(
            context.expand(&paths.soft_stage)?,
            context.expand(&paths.hard_stage)?,
        ))
    }

    pub fn soft_root(&self) -> &Path {
        &self.soft_root
    }

    pub fn hard_root(&self) -> &Path {
        &self.hard_root
    }

    /// Lock guarding this hard-stage root
    pub fn lock(&self) -> DirectoryLock {
        DirectoryLock::new(&self.hard_root)
    }

    /// Copy a sample directory and its sidecar files into the hard stage.
    ///
    /// The sample destination must not exist. Sidecars are the soft-stage
    /// files named `<sample_id>.<anything>`.
    pub fn hard_stage_sample(&self, sample_id: &str) -> DeliveryResult<()> {
        let source = self.soft_root.join(sample_id);
        let destination = self.hard_root.join(sample_id);

        info!(
            sample_id = %sample_id,
            source = %source.display(),
            destination = %destination.display(),
            "Creating hard copy of sample"
        );
        // Sidecar destinations are checked up front so a clash copies nothing
        let sidecars = self
            .sidecar_files(sample_id)?
            .into_iter()
            .filter_map(|sidecar| {
                let name = sidecar.file_name()?.to_owned();
                Some((sidecar, self.hard_root.join(name)))
            })
            .collect::<Vec<_>>();
        for (_, target) in &sidecars {
            HardStageAbsentGuard.check(target.as_path())?;
        }

        let files = copy_tree(&source, &destination)?;
        for (sidecar, target) in &sidecars {
            fs::copy(sidecar, target)?;
        }

        info!(
            sample_id = %sample_id,
            files = files,
            sidecars = sidecars.len(),
            "Sample hard staged"
        );
        Ok(())
    }

    fn sidecar_files(&self, sample_id: &str) -> DeliveryResult<Vec<PathBuf>> {
        let prefix = format!("{sample_id}.");
        let mut sidecars = Vec::new();
        for entry in fs::read_dir(&self.soft_root)? {
            let entry = entry?;
            let matches = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(&prefix));
            if matches && entry.path().is_file() {
                sidecars.push(entry.path());
            }
        }
        sidecars.sort();
        Ok(sidecars)
    }

    /// Soft-stage entries that are not payloads of the given samples.
    ///
    /// An entry belongs to a sample when its name without the last extension
    /// equals the sample id, so `S1` and `S1.md5` are both sample entries.
    pub fn misc_entries(&self, sample_ids: &[String]) -> DeliveryResult<Vec<String>> {
        let samples: HashSet<&str> = sample_ids.iter().map(String::as_str).collect();
        let mut misc = Vec::new();
        for entry in fs::read_dir(&self.soft_root)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(entry = ?entry.file_name(), "Skipping soft-stage entry with a non UTF-8 name");
                continue;
            };
            let stem = Path::new(&name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(name.as_str())
                .to_string();
            if !samples.contains(stem.as_str()) {
                misc.push(name);
            }
        }
        misc.sort();
        Ok(misc)
    }

    /// Copy one miscellaneous entry, recursively for directories
    pub fn copy_misc_entry(&self, name: &str) -> DeliveryResult<()> {
        let source = self.soft_root.join(name);
        let destination = self.hard_root.join(name);
        if source.is_dir() {
            copy_tree(&source, &destination)?;
        } else {
            fs::copy(&source, &destination)?;
        }
        debug!(entry = %name, "Miscellaneous entry hard staged");
        Ok(())
    }

    /// Copy `<fcid>.tar` and its checksum sidecar from `data_dir` into the hard stage
    pub fn stage_run_folder_archive(&self, data_dir: &Path, fcid: &str) -> DeliveryResult<Vec<PathBuf>> {
        let archive = data_dir.join(format!("{fcid}.tar"));
        let checksum = data_dir.join(format!("{fcid}.tar{RUN_FOLDER_CHECKSUM_SUFFIX}"));

        let mut staged = Vec::with_capacity(2);
        for artifact in [archive, checksum] {
            let name = artifact.file_name().ok_or_else(|| {
                DeliveryError::ValidationError(format!(
                    "Run-folder artifact has no file name: {}",
                    artifact.display()
                ))
            })?;
            let destination = self.hard_root.join(name);
            fs::copy(&artifact, &destination).map_err(|e| {
                DeliveryError::IoError(format!(
                    "Unable to copy {} to {}, check that the file exists and matches the flowcell id: {e}",
                    artifact.display(),
                    self.hard_root.display()
                ))
            })?;
            staged.push(destination);
        }

        info!(
            fcid = %fcid,
            destination = %self.hard_root.display(),
            "Run-folder archive hard staged"
        );
        Ok(staged)
    }

    /// Hand every entry under the hard stage to the delivery group
    #[cfg(unix)]
    pub fn assign_group(&self, gid: u32) -> DeliveryResult<usize> {
        let mut changed = 0;
        for entry in WalkDir::new(&self.hard_root).follow_links(false) {
            let entry = entry?;
            std::os::unix::fs::lchown(entry.path(), None, Some(gid))?;
            changed += 1;
        }
        info!(
            hard_stage = %self.hard_root.display(),
            gid = gid,
            entries = changed,
            "Hard stage group reassigned"
        );
        Ok(changed)
    }

    #[cfg(not(unix))]
    pub fn assign_group(&self, gid: u32) -> DeliveryResult<usize> {
        warn!(gid = gid, "Group reassignment is not supported on this platform");
        Ok(0)
    }
}

/// Recursively copy `source` to `destination`, dereferencing symlinks.
///
/// Returns the number of files copied. The destination must not exist.
pub fn copy_tree(source: &Path, destination: &Path) -> DeliveryResult<u64> {
    HardStageAbsentGuard.check(destination)?;

    if !source.is_dir() {
        fs::copy(source, destination)?;
        return Ok(1);
    }

    let mut files = 0;
    for entry in WalkDir::new(source).follow_links(true) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(source).map_err(|e| {
            DeliveryError::IoError(format!(
                "{} escaped {}: {e}",
                entry.path().display(),
                source.display()
            ))
        })?;
        let target = if relative.as_os_str().is_empty() {
            destination.to_path_buf()
        } else {
            destination.join(relative)
        };

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            files += 1;
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn soft_stage() -> (TempDir, StagingManager) {
        let root = tempfile::tempdir().unwrap();
        let soft = root.path().join("soft");
        fs::create_dir_all(soft.join("S1").join("lane1")).unwrap();
        fs::write(soft.join("S1").join("lane1").join("reads.fastq.gz"), b"ACGT").unwrap();
        fs::write(soft.join("S1.md5"), b"abc").unwrap();
        fs::create_dir_all(soft.join("S2")).unwrap();
        fs::write(soft.join("report.html"), b"<html/>").unwrap();
        fs::create_dir_all(soft.join("00-Reports")).unwrap();
        fs::write(soft.join("00-Reports").join("summary.txt"), b"ok").unwrap();

        let manager = StagingManager::new(soft, root.path().join("hard"));
        fs::create_dir_all(manager.hard_root()).unwrap();
        (root, manager)
    }

    #[test]
    fn test_misc_entries_exclude_sample_payloads() {
        let (_root, manager) = soft_stage();
        let misc = manager.misc_entries(&["S1".to_string()]).unwrap();
        assert_eq!(misc, vec!["00-Reports", "S2", "report.html"]);
    }

    #[test]
    fn test_hard_stage_sample_copies_payload_and_sidecars() {
        let (_root, manager) = soft_stage();
        manager.hard_stage_sample("S1").unwrap();

        let hard = manager.hard_root();
        assert_eq!(
            fs::read(hard.join("S1").join("lane1").join("reads.fastq.gz")).unwrap(),
            b"ACGT"
        );
        assert!(hard.join("S1.md5").is_file());
        assert!(!hard.join("report.html").exists());
    }

    #[test]
    fn test_existing_destination_is_a_precondition_violation() {
        let (_root, manager) = soft_stage();
        fs::create_dir_all(manager.hard_root().join("S1")).unwrap();
        let result = manager.hard_stage_sample("S1");
        assert!(matches!(result, Err(DeliveryError::PreconditionViolation(_))));
    }

    #[test]
    fn test_existing_sidecar_is_a_precondition_violation() {
        let (_root, manager) = soft_stage();
        fs::write(manager.hard_root().join("S1.md5"), b"stale").unwrap();

        let result = manager.hard_stage_sample("S1");

        assert!(matches!(result, Err(DeliveryError::PreconditionViolation(_))));
        assert_eq!(fs::read(manager.hard_root().join("S1.md5")).unwrap(), b"stale");
        assert!(!manager.hard_root().join("S1").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_tree_dereferences_symlinks() {
        let (root, manager) = soft_stage();
        let outside = root.path().join("outside.bam");
        fs::write(&outside, b"BAM").unwrap();
        std::os::unix::fs::symlink(&outside, manager.soft_root().join("S2").join("aln.bam"))
            .unwrap();

        manager.hard_stage_sample("S2").unwrap();
        let staged = manager.hard_root().join("S2").join("aln.bam");
        assert!(!staged.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(fs::read(staged).unwrap(), b"BAM");
    }

    #[test]
    fn test_copy_misc_entries() {
        let (_root, manager) = soft_stage();
        manager.copy_misc_entry("report.html").unwrap();
        manager.copy_misc_entry("00-Reports").unwrap();
        assert!(manager.hard_root().join("report.html").is_file());
        assert!(manager
            .hard_root()
            .join("00-Reports")
            .join("summary.txt")
            .is_file());
    }

    #[test]
    fn test_stage_run_folder_archive() {
        let (root, manager) = soft_stage();
        let data = root.path().join("archives");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("FC01.tar"), b"tar").unwrap();
        fs::write(data.join("FC01.tar.md5"), b"md5").unwrap();

        let staged = manager.stage_run_folder_archive(&data, "FC01").unwrap();
        assert_eq!(staged.len(), 2);
        assert!(manager.hard_root().join("FC01.tar.md5").is_file());

        let missing = manager.stage_run_folder_archive(&data, "FC02");
        assert!(matches!(missing, Err(DeliveryError::IoError(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_assign_group_to_own_group() {
        use std::os::unix::fs::MetadataExt;

        let (_root, manager) = soft_stage();
        manager.hard_stage_sample("S1").unwrap();
        let gid = fs::metadata(manager.hard_root()).unwrap().gid();

        let changed = manager.assign_group(gid).unwrap();
        // root, S1, S1/lane1, reads.fastq.gz, S1.md5
        assert_eq!(changed, 5);
    }
}
