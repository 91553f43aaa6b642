//! Recursive disk usage of the monitored directories.
//!
//! Each cycle measures every root independently. A root that cannot be
//! stat'ed is left out of that cycle; a directory that fails partway through
//! its listing contributes what was counted before the failure.

use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prometheus::IntGaugeVec;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::PathError;
use crate::jobs::{Job, pause};
use crate::metrics::MetricsSink;

pub const COLLECT_INTERVAL: Duration = Duration::from_secs(60);

/// Measured size of one requested root for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// A directory entry's path and its own metadata (links not followed).
type Entry = (PathBuf, io::Result<Metadata>);

/// Lazily yielded entries of one directory.
type Listing = Box<dyn Iterator<Item = io::Result<Entry>>>;

type ListDir = dyn Fn(&Path) -> io::Result<Listing>;

fn list_dir(path: &Path) -> io::Result<Listing> {
    let entries = fs::read_dir(path)?;
    Ok(Box::new(entries.map(|entry| {
        entry.map(|entry| (entry.path(), entry.metadata()))
    })))
}

/// Measure every root, in input order, skipping roots that cannot be stat'ed.
pub fn usage(paths: &[PathBuf]) -> Vec<UsageRecord> {
    usage_with(paths, &list_dir)
}

fn usage_with(paths: &[PathBuf], list: &ListDir) -> Vec<UsageRecord> {
    paths
        .iter()
        .filter_map(|path| match fs::symlink_metadata(path) {
            Ok(metadata) => Some(UsageRecord {
                path: path.clone(),
                size_bytes: measure(path, &metadata, list),
            }),
            Err(source) => {
                let err = PathError::Stat {
                    path: path.clone(),
                    source,
                };
                warn!(path = %path.display(), error = %err, "directory does not exist");
                None
            }
        })
        .collect()
}

/// Size of `path`: its own size, plus its entries' sizes when it is a directory.
///
/// Symlinks are measured as links, never followed.
fn measure(path: &Path, metadata: &Metadata, list: &ListDir) -> u64 {
    let mut size = metadata.len();
    if !metadata.is_dir() {
        return size;
    }

    let entries = match list(path) {
        Ok(entries) => entries,
        Err(source) => {
            log_partial(PathError::ReadDir {
                path: path.to_path_buf(),
                source,
            });
            return size;
        }
    };

    for entry in entries {
        let (entry_path, entry_metadata) = match entry {
            Ok(entry) => entry,
            Err(source) => {
                log_partial(PathError::ReadDir {
                    path: path.to_path_buf(),
                    source,
                });
                break;
            }
        };
        match entry_metadata {
            Ok(metadata) => size += measure(&entry_path, &metadata, list),
            Err(source) => log_partial(PathError::Stat {
                path: entry_path,
                source,
            }),
        }
    }
    size
}

fn log_partial(err: PathError) {
    warn!(error = %err, "disk usage is partial");
}

/// Periodically publishes `disk_usage_bytes{directory}` for the configured roots.
pub struct DiskUsage {
    directories: Arc<Vec<PathBuf>>,
    usage_bytes: IntGaugeVec,
}

impl DiskUsage {
    pub fn new(directories: Vec<PathBuf>, sink: &MetricsSink) -> prometheus::Result<Self> {
        Ok(Self {
            directories: Arc::new(directories),
            usage_bytes: sink.int_gauge_vec(
                "disk",
                "usage_bytes",
                "How large a directory is (in bytes)",
                &["directory"],
            )?,
        })
    }

    fn publish(&self, records: &[UsageRecord]) {
        for record in records {
            let directory = record.path.to_string_lossy();
            self.usage_bytes
                .with_label_values(&[&*directory])
                .set(i64::try_from(record.size_bytes).unwrap_or(i64::MAX));
        }
    }

    /// Run one collection cycle off the async runtime and publish the result.
    pub async fn collect(&self) -> Vec<UsageRecord> {
        let directories = Arc::clone(&self.directories);
        match tokio::task::spawn_blocking(move || usage(&directories)).await {
            Ok(records) => {
                self.publish(&records);
                debug!(measured = records.len(), "collected disk usage");
                records
            }
            Err(err) => {
                error!(error = %err, "disk usage scan aborted");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Job for DiskUsage {
    fn name(&self) -> &str {
        "disk"
    }

    async fn run(&self, cancel: CancellationToken) {
        while pause(&cancel, COLLECT_INTERVAL).await {
            if cancel.run_until_cancelled(self.collect()).await.is_none() {
                debug!("disk usage scan abandoned on shutdown");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, bytes: usize) {
        fs::write(path, vec![0u8; bytes]).unwrap();
    }

    fn own_size(path: &Path) -> u64 {
        fs::symlink_metadata(path).unwrap().len()
    }

    #[test]
    fn file_root_is_its_own_size() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a");
        write(&file, 10);

        let records = usage(&[file.clone()]);
        assert_eq!(
            records,
            vec![UsageRecord {
                path: file,
                size_bytes: 10
            }]
        );
    }

    #[test]
    fn directory_sums_nested_files() {
        let root = TempDir::new().unwrap();
        write(&root.path().join("a"), 10);
        let sub = root.path().join("b");
        fs::create_dir(&sub).unwrap();
        write(&sub.join("c"), 5);

        let records = usage(&[root.path().to_path_buf()]);
        let expected = own_size(root.path()) + own_size(&sub) + 15;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].size_bytes, expected);
        assert!(records[0].size_bytes >= 15);
    }

    #[test]
    fn missing_path_is_skipped_without_error() {
        let root = TempDir::new().unwrap();
        let exists = root.path().join("exists");
        write(&exists, 3);
        let missing = root.path().join("missing");

        let records = usage(&[exists.clone(), missing]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, exists);
    }

    #[test]
    fn records_follow_input_order() {
        let root = TempDir::new().unwrap();
        let names = ["z", "a", "m"];
        let paths: Vec<PathBuf> = names
            .iter()
            .map(|n| {
                let p = root.path().join(n);
                write(&p, 1);
                p
            })
            .collect();

        let records = usage(&paths);
        let got: Vec<_> = records.iter().map(|r| r.path.clone()).collect();
        assert_eq!(got, paths);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_followed() {
        let root = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write(&target.path().join("big"), 4096);
        let link = root.path().join("link");
        std::os::unix::fs::symlink(target.path(), &link).unwrap();

        let records = usage(&[root.path().to_path_buf()]);
        let expected = own_size(root.path()) + own_size(&link);
        assert_eq!(records[0].size_bytes, expected);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cycle_terminates() {
        let root = TempDir::new().unwrap();
        std::os::unix::fs::symlink(root.path(), root.path().join("loop")).unwrap();
        let records = usage(&[root.path().to_path_buf()]);
        assert_eq!(records.len(), 1);
    }

    /// Listing for `root` that yields `entries` once; every other directory is empty.
    fn scripted(
        root: PathBuf,
        entries: Vec<io::Result<Entry>>,
    ) -> impl Fn(&Path) -> io::Result<Listing> {
        let entries = std::sync::Mutex::new(Some(entries));
        move |path| {
            if path != root.as_path() {
                return Ok(Box::new(std::iter::empty()));
            }
            let entries = entries.lock().unwrap().take().unwrap_or_default();
            Ok(Box::new(entries.into_iter()))
        }
    }

    #[test]
    fn listing_failure_keeps_partial_sum() {
        let root = TempDir::new().unwrap();
        let first = root.path().join("first");
        let later = root.path().join("later");
        write(&first, 8);
        write(&later, 100);

        let list = scripted(
            root.path().to_path_buf(),
            vec![
                Ok((first.clone(), fs::symlink_metadata(&first))),
                Err(io::Error::other("device went away")),
                Ok((later.clone(), fs::symlink_metadata(&later))),
            ],
        );
        let records = usage_with(&[root.path().to_path_buf()], &list);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].size_bytes, own_size(root.path()) + 8);
    }

    #[test]
    fn unreadable_directory_counts_own_size() {
        let root = TempDir::new().unwrap();
        write(&root.path().join("hidden"), 100);

        let list = |_: &Path| -> io::Result<Listing> {
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        };
        let records = usage_with(&[root.path().to_path_buf()], &list);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].size_bytes, own_size(root.path()));
    }

    #[test]
    fn entry_that_cannot_be_stated_is_skipped() {
        let root = TempDir::new().unwrap();
        let kept = root.path().join("kept");
        write(&kept, 8);

        let list = scripted(
            root.path().to_path_buf(),
            vec![
                Ok((
                    root.path().join("vanished"),
                    Err(io::Error::from(io::ErrorKind::NotFound)),
                )),
                Ok((kept.clone(), fs::symlink_metadata(&kept))),
            ],
        );
        let records = usage_with(&[root.path().to_path_buf()], &list);

        assert_eq!(records[0].size_bytes, own_size(root.path()) + 8);
    }

    #[tokio::test]
    async fn collect_publishes_per_directory() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("chaindata");
        write(&file, 42);
        let sink = MetricsSink::new("eth");
        let disk = DiskUsage::new(
            vec![file.clone(), root.path().join("missing")],
            &sink,
        )
        .unwrap();

        let records = disk.collect().await;
        assert_eq!(records.len(), 1);

        let label = file.to_string_lossy();
        assert_eq!(disk.usage_bytes.with_label_values(&[&*label]).get(), 42);
        assert!(sink.render().unwrap().contains("eth_disk_usage_bytes"));
    }

    #[tokio::test]
    async fn run_returns_on_cancel() {
        let sink = MetricsSink::new("eth");
        let disk = DiskUsage::new(Vec::new(), &sink).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        disk.run(cancel).await;
    }
}
