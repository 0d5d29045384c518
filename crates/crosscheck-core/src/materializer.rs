//! Writes rows to the primary output folder and mirrors them to the replica.
//!
//! The primary copy is the delivery: if it cannot be written the row stays
//! unsent. The replica copy is best effort: a failure there is logged and
//! reported in [`Materialized::replica`] but never fails the row.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use crosscheck_types::ItemLogRecord;
use tracing::{debug, error, warn};

use crate::config::UploadSettings;
use crate::encoding::{self, EncodeError};

/// Errors that prevent the primary artifact from being written.
#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    /// The primary output folder could not be created.
    #[error("cannot create output folder {}: {source}", path.display())]
    CreateDir {
        /// Folder that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The artifact could not be written.
    #[error("cannot write artifact {}: {source}", path.display())]
    Write {
        /// File that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The rows could not be rendered.
    #[error("cannot encode artifact: {source}")]
    Encode {
        /// The underlying encoding error.
        #[from]
        source: EncodeError,
    },

    /// A batch write was asked to produce an empty file.
    #[error("no records to write")]
    Empty,
}

/// What happened to the replica copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaOutcome {
    /// No replica folder is configured.
    NotConfigured,
    /// The artifact was copied to this path.
    Copied(PathBuf),
    /// The copy failed; the primary is unaffected.
    Failed {
        /// Intended replica path.
        path: PathBuf,
        /// Rendered I/O error.
        reason: String,
    },
}

/// Result of a successful materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    /// Path of the primary artifact.
    pub primary: PathBuf,
    /// Fate of the replica copy.
    pub replica: ReplicaOutcome,
}

/// Renders rows to CSV artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Materializer {
    include_header: bool,
}

impl Materializer {
    /// A materializer that writes data lines only.
    pub const fn new() -> Self {
        Self {
            include_header: false,
        }
    }

    /// Prefix every artifact with the column header line.
    #[must_use]
    pub const fn with_header(mut self, include_header: bool) -> Self {
        self.include_header = include_header;
        self
    }

    /// Write one row to `record_{id}_{timestamp}.csv` in the primary folder
    /// and copy it to the replica folder when one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`MaterializeError`] if the primary folder or file cannot be
    /// written. Replica failures are not errors.
    pub async fn materialize(
        &self,
        record: &ItemLogRecord,
        upload: &UploadSettings,
    ) -> Result<Materialized, MaterializeError> {
        let content = encoding::to_csv(record, self.include_header)?;
        let file_name = encoding::record_file_name(record);
        self.persist(&file_name, &content, upload).await
    }

    /// Write several rows into one file.
    ///
    /// `file_name` defaults to `records_{utc yyyyMMdd_HHmmss}.csv`.
    ///
    /// # Errors
    ///
    /// Returns [`MaterializeError::Empty`] for an empty slice, otherwise
    /// the same errors as [`Materializer::materialize`].
    pub async fn materialize_batch(
        &self,
        records: &[ItemLogRecord],
        file_name: Option<&str>,
        upload: &UploadSettings,
    ) -> Result<Materialized, MaterializeError> {
        if records.is_empty() {
            return Err(MaterializeError::Empty);
        }

        let content = encoding::encode_records(records, self.include_header)?;

        let name = file_name.map_or_else(
            || format!("records_{}.csv", Utc::now().format("%Y%m%d_%H%M%S")),
            str::to_owned,
        );
        self.persist(&encoding::sanitize_file_name(&name), &content, upload)
            .await
    }

    async fn persist(
        &self,
        file_name: &str,
        content: &[u8],
        upload: &UploadSettings,
    ) -> Result<Materialized, MaterializeError> {
        let folder = &upload.csv_output_folder;
        tokio::fs::create_dir_all(folder)
            .await
            .map_err(|source| MaterializeError::CreateDir {
                path: folder.clone(),
                source,
            })?;

        let primary = folder.join(file_name);
        tokio::fs::write(&primary, content)
            .await
            .map_err(|source| MaterializeError::Write {
                path: primary.clone(),
                source,
            })?;
        debug!(
            path = %primary.display(),
            bytes = content.len(),
            header = self.include_header,
            "Wrote primary artifact"
        );

        let replica = match &upload.replica_output_folder {
            Some(replica_folder) => replicate(&primary, replica_folder, file_name).await,
            None => ReplicaOutcome::NotConfigured,
        };

        Ok(Materialized { primary, replica })
    }
}

/// Copy `primary` into `replica_folder`, overwriting an existing file.
async fn replicate(primary: &Path, replica_folder: &Path, file_name: &str) -> ReplicaOutcome {
    let target = replica_folder.join(file_name);

    if let Err(e) = tokio::fs::create_dir_all(replica_folder).await {
        error!(
            folder = %replica_folder.display(),
            error = %e,
            "Failed to create replica folder; primary artifact kept"
        );
        return ReplicaOutcome::Failed {
            path: target,
            reason: e.to_string(),
        };
    }

    match tokio::fs::copy(primary, &target).await {
        Ok(_) => {
            debug!(path = %target.display(), "Copied artifact to replica folder");
            ReplicaOutcome::Copied(target)
        }
        Err(e) => {
            error!(
                path = %target.display(),
                error = %e,
                "Failed to copy artifact to replica folder; primary artifact kept"
            );
            ReplicaOutcome::Failed {
                path: target,
                reason: e.to_string(),
            }
        }
    }
}

/// Create the configured output folders, logging instead of failing.
///
/// Used at startup and whenever a new settings snapshot is published.
/// Returns `true` when every configured folder exists afterwards.
pub async fn ensure_output_dirs(upload: &UploadSettings) -> bool {
    let folders = std::iter::once(&upload.csv_output_folder)
        .chain(upload.replica_output_folder.as_ref());

    let mut all_ok = true;
    for folder in folders {
        if let Err(e) = tokio::fs::create_dir_all(folder).await {
            warn!(
                folder = %folder.display(),
                error = %e,
                "Failed to create output folder"
            );
            all_ok = false;
        }
    }
    all_ok
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(10, 0, 0))
            .unwrap()
    }

    fn upload_to(primary: &Path, replica: Option<&Path>) -> UploadSettings {
        UploadSettings {
            csv_output_folder: primary.to_path_buf(),
            replica_output_folder: replica.map(Path::to_path_buf),
            ..UploadSettings::default()
        }
    }

    #[tokio::test]
    async fn writes_primary_and_creates_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("nested").join("csv");
        let mut row = ItemLogRecord::new(1, stamp());
        row.sku = Some("A,B".to_owned());

        let out = Materializer::new()
            .materialize(&row, &upload_to(&primary, None))
            .await
            .unwrap();

        assert_eq!(out.primary, primary.join("record_1_20240101_100000.csv"));
        assert_eq!(out.replica, ReplicaOutcome::NotConfigured);
        let written = std::fs::read_to_string(&out.primary).unwrap();
        assert!(written.starts_with("1,2024-01-01T10:00:00,\"A,B\","));
        assert!(written.ends_with("\r\n"));
    }

    #[tokio::test]
    async fn replica_receives_identical_copy_and_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("primary");
        let replica = dir.path().join("replica");
        let stale = replica.join("record_2_20240101_100000.csv");
        std::fs::create_dir_all(&replica).unwrap();
        std::fs::write(&stale, "stale").unwrap();

        let out = Materializer::new()
            .materialize(&ItemLogRecord::new(2, stamp()), &upload_to(&primary, Some(&replica)))
            .await
            .unwrap();

        assert_eq!(out.replica, ReplicaOutcome::Copied(stale.clone()));
        assert_eq!(
            std::fs::read(&out.primary).unwrap(),
            std::fs::read(&stale).unwrap()
        );
    }

    #[tokio::test]
    async fn unusable_replica_does_not_fail_primary() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("primary");
        // A regular file where the replica folder should be.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a folder").unwrap();
        let replica = blocker.join("replica");

        let out = Materializer::new()
            .materialize(&ItemLogRecord::new(3, stamp()), &upload_to(&primary, Some(&replica)))
            .await
            .unwrap();

        assert!(out.primary.exists());
        assert!(matches!(out.replica, ReplicaOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn unusable_primary_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a folder").unwrap();

        let err = Materializer::new()
            .materialize(&ItemLogRecord::new(4, stamp()), &upload_to(&blocker.join("csv"), None))
            .await
            .unwrap_err();

        assert!(matches!(err, MaterializeError::CreateDir { .. }));
    }

    #[tokio::test]
    async fn header_is_written_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let out = Materializer::new()
            .with_header(true)
            .materialize(&ItemLogRecord::new(5, stamp()), &upload_to(dir.path(), None))
            .await
            .unwrap();

        let written = std::fs::read_to_string(&out.primary).unwrap();
        let mut lines = written.split("\r\n");
        assert!(lines.next().unwrap().starts_with("id,date_time_stamp"));
        assert!(lines.next().unwrap().starts_with("5,"));
    }

    #[tokio::test]
    async fn batch_rejects_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = Materializer::new()
            .materialize_batch(&[], None, &upload_to(dir.path(), None))
            .await
            .unwrap_err();
        assert!(matches!(err, MaterializeError::Empty));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn batch_writes_one_line_per_row() {
        let dir = tempfile::tempdir().unwrap();
        let rows = [ItemLogRecord::new(1, stamp()), ItemLogRecord::new(2, stamp())];
        let out = Materializer::new()
            .materialize_batch(&rows, Some("shift:1.csv"), &upload_to(dir.path(), None))
            .await
            .unwrap();

        assert_eq!(out.primary, dir.path().join("shift_1.csv"));
        let written = std::fs::read_to_string(&out.primary).unwrap();
        assert_eq!(written.matches("\r\n").count(), 2);
    }

    #[tokio::test]
    async fn ensure_output_dirs_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let ok = upload_to(&dir.path().join("a"), Some(&dir.path().join("b")));
        assert!(ensure_output_dirs(&ok).await);
        assert!(dir.path().join("b").is_dir());

        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let bad = upload_to(&dir.path().join("c"), Some(&blocker.join("d")));
        assert!(!ensure_output_dirs(&bad).await);
        assert!(dir.path().join("c").is_dir());
    }
}
