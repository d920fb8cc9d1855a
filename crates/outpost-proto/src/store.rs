//! ---
//! upd_section: "03-update-protocol"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Request/status protocol types and shared store."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::message::{UpdateRequest, UpdateStatus};
use crate::{ProtocolError, Result};

/// Durable, byte-addressable store shared across the privilege boundary.
///
/// Holds one JSON file per request id under `requests/` and `status/`.
/// All writes go through a temp-file-then-rename cycle so a reader can
/// never observe a half-written file.
#[derive(Debug, Clone)]
pub struct SharedStore {
    requests_dir: PathBuf,
    status_dir: PathBuf,
}

impl SharedStore {
    /// Open the store, creating both directories when missing.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(requests_dir: P, status_dir: Q) -> Result<Self> {
        let requests_dir = requests_dir.as_ref().to_path_buf();
        let status_dir = status_dir.as_ref().to_path_buf();
        fs::create_dir_all(&requests_dir)?;
        fs::create_dir_all(&status_dir)?;
        Ok(Self {
            requests_dir,
            status_dir,
        })
    }

    /// Directory holding pending request files.
    #[must_use]
    pub fn requests_dir(&self) -> &Path {
        &self.requests_dir
    }

    /// Directory holding status files.
    #[must_use]
    pub fn status_dir(&self) -> &Path {
        &self.status_dir
    }

    /// Atomically publish a request file keyed by its id.
    pub fn publish_request(&self, request: &UpdateRequest) -> Result<PathBuf> {
        let path = write_atomic(&self.requests_dir, request.request_id, request)?;
        debug!(request_id = %request.request_id, component = %request.component, "request published");
        Ok(path)
    }

    /// Atomically publish a status file keyed by its request id.
    pub fn publish_status(&self, status: &UpdateStatus) -> Result<PathBuf> {
        let path = write_atomic(&self.status_dir, status.request_id, status)?;
        debug!(request_id = %status.request_id, success = status.success, "status published");
        Ok(path)
    }

    /// Read and delete the status for `request_id`, when present.
    ///
    /// Deletion is the claim signal: once taken, the transaction is finished
    /// from the store's point of view. A malformed status file is removed
    /// and reported as absent.
    pub fn take_status(&self, request_id: Uuid) -> Result<Option<UpdateStatus>> {
        let path = entry_path(&self.status_dir, request_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let status = match serde_json::from_str::<UpdateStatus>(&raw) {
            Ok(status) => status,
            Err(err) => {
                // A corrupt status can never be matched to its transaction.
                // Quarantine it and let the caller keep polling until its
                // own timeout fires.
                warn!(path = %path.display(), error = %err, "discarding malformed status");
                remove_if_present(&path)?;
                return Ok(None);
            }
        };
        remove_if_present(&path)?;
        Ok(Some(status))
    }

    /// Delete the request file for `request_id`; returns whether it existed.
    pub fn remove_request(&self, request_id: Uuid) -> Result<bool> {
        remove_if_present(&entry_path(&self.requests_dir, request_id))
    }

    /// Delete the status file for `request_id`; returns whether it existed.
    pub fn remove_status(&self, request_id: Uuid) -> Result<bool> {
        remove_if_present(&entry_path(&self.status_dir, request_id))
    }

    /// Delete an arbitrary store file; used to quarantine malformed entries.
    pub fn remove_file(&self, path: &Path) -> Result<bool> {
        remove_if_present(path)
    }

    /// Pending request files ordered oldest first by modification time.
    /// Temp files still being written are excluded.
    pub fn pending_requests(&self) -> Result<Vec<PathBuf>> {
        let mut entries: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.requests_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push((modified, path));
        }
        entries.sort();
        Ok(entries.into_iter().map(|(_, path)| path).collect())
    }

    /// Parse a request file, mapping parse failures to [`ProtocolError::Malformed`].
    pub fn read_request(&self, path: &Path) -> Result<UpdateRequest> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str::<UpdateRequest>(&raw).map_err(|err| ProtocolError::Malformed {
            path: path.display().to_string(),
            reason: err.to_string(),
        })
    }

    /// Delete status files older than `ttl` that nobody claimed; returns the
    /// number removed. Late statuses arriving after an orchestrator-side
    /// timeout are retired here instead of being applied to stale call state.
    pub fn sweep_statuses(&self, ttl: Duration) -> Result<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(ttl)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;
        for entry in fs::read_dir(&self.status_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(modified) = entry.metadata().and_then(|meta| meta.modified()) else {
                continue;
            };
            if modified < cutoff && remove_if_present(&path)? {
                warn!(path = %path.display(), "expired unclaimed status removed");
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn entry_path(dir: &Path, request_id: Uuid) -> PathBuf {
    dir.join(format!("{request_id}.json"))
}

// Write-to-temp-then-rename so readers only ever see complete files.
fn write_atomic<T: Serialize>(dir: &Path, request_id: Uuid, payload: &T) -> Result<PathBuf> {
    let final_path = entry_path(dir, request_id);
    let tmp_path = dir.join(format!(".{request_id}.json.tmp"));
    let serialized = serde_json::to_vec_pretty(payload)?;
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&serialized)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, &final_path)?;
    Ok(final_path)
}

fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Action;

    fn store() -> (tempfile::TempDir, SharedStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SharedStore::open(dir.path().join("requests"), dir.path().join("status"))
            .expect("store opens");
        (dir, store)
    }

    #[test]
    fn publish_then_scan_then_remove() {
        let (_guard, store) = store();
        let request = UpdateRequest::new("scheduler", Action::Update, Some("1.1.0".into()));
        store.publish_request(&request).expect("publish");

        let pending = store.pending_requests().expect("scan");
        assert_eq!(pending.len(), 1);
        let loaded = store.read_request(&pending[0]).expect("read");
        assert_eq!(loaded.request_id, request.request_id);

        assert!(store.remove_request(request.request_id).expect("remove"));
        assert!(store.pending_requests().expect("scan").is_empty());
        assert!(!store.remove_request(request.request_id).expect("idempotent"));
    }

    #[test]
    fn take_status_deletes_after_read() {
        let (_guard, store) = store();
        let request = UpdateRequest::new("core", Action::Health, None);
        let status = UpdateStatus::success(&request, "healthy", String::new());
        store.publish_status(&status).expect("publish");

        let taken = store
            .take_status(request.request_id)
            .expect("take")
            .expect("present");
        assert!(taken.success);
        assert!(store
            .take_status(request.request_id)
            .expect("second take")
            .is_none());
    }

    #[test]
    fn scan_skips_temp_files() {
        let (_guard, store) = store();
        let stray = store.requests_dir().join(".half-written.json.tmp");
        fs::write(&stray, b"{").expect("write stray");
        assert!(store.pending_requests().expect("scan").is_empty());
    }

    #[test]
    fn malformed_request_reports_path() {
        let (_guard, store) = store();
        let path = store.requests_dir().join(format!("{}.json", Uuid::new_v4()));
        fs::write(&path, b"not json").expect("write");
        let err = store.read_request(&path).expect_err("malformed");
        assert!(matches!(err, ProtocolError::Malformed { .. }));
    }

    #[test]
    fn malformed_status_is_quarantined_and_reported_absent() {
        let (_guard, store) = store();
        let request = UpdateRequest::new("core", Action::Update, Some("1.1.0".into()));
        let path = store
            .status_dir()
            .join(format!("{}.json", request.request_id));
        fs::write(&path, b"not a status").expect("write garbage");

        assert!(store
            .take_status(request.request_id)
            .expect("take tolerates corruption")
            .is_none());
        assert!(!path.exists(), "corrupt file must be removed");

        // A well-formed status written afterwards is still claimable.
        let status = UpdateStatus::success(&request, "core updated to 1.1.0", String::new());
        store.publish_status(&status).expect("publish");
        assert!(store
            .take_status(request.request_id)
            .expect("take")
            .is_some());
    }

    #[test]
    fn sweep_removes_only_expired_statuses() {
        let (_guard, store) = store();
        let request = UpdateRequest::new("core", Action::Health, None);
        let status = UpdateStatus::success(&request, "healthy", String::new());
        store.publish_status(&status).expect("publish");

        // Fresh status survives a generous TTL.
        let removed = store.sweep_statuses(Duration::from_secs(3600)).expect("sweep");
        assert_eq!(removed, 0);
        // Zero TTL retires everything.
        std::thread::sleep(Duration::from_millis(20));
        let removed = store.sweep_statuses(Duration::from_secs(0)).expect("sweep");
        assert_eq!(removed, 1);
        assert!(store.take_status(request.request_id).expect("take").is_none());
    }
}
