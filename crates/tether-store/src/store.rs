use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use tether_core::ids::SessionId;

use crate::error::StoreError;
use crate::snapshot::SessionSnapshot;

/// Temporary write artifacts older than this are considered orphaned by a
/// crashed writer and swept.
const ORPHAN_MAX_AGE: Duration = Duration::from_secs(60 * 60);

const SNAPSHOT_EXT: &str = ".json";
const TEMP_MARKER: &str = ".tmp.";

/// Outcome of a retention sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub evicted: usize,
    /// Entries the sweep could not inspect or remove. The sweep continues
    /// past these rather than aborting.
    pub failed: usize,
}

/// Crash-safe snapshot storage: one JSON file per session in a flat base
/// directory. Writes go to a temporary sibling and are renamed into place, so
/// a concurrent reader only ever observes a committed file and a crash leaves
/// at worst an orphaned temp artifact.
pub struct SnapshotStore {
    base_dir: PathBuf,
}

impl SnapshotStore {
    /// Open the store, creating the base directory and sweeping any orphaned
    /// temp artifacts left by a previous process.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        let store = Self { base_dir };
        let swept = store.sweep_orphans();
        info!(dir = %store.base_dir.display(), swept, "snapshot store opened");
        Ok(store)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn snapshot_path(&self, id: &SessionId) -> PathBuf {
        self.base_dir.join(format!("{}{SNAPSHOT_EXT}", id.as_str()))
    }

    /// Temp names carry pid + timestamp so concurrent processes sharing the
    /// store never collide on the same artifact.
    fn temp_path(&self, id: &SessionId) -> PathBuf {
        let nanos = Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        self.base_dir.join(format!(
            "{}{SNAPSHOT_EXT}{TEMP_MARKER}{}.{}",
            id.as_str(),
            std::process::id(),
            nanos,
        ))
    }

    /// Durably write a snapshot. Write-to-temp-then-rename: the live file is
    /// replaced atomically or not at all.
    #[instrument(skip(self, snapshot), fields(session_id = %snapshot.id))]
    pub fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let temp = self.temp_path(&snapshot.id);
        let live = self.snapshot_path(&snapshot.id);

        if let Err(e) = fs::write(&temp, &json) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp, &live) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        debug!(path = %live.display(), "snapshot saved");
        Ok(())
    }

    /// Load a snapshot. Missing or malformed content yields None; corruption
    /// never propagates as a fatal error.
    #[instrument(skip(self), fields(session_id = %id))]
    pub fn load(&self, id: &SessionId) -> Option<SessionSnapshot> {
        let path = self.snapshot_path(id);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "snapshot unreadable");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "snapshot malformed, ignoring");
                None
            }
        }
    }

    /// Two-phase retention: drop snapshots idle longer than `max_age`, then
    /// drop least-recently-accessed snapshots until at most `max_count`
    /// remain. Individual entry failures are counted and skipped.
    ///
    /// Only committed files are ever unlinked here; an in-flight save's temp
    /// artifact is untouchable by this sweep, so a concurrent write always
    /// wins over an eviction decision made from stale metadata.
    #[instrument(skip(self))]
    pub fn cleanup(&self, max_age: Duration, max_count: usize) -> CleanupReport {
        let mut report = CleanupReport::default();
        let now = SystemTime::now();

        let mut entries: Vec<(PathBuf, SystemTime)> = Vec::new();
        let dir = match fs::read_dir(&self.base_dir) {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "retention sweep could not list store");
                report.failed += 1;
                return report;
            }
        };
        for entry in dir {
            let path = match entry {
                Ok(e) => e.path(),
                Err(_) => {
                    report.failed += 1;
                    continue;
                }
            };
            if !is_committed_snapshot(&path) {
                continue;
            }
            match fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(modified) => entries.push((path, modified)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "retention sweep skipping entry");
                    report.failed += 1;
                }
            }
        }

        // Phase 1: age-based eviction.
        entries.retain(|(path, modified)| {
            let expired = now
                .duration_since(*modified)
                .map(|idle| idle > max_age)
                .unwrap_or(false);
            if !expired {
                return true;
            }
            match fs::remove_file(path) {
                Ok(()) => {
                    debug!(path = %path.display(), "evicted expired snapshot");
                    report.evicted += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "eviction failed");
                    report.failed += 1;
                }
            }
            false
        });

        // Phase 2: LRU down to max_count.
        if entries.len() > max_count {
            entries.sort_by_key(|(_, modified)| *modified);
            let excess = entries.len() - max_count;
            for (path, _) in entries.into_iter().take(excess) {
                match fs::remove_file(&path) {
                    Ok(()) => {
                        debug!(path = %path.display(), "evicted over-count snapshot");
                        report.evicted += 1;
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "eviction failed");
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }

    /// Best-effort hygiene: unlink temp artifacts older than an hour. Run at
    /// open and again on process-exit signals.
    pub fn sweep_orphans(&self) -> usize {
        let mut swept = 0;
        let Ok(dir) = fs::read_dir(&self.base_dir) else {
            return 0;
        };
        let now = SystemTime::now();
        for entry in dir.flatten() {
            let path = entry.path();
            if !is_temp_artifact(&path) {
                continue;
            }
            let old_enough = fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .map(|age| age > ORPHAN_MAX_AGE)
                .unwrap_or(false);
            if old_enough && fs::remove_file(&path).is_ok() {
                debug!(path = %path.display(), "swept orphaned temp artifact");
                swept += 1;
            }
        }
        swept
    }
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

fn is_committed_snapshot(path: &Path) -> bool {
    let name = file_name(path);
    name.ends_with(SNAPSHOT_EXT) && !name.contains(TEMP_MARKER)
}

fn is_temp_artifact(path: &Path) -> bool {
    file_name(path).contains(TEMP_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::permission::PermissionMode;

    fn temp_store() -> SnapshotStore {
        let dir = std::env::temp_dir().join(format!("tether-store-{}", uuid::Uuid::now_v7()));
        SnapshotStore::open(dir).unwrap()
    }

    fn snapshot(id: &str) -> SessionSnapshot {
        SessionSnapshot::new(SessionId::from_raw(id), PermissionMode::Default)
    }

    #[test]
    fn save_then_load_roundtrip() {
        let store = temp_store();
        let mut snap = snapshot("sess_rt");
        snap.continuation = Some("cont_1".into());
        snap.metadata = serde_json::json!({"turn_notice_sent": false});
        store.save(&snap).unwrap();

        let loaded = store.load(&snap.id).expect("snapshot should exist");
        assert_eq!(loaded.id, snap.id);
        assert_eq!(loaded.continuation.as_deref(), Some("cont_1"));
        assert_eq!(loaded.permission_mode, snap.permission_mode);
        assert_eq!(loaded.created_at, snap.created_at);
        assert_eq!(loaded.last_accessed_at, snap.last_accessed_at);
        assert_eq!(loaded.metadata, snap.metadata);
    }

    #[test]
    fn load_missing_returns_none() {
        let store = temp_store();
        assert!(store.load(&SessionId::from_raw("sess_absent")).is_none());
    }

    #[test]
    fn load_malformed_returns_none() {
        let store = temp_store();
        let path = store.base_dir().join("sess_bad.json");
        fs::write(&path, "{ this is not valid json").unwrap();
        assert!(store.load(&SessionId::from_raw("sess_bad")).is_none());
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let store = temp_store();
        let mut snap = snapshot("sess_ow");
        store.save(&snap).unwrap();

        snap.continuation = Some("cont_new".into());
        store.save(&snap).unwrap();

        let loaded = store.load(&snap.id).unwrap();
        assert_eq!(loaded.continuation.as_deref(), Some("cont_new"));
    }

    #[test]
    fn save_leaves_no_temp_artifacts() {
        let store = temp_store();
        store.save(&snapshot("sess_clean")).unwrap();
        let leftovers: Vec<_> = fs::read_dir(store.base_dir())
            .unwrap()
            .flatten()
            .filter(|e| is_temp_artifact(&e.path()))
            .collect();
        assert!(leftovers.is_empty(), "temp artifacts left behind: {leftovers:?}");
    }

    #[test]
    fn cleanup_age_phase_evicts_idle_snapshots() {
        let store = temp_store();
        store.save(&snapshot("sess_old")).unwrap();

        // everything is older than a zero max_age
        let report = store.cleanup(Duration::ZERO, 100);
        assert_eq!(report.evicted, 1);
        assert_eq!(report.failed, 0);
        assert!(store.load(&SessionId::from_raw("sess_old")).is_none());
    }

    #[test]
    fn cleanup_count_phase_keeps_most_recent() {
        let store = temp_store();
        for name in ["sess_a", "sess_b", "sess_c"] {
            store.save(&snapshot(name)).unwrap();
            // order file mtimes
            std::thread::sleep(Duration::from_millis(20));
        }

        let report = store.cleanup(Duration::from_secs(3600), 1);
        assert_eq!(report.evicted, 2);
        assert!(store.load(&SessionId::from_raw("sess_a")).is_none());
        assert!(store.load(&SessionId::from_raw("sess_b")).is_none());
        assert!(store.load(&SessionId::from_raw("sess_c")).is_some());
    }

    #[test]
    fn cleanup_under_limits_evicts_nothing() {
        let store = temp_store();
        store.save(&snapshot("sess_keep")).unwrap();
        let report = store.cleanup(Duration::from_secs(3600), 10);
        assert_eq!(report, CleanupReport::default());
        assert!(store.load(&SessionId::from_raw("sess_keep")).is_some());
    }

    #[test]
    fn cleanup_never_touches_temp_artifacts() {
        let store = temp_store();
        let temp = store.base_dir().join("sess_x.json.tmp.1234.5678");
        fs::write(&temp, "in-flight write").unwrap();

        store.cleanup(Duration::ZERO, 0);
        assert!(temp.exists(), "retention sweep must not unlink temp files");
    }

    #[test]
    fn orphan_sweep_ignores_fresh_temps() {
        let store = temp_store();
        let temp = store.base_dir().join("sess_y.json.tmp.1234.5678");
        fs::write(&temp, "fresh").unwrap();

        // a freshly written temp is under the hour threshold
        assert_eq!(store.sweep_orphans(), 0);
        assert!(temp.exists());
    }

    #[test]
    fn open_is_idempotent_on_existing_dir() {
        let dir = std::env::temp_dir().join(format!("tether-store-{}", uuid::Uuid::now_v7()));
        let first = SnapshotStore::open(&dir).unwrap();
        first.save(&snapshot("sess_z")).unwrap();

        let second = SnapshotStore::open(&dir).unwrap();
        assert!(second.load(&SessionId::from_raw("sess_z")).is_some());
    }
}
