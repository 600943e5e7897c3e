//! Quarantine store: durable name → quarantine-time mapping
//!
//! The store is a plain `load`/`save` pair so the pool never cares where the
//! map lives. `JsonFileStore` is the production backend: a human-readable JSON
//! object of credential name → RFC 3339 timestamp, rewritten in full on every
//! mutation with temp-file + rename so a crash or a concurrent writer never
//! leaves a torn file behind.
//!
//! A single store holds entries for every pool, keyed by credential name, so
//! names must be unique across key-type families. The store also owns the
//! write lock: every pool built on it takes that lock around a
//! load-modify-save sequence, so two pools never overwrite each other.

use std::collections::BTreeMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

/// Credential name → time it was quarantined.
pub type QuarantineMap = BTreeMap<String, DateTime<Utc>>;

/// Durable backing for quarantine entries.
///
/// Uses `Pin<Box<dyn Future>>` return types so pools can hold
/// `Arc<dyn QuarantineStore>`.
pub trait QuarantineStore: Send + Sync {
    /// Read every entry. A store that was never written is empty, not an error.
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<QuarantineMap>> + Send + '_>>;

    /// Replace the stored entries with `entries`.
    fn save<'a>(
        &'a self,
        entries: &'a QuarantineMap,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Lock held across a `load` → modify → `save` sequence.
    ///
    /// Shared by every caller of this store, so updates from different pools
    /// in one process never interleave.
    fn write_lock(&self) -> &Mutex<()>;
}

/// JSON file backend.
///
/// Writers in one process serialize through `write_lock()`; share one
/// instance (behind an `Arc`) between every pool using the file. Only one
/// process should own a given file at a time.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl QuarantineStore for JsonFileStore {
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<QuarantineMap>> + Send + '_>> {
        Box::pin(read_entries(&self.path))
    }

    fn save<'a>(
        &'a self,
        entries: &'a QuarantineMap,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(write_atomic(&self.path, entries))
    }

    fn write_lock(&self) -> &Mutex<()> {
        &self.write_lock
    }
}

/// Process-local store, for tests and deployments that accept losing
/// quarantine state on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: std::sync::Mutex<QuarantineMap>,
    write_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: QuarantineMap) -> Self {
        Self {
            entries: std::sync::Mutex::new(entries),
            write_lock: Mutex::new(()),
        }
    }
}

impl QuarantineStore for MemoryStore {
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<QuarantineMap>> + Send + '_>> {
        let result = self
            .entries
            .lock()
            .map(|entries| entries.clone())
            .map_err(|_| Error::Persistence("memory store lock poisoned".into()));
        Box::pin(std::future::ready(result))
    }

    fn save<'a>(
        &'a self,
        entries: &'a QuarantineMap,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        let result = self
            .entries
            .lock()
            .map(|mut stored| *stored = entries.clone())
            .map_err(|_| Error::Persistence("memory store lock poisoned".into()));
        Box::pin(std::future::ready(result))
    }

    fn write_lock(&self) -> &Mutex<()> {
        &self.write_lock
    }
}

/// Parse a stored timestamp.
///
/// Accepts RFC 3339, and naive ISO-8601 (`2024-05-01T10:20:30.123456`).
/// Naive stamps are host local time, as older files were written; an
/// ambiguous local time (DST fold) takes the earlier instant, and a time that
/// does not exist locally is read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(at.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Some(
        naive
            .and_local_timezone(Local)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc()),
    )
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

async fn read_entries(path: &Path) -> Result<QuarantineMap> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(QuarantineMap::new()),
        Err(e) => {
            return Err(Error::Persistence(format!(
                "reading {}: {e}",
                path.display()
            )));
        }
    };

    if contents.trim().is_empty() {
        return Ok(QuarantineMap::new());
    }

    let raw: BTreeMap<String, String> = serde_json::from_str(&contents)
        .map_err(|e| Error::Malformed(format!("parsing {}: {e}", path.display())))?;

    let mut entries = QuarantineMap::new();
    for (name, value) in raw {
        let at = parse_timestamp(&value).ok_or_else(|| {
            Error::Malformed(format!("entry {name} has invalid timestamp {value:?}"))
        })?;
        entries.insert(name, at);
    }
    Ok(entries)
}

/// Distinguishes temp files of concurrent writers within one process.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Write entries to `path` atomically.
///
/// Writes a uniquely named temp file in the same directory, sets 0600 on unix,
/// then renames it over the target.
async fn write_atomic(path: &Path, entries: &QuarantineMap) -> Result<()> {
    let raw: BTreeMap<&str, String> = entries
        .iter()
        .map(|(name, at)| (name.as_str(), format_timestamp(at)))
        .collect();
    let json = serde_json::to_string_pretty(&raw)
        .map_err(|e| Error::Persistence(format!("serializing quarantine entries: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::Persistence(format!("creating {}: {e}", dir.display())))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Persistence(format!("invalid store path {}", path.display())))?;
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}.{seq}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Persistence(format!("writing temp store file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Persistence(format!("setting store file permissions: {e}")))?;
    }

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::Persistence(format!("renaming temp store file: {e}")));
    }

    debug!(path = %path.display(), entries = entries.len(), "persisted quarantine store");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::sync::Arc;

    fn entries(names: &[&str]) -> QuarantineMap {
        let now = Utc::now();
        names.iter().map(|n| (n.to_string(), now)).collect()
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("waiting_list.json"));

        let loaded = store.load().await.unwrap();
        assert!(loaded.is_empty());
        assert!(!store.path().exists(), "load must not create the file");
    }

    #[tokio::test]
    async fn save_then_load_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waiting_list.json");
        let store = JsonFileStore::new(&path);

        let saved = entries(&["TEXT_KEY_1", "BING_AUTH_COOKIE_3"]);
        store.save(&saved).await.unwrap();

        let loaded = JsonFileStore::new(&path).load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        for (name, at) in &saved {
            let got = loaded[name];
            // Stored with microsecond precision.
            assert!((got - *at).abs() < TimeDelta::microseconds(1), "{name}");
        }
    }

    #[tokio::test]
    async fn file_is_human_readable_json_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waiting_list.json");
        let store = JsonFileStore::new(&path);
        store.save(&entries(&["K_1"])).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        let ts = parsed["K_1"].as_str().unwrap();
        assert!(ts.ends_with('Z'), "timestamp should be UTC RFC 3339, got {ts}");
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
        assert!(contents.contains('\n'), "expected pretty-printed JSON");
    }

    #[tokio::test]
    async fn empty_map_writes_empty_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waiting_list.json");
        let store = JsonFileStore::new(&path);
        store.save(&entries(&["K_1"])).await.unwrap();
        store.save(&QuarantineMap::new()).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&contents).unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn accepts_naive_iso_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waiting_list.json");
        tokio::fs::write(
            &path,
            r#"{"K_1": "2024-05-01T10:20:30.123456", "K_2": "2024-05-01T10:20:30"}"#,
        )
        .await
        .unwrap();

        let loaded = JsonFileStore::new(&path).load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded["K_1"] - loaded["K_2"],
            TimeDelta::microseconds(123_456)
        );
    }

    #[tokio::test]
    async fn naive_timestamps_are_local_time() {
        // A stamp written "now" in naive local time must load as now,
        // whatever the host's UTC offset.
        let written = Local::now().naive_local();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waiting_list.json");
        let contents = serde_json::json!({
            "K_1": written.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
        });
        tokio::fs::write(&path, contents.to_string()).await.unwrap();

        let loaded = JsonFileStore::new(&path).load().await.unwrap();
        let skew = (Utc::now() - loaded["K_1"]).num_seconds().abs();
        assert!(skew < 60, "naive stamp shifted by {skew}s");
    }

    #[tokio::test]
    async fn offset_timestamps_normalize_to_utc() {
        let at = parse_timestamp("2024-05-01T12:00:00+02:00").unwrap();
        assert_eq!(format_timestamp(&at), "2024-05-01T10:00:00.000000Z");
    }

    #[tokio::test]
    async fn blank_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waiting_list.json");
        tokio::fs::write(&path, "  \n").await.unwrap();

        assert!(JsonFileStore::new(&path).load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_json_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waiting_list.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, Error::Malformed(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn invalid_timestamp_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waiting_list.json");
        tokio::fs::write(&path, r#"{"K_1": "yesterday"}"#)
            .await
            .unwrap();

        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(err.to_string().contains("K_1"), "got: {err}");
    }

    #[tokio::test]
    async fn unreadable_path_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be read as a file.
        let err = JsonFileStore::new(dir.path()).load().await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("nested").join("waiting_list.json");
        let store = JsonFileStore::new(&path);

        store.save(&entries(&["K_1"])).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("waiting_list.json"));
        store.save(&entries(&["K_1"])).await.unwrap();

        let mut names = Vec::new();
        let mut read_dir = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = read_dir.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["waiting_list.json"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waiting_list.json");
        JsonFileStore::new(&path)
            .save(&entries(&["K_1"]))
            .await
            .unwrap();

        let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "store file must be 0600, got {mode:o}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_saves_never_tear_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waiting_list.json");
        let store = Arc::new(JsonFileStore::new(&path));

        let mut handles = vec![];
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let names: Vec<String> = (0..=i).map(|j| format!("K_{j}")).collect();
                let refs: Vec<&str> = names.iter().map(String::as_str).collect();
                store.save(&entries(&refs)).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let loaded = store.load().await.unwrap();
        assert!(!loaded.is_empty());
        assert!(loaded.contains_key("K_0"));
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryStore::new();
        assert!(store.load().await.unwrap().is_empty());

        store.save(&entries(&["K_1", "K_2"])).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["K_1", "K_2"]);

        let seeded = MemoryStore::with_entries(entries(&["K_9"]));
        assert!(seeded.load().await.unwrap().contains_key("K_9"));
    }
}
