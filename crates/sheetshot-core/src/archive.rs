//! JSON-backed screenshot archive.
//!
//! Images live under `<root>/user_<id>/chat_<id>/` and a single
//! `<root>/metadata.json` maps each scope to its records. Records saved into
//! [`Scope::SYSTEM`] are visible from every other scope.

use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::error::{CoreError, Result};
use crate::labels::{label_contains, labels_match, strip_category_prefix};
use crate::schema::{
    date_prefix, format_timestamp, BatchDeleteReport, MetadataIndex, Scope, ScreenshotRecord,
};

pub const METADATA_FILE: &str = "metadata.json";

pub struct ArchiveStore {
    root: PathBuf,
    metadata_path: PathBuf,
    index: Mutex<MetadataIndex>,
}

impl ArchiveStore {
    /// Open the archive rooted at `root`, creating the directory if needed.
    ///
    /// A missing or unreadable metadata document yields an empty index.
    pub fn open(root: &Path) -> Result<Self> {
        if !root.exists() {
            fs::create_dir_all(root)?;
            info!(path = %root.display(), "created storage directory");
        }

        let metadata_path = root.join(METADATA_FILE);
        let index = match read_index(&metadata_path) {
            Ok(Some(index)) => {
                debug!(scopes = index.len(), "metadata loaded");
                index
            }
            Ok(None) => MetadataIndex::new(),
            Err(e) => {
                warn!(path = %metadata_path.display(), error = %e, "metadata unreadable, starting empty");
                MetadataIndex::new()
            }
        };

        Ok(Self {
            root: root.to_path_buf(),
            metadata_path,
            index: Mutex::new(index),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    /// Directory holding the images of `scope`.
    pub fn scope_dir(&self, scope: Scope) -> PathBuf {
        self.root
            .join(format!("user_{}", scope.user_id))
            .join(format!("chat_{}", scope.chat_id))
    }

    /// Copy of the current in-memory index.
    pub fn snapshot(&self) -> MetadataIndex {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, MetadataIndex> {
        self.index.lock().unwrap_or_else(|e| {
            warn!("metadata mutex was poisoned, recovering");
            e.into_inner()
        })
    }

    /// Rewrite the metadata document (temp file + rename).
    fn persist(&self, index: &MetadataIndex) -> Result<()> {
        let json = serde_json::to_vec_pretty(index)?;
        let tmp = self.metadata_path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.metadata_path)?;
        Ok(())
    }

    // -- Save --

    /// Store `data` under `scope` with the current UTC time.
    ///
    /// Returns the image path, or `None` if the image or the metadata could
    /// not be written. An existing image is never overwritten.
    pub fn save(&self, data: &[u8], label: &str, scope: Scope) -> Option<PathBuf> {
        self.save_at(data, label, scope, Utc::now())
    }

    /// Same as [`save`](Self::save) with an explicit creation time.
    pub fn save_at(
        &self,
        data: &[u8],
        label: &str,
        scope: Scope,
        at: DateTime<Utc>,
    ) -> Option<PathBuf> {
        match self.try_save(data, label, scope, at) {
            Ok(path) => Some(path),
            Err(e) => {
                error!(scope = %scope, label, error = %e, "failed to save screenshot");
                None
            }
        }
    }

    fn try_save(
        &self,
        data: &[u8],
        label: &str,
        scope: Scope,
        at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let timestamp = format_timestamp(at);
        let dir = self.scope_dir(scope);
        let path = dir.join(format!("screenshot_{timestamp}.png"));

        let mut index = self.lock();

        fs::create_dir_all(&dir)?;
        write_new(&path, data)?;

        let record = ScreenshotRecord {
            label: label.to_string(),
            timestamp,
            filepath: path.to_string_lossy().into_owned(),
            user_id: scope.user_id,
            chat_id: scope.chat_id,
        };
        index.entry(scope).or_default().push(record);

        if let Err(e) = self.persist(&index) {
            if let Some(records) = index.get_mut(&scope) {
                records.pop();
                if records.is_empty() {
                    index.remove(&scope);
                }
            }
            error!(path = %path.display(), "metadata write failed, image file left orphaned");
            return Err(e);
        }

        info!(
            scope = %scope,
            label,
            path = %path.display(),
            "saved screenshot"
        );
        Ok(path)
    }

    // -- Queries --

    /// Every record visible from `scope`, newest first.
    pub fn get_all(&self, scope: Scope) -> Vec<ScreenshotRecord> {
        let index = self.lock();
        sorted_desc(visible_records(&index, scope))
    }

    /// Records visible from `scope` whose label matches `label` after
    /// normalization, newest first.
    pub fn get_by_label(&self, label: &str, scope: Scope) -> Vec<ScreenshotRecord> {
        let label = strip_category_prefix(label);
        let index = self.lock();
        let matches: Vec<_> = visible_records(&index, scope)
            .into_iter()
            .filter(|r| labels_match(&r.label, label))
            .collect();

        debug!(scope = %scope, label, found = matches.len(), "label lookup");
        sorted_desc(matches)
    }

    /// Records visible from `scope` created on `date` (`YYYY-MM-DD`, or a
    /// shorter `YYYY-MM` / `YYYY` prefix), newest first.
    pub fn get_by_date(&self, date: &str, scope: Scope) -> Vec<ScreenshotRecord> {
        let Some(prefix) = date_prefix(date) else {
            debug!(date, "unrecognized date query");
            return Vec::new();
        };
        let index = self.lock();
        let matches = visible_records(&index, scope)
            .into_iter()
            .filter(|r| r.timestamp.starts_with(&prefix))
            .collect();
        sorted_desc(matches)
    }

    /// Substring search over labels in `scope` only. System records are not
    /// included.
    pub fn search_by_label(&self, query: &str, scope: Scope) -> Vec<ScreenshotRecord> {
        let index = self.lock();
        index
            .get(&scope)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| label_contains(&r.label, query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Distinct labels visible from `scope`, sorted ascending.
    pub fn get_all_labels(&self, scope: Scope) -> Vec<String> {
        let index = self.lock();
        let mut labels: Vec<String> = visible_records(&index, scope)
            .into_iter()
            .map(|r| r.label)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        labels.sort();
        labels
    }

    // -- Deletes --

    /// Delete the record whose file is named `filename`, looking in `scope`
    /// first and then in the system scope.
    ///
    /// A record whose file is already gone is dropped and counts as success.
    pub fn delete(&self, filename: &str, scope: Scope) -> bool {
        let filename = strip_category_prefix(filename);
        match self.try_delete(filename, scope) {
            Ok(deleted) => deleted,
            Err(e) => {
                error!(scope = %scope, filename, error = %e, "failed to delete screenshot");
                false
            }
        }
    }

    fn try_delete(&self, filename: &str, scope: Scope) -> Result<bool> {
        let mut index = self.lock();

        let Some((owner, pos)) = find_by_filename(&index, filename, scope) else {
            warn!(scope = %scope, filename, "no record for screenshot");
            return Ok(false);
        };
        let filepath = index[&owner][pos].filepath.clone();

        match fs::remove_file(&filepath) {
            Ok(()) => debug!(path = %filepath, "removed screenshot file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %filepath, "screenshot file already missing, dropping record");
            }
            Err(e) => return Err(e.into()),
        }

        let removed = remove_record(&mut index, owner, pos);
        if let Err(e) = self.persist(&index) {
            index.entry(owner).or_default().insert(pos, removed);
            return Err(e);
        }

        info!(scope = %owner, filename, "deleted screenshot");
        Ok(true)
    }

    /// Delete every record visible from `scope` carrying `label`.
    pub fn delete_by_label(&self, label: &str, scope: Scope) -> BatchDeleteReport {
        let targets: Vec<String> = self
            .get_by_label(label, scope)
            .iter()
            .map(handle_of)
            .collect();
        let report = self.delete_selected(&targets, scope);
        info!(
            scope = %scope,
            label,
            succeeded = report.succeeded,
            failed = report.failed,
            "bulk delete by label finished"
        );
        report
    }

    /// Delete each of `filenames` independently; no rollback on failure.
    pub fn delete_selected<S: AsRef<str>>(
        &self,
        filenames: &[S],
        scope: Scope,
    ) -> BatchDeleteReport {
        let mut report = BatchDeleteReport::default();
        for filename in filenames {
            let filename = filename.as_ref();
            report.record(filename, self.delete(filename, scope));
        }
        report
    }
}

/// Write `data` to a file that must not exist yet. Two saves in the same
/// second into one scope map to the same name; the second one fails.
fn write_new(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    if let Err(e) = file.write_all(data) {
        let _ = fs::remove_file(path);
        return Err(e.into());
    }
    Ok(())
}

fn read_index(path: &Path) -> Result<Option<MetadataIndex>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let index = serde_json::from_slice(&bytes)
        .map_err(|e| CoreError::MalformedStore(e.to_string()))?;
    Ok(Some(index))
}

/// Records of `scope` followed by system records not already present.
fn visible_records(index: &MetadataIndex, scope: Scope) -> Vec<ScreenshotRecord> {
    let own = index.get(&scope).map(Vec::as_slice).unwrap_or_default();
    let mut out: Vec<ScreenshotRecord> = own.to_vec();

    if !scope.is_system() {
        let seen: HashSet<&str> = own.iter().map(|r| r.filepath.as_str()).collect();
        if let Some(system) = index.get(&Scope::SYSTEM) {
            out.extend(
                system
                    .iter()
                    .filter(|r| !seen.contains(r.filepath.as_str()))
                    .cloned(),
            );
        }
    }
    out
}

/// Stable sort, newest first. The timestamp format is fixed width, so string
/// order is chronological order.
fn sorted_desc(mut records: Vec<ScreenshotRecord>) -> Vec<ScreenshotRecord> {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    records
}

fn find_by_filename(index: &MetadataIndex, filename: &str, scope: Scope) -> Option<(Scope, usize)> {
    let mut order = vec![scope];
    if !scope.is_system() {
        order.push(Scope::SYSTEM);
    }

    order.into_iter().find_map(|owner| {
        index
            .get(&owner)?
            .iter()
            .position(|r| r.filename() == Some(filename))
            .map(|pos| (owner, pos))
    })
}

fn remove_record(index: &mut MetadataIndex, owner: Scope, pos: usize) -> ScreenshotRecord {
    let records = index.entry(owner).or_default();
    let removed = records.remove(pos);
    if records.is_empty() {
        index.remove(&owner);
    }
    removed
}

fn handle_of(record: &ScreenshotRecord) -> String {
    record
        .filename()
        .map(str::to_string)
        .unwrap_or_else(|| record.filepath.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn make_store() -> (TempDir, ArchiveStore) {
        let dir = TempDir::new().unwrap();
        let store = ArchiveStore::open(&dir.path().join("screenshots")).unwrap();
        (dir, store)
    }

    fn at(day: u32, secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs as i64)
    }

    fn filename_of(path: &Path) -> String {
        path.file_name().unwrap().to_string_lossy().into_owned()
    }

    const USER: Scope = Scope {
        user_id: 5,
        chat_id: 100,
    };

    #[test]
    fn test_save_then_get_all() {
        let (_dir, store) = make_store();
        let path = store.save_at(b"png-a", "Отчет", USER, at(1, 0)).unwrap();

        assert!(path.exists());
        assert_eq!(fs::read(&path).unwrap(), b"png-a");
        assert!(path.ends_with("user_5/chat_100/screenshot_20240101_120000.png"));

        let all = store.get_all(USER);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].label, "Отчет");
        assert_eq!(all[0].timestamp, "20240101_120000");
        assert_eq!(all[0].user_id, 5);
        assert_eq!(all[0].chat_id, 100);
    }

    #[test]
    fn test_save_then_delete_removes_file_and_record() {
        let (_dir, store) = make_store();
        let path = store.save_at(b"x", "a", USER, at(1, 0)).unwrap();

        assert!(store.delete(&filename_of(&path), USER));
        assert!(!path.exists());
        assert!(store.get_all(USER).is_empty());
    }

    #[test]
    fn test_delete_twice() {
        let (_dir, store) = make_store();
        let path = store.save_at(b"x", "a", USER, at(1, 0)).unwrap();
        let name = filename_of(&path);

        assert!(store.delete(&name, USER));
        assert!(!store.delete(&name, USER));
    }

    #[test]
    fn test_delete_accepts_category_prefix() {
        let (_dir, store) = make_store();
        let path = store.save_at(b"x", "a", USER, at(1, 0)).unwrap();
        let token = format!("category_{}", filename_of(&path));

        assert!(store.delete(&token, USER));
        assert!(store.get_all(USER).is_empty());
    }

    #[test]
    fn test_delete_unknown_filename() {
        let (_dir, store) = make_store();
        store.save_at(b"x", "a", USER, at(1, 0)).unwrap();
        assert!(!store.delete("screenshot_19990101_000000.png", USER));
        assert_eq!(store.get_all(USER).len(), 1);
    }

    #[test]
    fn test_delete_prefers_own_scope() {
        let (_dir, store) = make_store();
        let ts = at(1, 0);
        let own = store.save_at(b"own", "a", USER, ts).unwrap();
        let sys = store.save_at(b"sys", "a", Scope::SYSTEM, ts).unwrap();
        assert_eq!(filename_of(&own), filename_of(&sys));

        assert!(store.delete(&filename_of(&own), USER));
        assert!(!own.exists());
        assert!(sys.exists());
        assert!(store.snapshot().get(&USER).is_none());
        assert_eq!(store.snapshot()[&Scope::SYSTEM].len(), 1);
    }

    #[test]
    fn test_user_can_delete_system_record() {
        let (_dir, store) = make_store();
        let sys = store.save_at(b"sys", "a", Scope::SYSTEM, at(1, 0)).unwrap();

        assert!(store.delete(&filename_of(&sys), USER));
        assert!(store.get_all(Scope::SYSTEM).is_empty());
    }

    #[test]
    fn test_scope_merge_law() {
        let (_dir, store) = make_store();
        store.save_at(b"1", "u1", USER, at(1, 0)).unwrap();
        store.save_at(b"2", "s1", Scope::SYSTEM, at(2, 0)).unwrap();
        store.save_at(b"3", "u2", USER, at(3, 0)).unwrap();
        store.save_at(b"4", "other", Scope::new(6, 100), at(4, 0)).unwrap();

        let all = store.get_all(USER);
        let labels: Vec<_> = all.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["u2", "s1", "u1"]);

        let system = store.get_all(Scope::SYSTEM);
        assert_eq!(system.len(), 1);
        assert_eq!(system[0].label, "s1");
    }

    #[test]
    fn test_merge_does_not_double_count() {
        let (_dir, store) = make_store();
        store.save_at(b"s", "s", Scope::SYSTEM, at(1, 0)).unwrap();
        let record = store.get_all(Scope::SYSTEM).remove(0);

        // Same record reachable through both scopes.
        {
            let mut index = store.lock();
            index.entry(USER).or_default().push(record);
        }

        assert_eq!(store.get_all(USER).len(), 1);
        assert_eq!(store.get_all_labels(USER), vec!["s".to_string()]);
    }

    #[test]
    fn test_get_by_label_normalizes() {
        let (_dir, store) = make_store();
        store.save_at(b"1", "Отчёт", USER, at(1, 0)).unwrap();
        store.save_at(b"2", "другое", USER, at(2, 0)).unwrap();

        assert_eq!(store.get_by_label("отчет", USER).len(), 1);
        assert_eq!(store.get_by_label("  ОТЧЕТ ", USER).len(), 1);
        assert_eq!(store.get_by_label("category_Отчет", USER).len(), 1);
        assert!(store.get_by_label("отч", USER).is_empty());
    }

    #[test]
    fn test_get_by_date() {
        let (_dir, store) = make_store();
        store.save_at(b"1", "a", USER, at(1, 0)).unwrap();
        store.save_at(b"2", "b", USER, at(2, 0)).unwrap();
        store.save_at(b"3", "c", Scope::SYSTEM, at(2, 30)).unwrap();

        let day2 = store.get_by_date("2024-01-02", USER);
        let labels: Vec<_> = day2.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["c", "b"]);

        assert_eq!(store.get_by_date("2024-01", USER).len(), 3);
        assert_eq!(store.get_by_date("2024-01-02", Scope::SYSTEM).len(), 1);
        assert!(store.get_by_date("2024-02-01", USER).is_empty());
        assert!(store.get_by_date("yesterday", USER).is_empty());
    }

    #[test]
    fn test_search_by_label_is_scope_isolated() {
        let (_dir, store) = make_store();
        store.save_at(b"1", "Ежедневный отчет", Scope::SYSTEM, at(1, 0)).unwrap();
        store.save_at(b"2", "Мой отчет", USER, at(2, 0)).unwrap();

        let found = store.search_by_label("ОТЧЕТ", USER);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].label, "Мой отчет");

        assert_eq!(store.get_by_label("Ежедневный отчет", USER).len(), 1);
        assert_eq!(store.search_by_label("ежедневный", Scope::SYSTEM).len(), 1);
    }

    #[test]
    fn test_get_all_labels_sorted_distinct() {
        let (_dir, store) = make_store();
        store.save_at(b"1", "b", USER, at(1, 0)).unwrap();
        store.save_at(b"2", "a", USER, at(2, 0)).unwrap();
        store.save_at(b"3", "b", USER, at(3, 0)).unwrap();
        store.save_at(b"4", "c", Scope::SYSTEM, at(4, 0)).unwrap();

        assert_eq!(store.get_all_labels(USER), vec!["a", "b", "c"]);
        assert_eq!(store.get_all_labels(Scope::SYSTEM), vec!["c"]);
        assert_eq!(store.get_all_labels(Scope::new(9, 9)), vec!["c"]);
    }

    #[test]
    fn test_scenario_user_save_is_private() {
        let (_dir, store) = make_store();
        let label = "Начало месяца 2024-01-01";
        store.save_at(b"imgA", label, USER, at(1, 0)).unwrap();

        assert_eq!(store.get_all(USER).len(), 1);
        assert_eq!(store.get_by_label(label, USER).len(), 1);
        assert!(store.get_all(Scope::new(6, 100)).is_empty());
    }

    #[test]
    fn test_scenario_system_save_is_global() {
        let (_dir, store) = make_store();
        store.save_at(b"u", "user", USER, at(1, 0)).unwrap();
        store
            .save_at(b"s", "Ежедневный отчет 2024-01-01", Scope::SYSTEM, at(1, 10))
            .unwrap();

        let user_view = store.get_all(USER);
        assert!(user_view.iter().any(|r| r.label == "Ежедневный отчет 2024-01-01"));

        let system_view = store.get_all(Scope::SYSTEM);
        assert_eq!(system_view.len(), 1);
        assert!(system_view.iter().all(|r| r.scope().is_system()));
    }

    #[test]
    fn test_scenario_bulk_delete_with_missing_file() {
        let (_dir, store) = make_store();
        let paths: Vec<PathBuf> = (0..7)
            .map(|i| store.save_at(b"x", "Отчет", USER, at(1, i)).unwrap())
            .collect();
        fs::remove_file(&paths[3]).unwrap();

        let report = store.delete_by_label("Отчет", USER);
        assert_eq!(report.succeeded, 7);
        assert_eq!(report.failed, 0);
        assert!(report.failed_filenames.is_empty());
        assert!(store.get_all(USER).is_empty());
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[test]
    fn test_delete_selected_reports_failures() {
        let (_dir, store) = make_store();
        let a = store.save_at(b"a", "x", USER, at(1, 0)).unwrap();
        let b = store.save_at(b"b", "x", USER, at(1, 1)).unwrap();

        let targets = vec![
            filename_of(&a),
            "screenshot_missing.png".to_string(),
            filename_of(&b),
        ];
        let report = store.delete_selected(&targets, USER);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failed_filenames, vec!["screenshot_missing.png"]);
    }

    #[test]
    fn test_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("screenshots");

        let before = {
            let store = ArchiveStore::open(&root).unwrap();
            store.save_at(b"1", "Отчёт", USER, at(1, 0)).unwrap();
            store.save_at(b"2", "sys", Scope::SYSTEM, at(1, 5)).unwrap();
            store.save_at(b"3", "other", Scope::new(7, -100), at(2, 0)).unwrap();
            let doomed = store.save_at(b"4", "gone", USER, at(3, 0)).unwrap();
            assert!(store.delete(&filename_of(&doomed), USER));
            store.snapshot()
        };

        let reopened = ArchiveStore::open(&root).unwrap();
        assert_eq!(reopened.snapshot(), before);
        assert_eq!(reopened.get_all(USER).len(), 2);
    }

    #[test]
    fn test_metadata_layout_on_disk() {
        let (_dir, store) = make_store();
        store.save_at(b"1", "a", USER, at(1, 0)).unwrap();

        let raw = fs::read_to_string(store.metadata_path()).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let entry = &doc["user_5_chat_100"][0];
        assert_eq!(entry["label"], "a");
        assert_eq!(entry["timestamp"], "20240101_120000");
        assert_eq!(entry["user_id"], 5);
        assert_eq!(entry["chat_id"], 100);
        assert!(entry["filepath"]
            .as_str()
            .unwrap()
            .ends_with("screenshot_20240101_120000.png"));
    }

    #[test]
    fn test_malformed_metadata_starts_empty() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("screenshots");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(METADATA_FILE), b"{ not json").unwrap();

        let store = ArchiveStore::open(&root).unwrap();
        assert!(store.snapshot().is_empty());

        // The store stays usable and overwrites the broken document.
        store.save_at(b"1", "a", USER, at(1, 0)).unwrap();
        let reopened = ArchiveStore::open(&root).unwrap();
        assert_eq!(reopened.get_all(USER).len(), 1);
    }

    #[test]
    fn test_bad_scope_key_is_malformed() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("screenshots");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(METADATA_FILE), br#"{"not_a_scope": []}"#).unwrap();

        let store = ArchiveStore::open(&root).unwrap();
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_save_never_overwrites_existing_image() {
        let (_dir, store) = make_store();
        let first = store.save_at(b"first", "a", USER, at(1, 0)).unwrap();

        assert!(store.save_at(b"second", "b", USER, at(1, 0)).is_none());
        assert_eq!(fs::read(&first).unwrap(), b"first");
        let all = store.get_all(USER);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].label, "a");
    }

    #[test]
    fn test_save_rolls_back_when_metadata_write_fails() {
        let (_dir, store) = make_store();
        let tmp = store.metadata_path().with_extension("json.tmp");
        fs::create_dir(&tmp).unwrap();

        assert!(store.save_at(b"x", "a", USER, at(1, 0)).is_none());
        assert!(store.snapshot().is_empty());
        assert!(!store.metadata_path().exists());

        fs::remove_dir(&tmp).unwrap();
        store.save_at(b"y", "b", USER, at(1, 1)).unwrap();
        let reopened = ArchiveStore::open(store.root()).unwrap();
        let all = reopened.get_all(USER);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].label, "b");
    }

    #[test]
    fn test_delete_keeps_record_when_file_removal_fails() {
        let (_dir, store) = make_store();
        let path = store.save_at(b"x", "a", USER, at(1, 0)).unwrap();
        // A non-empty directory in place of the image cannot be unlinked.
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        fs::write(path.join("inner"), b"x").unwrap();

        assert!(!store.delete(&filename_of(&path), USER));
        assert_eq!(store.get_all(USER).len(), 1);
        let reopened = ArchiveStore::open(store.root()).unwrap();
        assert_eq!(reopened.get_all(USER).len(), 1);
    }

    #[test]
    fn test_delete_restores_record_when_metadata_write_fails() {
        let (_dir, store) = make_store();
        store.save_at(b"a", "a", USER, at(1, 0)).unwrap();
        let path = store.save_at(b"b", "b", USER, at(1, 1)).unwrap();
        let before = store.snapshot();

        let tmp = store.metadata_path().with_extension("json.tmp");
        fs::create_dir(&tmp).unwrap();
        assert!(!store.delete(&filename_of(&path), USER));
        assert_eq!(store.snapshot(), before);

        // The file is already gone, so a retry only drops the record.
        fs::remove_dir(&tmp).unwrap();
        assert!(store.delete(&filename_of(&path), USER));
        assert_eq!(store.get_all(USER).len(), 1);
    }

    #[test]
    fn test_save_fails_when_scope_dir_is_a_file() {
        let (_dir, store) = make_store();
        let user_dir = store.root().join("user_5");
        fs::write(&user_dir, b"not a directory").unwrap();

        assert!(store.save_at(b"x", "a", USER, at(1, 0)).is_none());
        assert!(store.get_all(USER).is_empty());
        assert!(!store.metadata_path().exists());
    }
}
