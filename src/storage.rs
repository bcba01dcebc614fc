//! Storage writer
//!
//! Materializes decoded bytes in one of two scopes:
//!
//! - **Transient**: app-private staging used only to hand bytes to another app.
//!   Every request gets its own arena directory under the transient root. Before
//!   a new arena is created, the root is swept one level deep: loose files are
//!   deleted and arenas older than the TTL are removed. With the default TTL of
//!   zero only the newest request's files survive, which doubles as garbage
//!   collection since nothing else reclaims staged files.
//! - **Durable**: the user-visible downloads area. Goes through the host's
//!   mediated store when one is available, otherwise writes the legacy path.
//!
//! Files are never removed right after dispatch: the receiving app reads them
//! asynchronously.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::WriteError;
use crate::types::ResolvedFile;
use crate::utils;

const ARENA_PREFIX: &str = "req-";

/// Entry inserted into the host's mediated public storage
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaEntry {
    pub display_name: String,
    pub mime_type: String,
    /// Target folder relative to the public storage root, e.g. `Download`
    pub relative_path: String,
}

/// Writable handle returned by a mediated insert
pub struct MediaHandle {
    /// Host-side location of the new entry (e.g. a `content://media/...` URI)
    pub location: String,
    pub writer: Box<dyn Write + Send>,
}

/// Host-provided public storage API (MediaStore on Android 10+).
///
/// `Ok(None)` means the host refused the insert.
pub trait MediatedStore: Send + Sync {
    fn insert(&self, entry: &MediaEntry) -> std::io::Result<Option<MediaHandle>>;
}

/// A per-request directory in the transient scope
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransientArena {
    dir: PathBuf,
}

impl TransientArena {
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Write one file into this arena
    pub fn write(&self, file_name: &str, mime_type: &str, bytes: &[u8]) -> Result<ResolvedFile, WriteError> {
        ensure_single_segment(file_name)?;
        let path = self.dir.join(file_name);
        write_file(&path, bytes)?;
        tracing::info!("[Storage] Staged {} bytes at {:?}", bytes.len(), path);
        Ok(ResolvedFile {
            absolute_path: path,
            mime_type: mime_type.to_string(),
            size_bytes: bytes.len() as u64,
            arena: Some(self.dir.clone()),
        })
    }
}

/// Writes bytes into the transient or durable scope
#[derive(Clone)]
pub struct StorageWriter {
    transient_root: Option<PathBuf>,
    transient_ttl: Duration,
    durable_root: Option<PathBuf>,
    relative_folder: String,
    mediated: Option<Arc<dyn MediatedStore>>,
}

impl StorageWriter {
    pub fn new(transient_root: Option<PathBuf>, durable_root: Option<PathBuf>) -> Self {
        Self {
            transient_root,
            transient_ttl: Duration::ZERO,
            durable_root,
            relative_folder: "Download".to_string(),
            mediated: None,
        }
    }

    pub fn with_transient_ttl(mut self, ttl: Duration) -> Self {
        self.transient_ttl = ttl;
        self
    }

    pub fn with_relative_folder(mut self, folder: impl Into<String>) -> Self {
        self.relative_folder = folder.into();
        self
    }

    pub fn with_mediated_store(mut self, store: Arc<dyn MediatedStore>) -> Self {
        self.mediated = Some(store);
        self
    }

    pub fn transient_root(&self) -> Option<&Path> {
        self.transient_root.as_deref()
    }

    fn require_transient_root(&self) -> Result<&Path, WriteError> {
        self.transient_root
            .as_deref()
            .ok_or_else(|| WriteError::ScopeUnavailable("no transient directory configured".to_string()))
    }

    /// Sweep the transient root, then create a fresh arena for this request
    pub fn begin_transient(&self) -> Result<TransientArena, WriteError> {
        let root = self.require_transient_root()?;
        create_dir(root)?;
        self.sweep(root);

        let dir = root.join(format!(
            "{}{}-{:08x}",
            ARENA_PREFIX,
            utils::now_millis(),
            rand::random::<u32>()
        ));
        create_dir(&dir)?;
        tracing::debug!("[Storage] Created arena {:?}", dir);
        Ok(TransientArena { dir })
    }

    /// Stage a single file for sharing
    pub fn write_transient(&self, file_name: &str, mime_type: &str, bytes: &[u8]) -> Result<ResolvedFile, WriteError> {
        self.begin_transient()?.write(file_name, mime_type, bytes)
    }

    /// Remove an arena as soon as the receiver is known to have read it.
    /// Paths outside the transient root are ignored.
    pub fn release(&self, arena: &Path) -> Result<(), WriteError> {
        let root = utils::resolve_path(self.require_transient_root()?);
        let parent = arena.parent().map(utils::resolve_path);
        if parent.as_deref() != Some(root.as_path()) || !is_arena_name(arena) {
            tracing::warn!("[Storage] Refusing to release non-arena path {:?}", arena);
            return Ok(());
        }
        if arena.exists() {
            fs::remove_dir_all(arena).map_err(|e| WriteError::Io {
                path: arena.to_path_buf(),
                source: e,
            })?;
            tracing::info!("[Storage] Released arena {:?}", arena);
        }
        Ok(())
    }

    /// One-level cleanup of the transient root. Failures are logged, not fatal:
    /// the next sweep gets another chance.
    fn sweep(&self, root: &Path) {
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("[Storage] Cannot list {:?} for cleanup: {}", root, e);
                return;
            }
        };

        let now = utils::now_millis();
        // Saturate: a TTL beyond i64 millis means "never expire"
        let ttl_ms = i64::try_from(self.transient_ttl.as_millis()).unwrap_or(i64::MAX);
        let mut removed = 0usize;

        for entry in entries.flatten() {
            let path = entry.path();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            let result = if !is_dir {
                fs::remove_file(&path)
            } else if let Some(created) = arena_created_millis(&path) {
                if now.saturating_sub(created) >= ttl_ms {
                    fs::remove_dir_all(&path)
                } else {
                    continue;
                }
            } else {
                // Unknown directory: only reclaim it when empty
                fs::remove_dir(&path)
            };

            match result {
                Ok(()) => removed += 1,
                Err(e) => tracing::debug!("[Storage] Could not remove {:?}: {}", path, e),
            }
        }

        if removed > 0 {
            tracing::info!("[Storage] Swept {} stale entries from {:?}", removed, root);
        }
    }

    /// Save into the durable/public scope
    pub fn write_durable(&self, file_name: &str, mime_type: &str, bytes: &[u8]) -> Result<ResolvedFile, WriteError> {
        ensure_single_segment(file_name)?;

        if let Some(store) = &self.mediated {
            let entry = MediaEntry {
                display_name: file_name.to_string(),
                mime_type: mime_type.to_string(),
                relative_path: self.relative_folder.clone(),
            };
            let mut handle = store
                .insert(&entry)
                .map_err(|e| WriteError::Mediated {
                    name: file_name.to_string(),
                    source: e,
                })?
                .ok_or_else(|| WriteError::InsertDenied(file_name.to_string()))?;

            handle
                .writer
                .write_all(bytes)
                .and_then(|_| handle.writer.flush())
                .map_err(|e| WriteError::Mediated {
                    name: file_name.to_string(),
                    source: e,
                })?;

            tracing::info!("[Storage] Saved {} bytes to {} via mediated store", bytes.len(), handle.location);
            return Ok(ResolvedFile {
                absolute_path: PathBuf::from(handle.location),
                mime_type: mime_type.to_string(),
                size_bytes: bytes.len() as u64,
                arena: None,
            });
        }

        let root = self
            .durable_root
            .as_deref()
            .ok_or_else(|| WriteError::ScopeUnavailable("no downloads directory available".to_string()))?;
        create_dir(root)?;

        let path = root.join(file_name);
        write_file(&path, bytes)?;
        tracing::info!("[Storage] Saved {} bytes to {:?}", bytes.len(), path);
        Ok(ResolvedFile {
            absolute_path: path,
            mime_type: mime_type.to_string(),
            size_bytes: bytes.len() as u64,
            arena: None,
        })
    }
}

fn create_dir(path: &Path) -> Result<(), WriteError> {
    fs::create_dir_all(path).map_err(|e| WriteError::CreateDir {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    let io_err = |e| WriteError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    let mut file = fs::File::create(path).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.flush().map_err(io_err)
}

/// The writer only ever joins a bare file name onto a scope directory
fn ensure_single_segment(file_name: &str) -> Result<(), WriteError> {
    let path = Path::new(file_name);
    let single = path.file_name().map(|n| n == path.as_os_str()).unwrap_or(false);
    if !single || file_name.contains('/') || file_name.contains('\\') {
        return Err(WriteError::InvalidName(file_name.to_string()));
    }
    Ok(())
}

fn is_arena_name(path: &Path) -> bool {
    arena_created_millis(path).is_some()
}

/// `req-<millis>-<rand>` -> millis
fn arena_created_millis(path: &Path) -> Option<i64> {
    let name = path.file_name()?.to_str()?;
    let rest = name.strip_prefix(ARENA_PREFIX)?;
    let (millis, _) = rest.split_once('-')?;
    millis.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn list_files(root: &Path) -> Vec<String> {
        let mut names = Vec::new();
        for entry in fs::read_dir(root).unwrap().flatten() {
            if entry.path().is_dir() {
                for inner in fs::read_dir(entry.path()).unwrap().flatten() {
                    names.push(inner.file_name().to_string_lossy().to_string());
                }
            } else {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        names
    }

    fn create_test_writer() -> (StorageWriter, TempDir) {
        let temp = TempDir::new().unwrap();
        let writer = StorageWriter::new(
            Some(temp.path().join("temp_share")),
            Some(temp.path().join("Download")),
        );
        (writer, temp)
    }

    #[test]
    fn test_second_transient_write_replaces_first() {
        let (writer, temp) = create_test_writer();
        let root = temp.path().join("temp_share");

        writer.write_transient("first.pdf", "application/pdf", b"one").unwrap();
        let second = writer.write_transient("second.pdf", "application/pdf", b"two").unwrap();

        assert_eq!(list_files(&root), vec!["second.pdf"]);
        assert_eq!(fs::read(&second.absolute_path).unwrap(), b"two");
        assert_eq!(second.size_bytes, 3);
        assert!(second.absolute_path.starts_with(&root));
    }

    #[test]
    fn test_sweep_removes_loose_files() {
        let (writer, temp) = create_test_writer();
        let root = temp.path().join("temp_share");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("legacy.jpg"), b"old").unwrap();

        writer.write_transient("new.jpg", "image/jpeg", b"new").unwrap();
        assert_eq!(list_files(&root), vec!["new.jpg"]);
    }

    #[test]
    fn test_ttl_keeps_recent_arenas() {
        let (writer, temp) = create_test_writer();
        let writer = writer.with_transient_ttl(Duration::from_secs(3600));
        let root = temp.path().join("temp_share");

        writer.write_transient("a.txt", "text/plain", b"a").unwrap();
        writer.write_transient("b.txt", "text/plain", b"b").unwrap();
        assert_eq!(list_files(&root), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_unbounded_ttl_never_sweeps_arenas() {
        let (writer, temp) = create_test_writer();
        let writer = writer.with_transient_ttl(Duration::from_secs(u64::MAX));
        let root = temp.path().join("temp_share");

        let first = writer.write_transient("a.txt", "text/plain", b"a").unwrap();
        writer.write_transient("b.txt", "text/plain", b"b").unwrap();
        assert!(first.absolute_path.exists());
        assert_eq!(list_files(&root), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_release_removes_arena() {
        let (writer, temp) = create_test_writer();
        let writer = writer.with_transient_ttl(Duration::from_secs(3600));
        let file = writer.write_transient("a.txt", "text/plain", b"a").unwrap();
        let arena = file.arena.clone().unwrap();

        writer.release(&arena).unwrap();
        assert!(!arena.exists());

        // Paths that are not arenas under the root are left alone
        writer.release(temp.path()).unwrap();
        assert!(temp.path().exists());
    }

    #[test]
    fn test_rejects_multi_segment_names() {
        let (writer, _temp) = create_test_writer();
        assert!(matches!(
            writer.write_transient("../escape.txt", "text/plain", b"x"),
            Err(WriteError::InvalidName(_))
        ));
        assert!(matches!(
            writer.write_durable("a/b.txt", "text/plain", b"x"),
            Err(WriteError::InvalidName(_))
        ));
    }

    #[test]
    fn test_durable_legacy_path_creates_dirs() {
        let (writer, temp) = create_test_writer();
        let file = writer.write_durable("invoice.pdf", "application/pdf", b"%PDF").unwrap();
        assert_eq!(file.absolute_path, temp.path().join("Download").join("invoice.pdf"));
        assert_eq!(fs::read(&file.absolute_path).unwrap(), b"%PDF");
        assert!(file.arena.is_none());
    }

    #[test]
    fn test_missing_scope_is_write_error() {
        let writer = StorageWriter::new(None, None);
        assert!(matches!(
            writer.write_transient("a.txt", "text/plain", b"a"),
            Err(WriteError::ScopeUnavailable(_))
        ));
        assert!(matches!(
            writer.write_durable("a.txt", "text/plain", b"a"),
            Err(WriteError::ScopeUnavailable(_))
        ));
    }

    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct FakeStore {
        accept: bool,
        inserted: Mutex<Vec<MediaEntry>>,
        data: Arc<Mutex<Vec<u8>>>,
    }

    impl MediatedStore for FakeStore {
        fn insert(&self, entry: &MediaEntry) -> std::io::Result<Option<MediaHandle>> {
            self.inserted.lock().unwrap().push(entry.clone());
            if !self.accept {
                return Ok(None);
            }
            Ok(Some(MediaHandle {
                location: format!("content://media/downloads/{}", entry.display_name),
                writer: Box::new(SharedBuf(self.data.clone())),
            }))
        }
    }

    #[test]
    fn test_durable_goes_through_mediated_store() {
        let store = Arc::new(FakeStore {
            accept: true,
            inserted: Mutex::new(Vec::new()),
            data: Arc::new(Mutex::new(Vec::new())),
        });
        let (writer, temp) = create_test_writer();
        let writer = writer.with_mediated_store(store.clone());

        let file = writer.write_durable("ledger.pdf", "application/pdf", b"%PDF").unwrap();
        assert_eq!(file.absolute_path, PathBuf::from("content://media/downloads/ledger.pdf"));
        assert_eq!(*store.data.lock().unwrap(), b"%PDF");
        assert_eq!(
            store.inserted.lock().unwrap()[0],
            MediaEntry {
                display_name: "ledger.pdf".into(),
                mime_type: "application/pdf".into(),
                relative_path: "Download".into(),
            }
        );
        // Nothing written to the legacy path
        assert!(!temp.path().join("Download").exists());
    }

    #[test]
    fn test_denied_insert_is_write_error() {
        let store = Arc::new(FakeStore {
            accept: false,
            inserted: Mutex::new(Vec::new()),
            data: Arc::new(Mutex::new(Vec::new())),
        });
        let (writer, _temp) = create_test_writer();
        let writer = writer.with_mediated_store(store);
        assert!(matches!(
            writer.write_durable("x.pdf", "application/pdf", b"x"),
            Err(WriteError::InsertDenied(_))
        ));
    }
}
