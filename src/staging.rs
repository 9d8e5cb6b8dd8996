use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// An uploaded file on disk, owned by a single request.
///
/// The file is removed when the value is dropped unless [`retain`] was
/// called, so every early return in the handler cleans up after itself.
///
/// [`retain`]: StagedUpload::retain
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
    file_name: String,
    retained: bool,
}

impl StagedUpload {
    /// Reserves a fresh name under `dir`. Nothing is written yet.
    pub fn new(dir: &Path, client_name: Option<&str>) -> Self {
        let file_name = unique_file_name(client_name);
        Self {
            path: dir.join(&file_name),
            file_name,
            retained: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Keeps the file on disk after the request finishes.
    pub fn retain(&mut self) {
        self.retained = true;
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if self.retained {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed staged upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove staged upload")
            }
        }
    }
}

/// `<uuid>-<unix millis>[.ext]`, keeping the client's extension only when it
/// is short and alphanumeric.
fn unique_file_name(client_name: Option<&str>) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let stem = format!("{}-{}", Uuid::new_v4().simple(), millis);

    let ext = client_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    match ext {
        Some(ext) => format!("{}.{}", stem, ext.to_ascii_lowercase()),
        None => stem,
    }
}
