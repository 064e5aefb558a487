//! Verification evidence: upload checks, storage paths and file stores.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accounts::UserId;

/// Largest accepted evidence upload, in bytes.
pub const MAX_UPLOAD_SIZE: u64 = 2_621_440;

const MSWORD: &str = "application/msword";
const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

pub const DOCUMENT_TYPES: &[&str] = &["application/pdf", MSWORD, DOCX];
pub const DOCUMENT_AND_IMAGE_TYPES: &[&str] =
    &["application/pdf", MSWORD, DOCX, "image/jpeg", "image/png"];

pub const UNSUPPORTED_TYPE: &str = "This file type is not supported.";

/// An upload field and the content types it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvidenceField {
    pub name: &'static str,
    pub allowed_types: &'static [&'static str],
}

pub const VERIFICATION_FILE: EvidenceField = EvidenceField {
    name: "ver_file",
    allowed_types: DOCUMENT_AND_IMAGE_TYPES,
};

pub const CPA_FILE: EvidenceField = EvidenceField {
    name: "cpa_file",
    allowed_types: DOCUMENT_TYPES,
};

/// File part received with a form submission.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: Option<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            data: data.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Declared content type without parameters, guessed from the name when absent.
    pub fn effective_content_type(&self) -> Option<String> {
        let declared = self
            .content_type
            .as_deref()
            .filter(|value| !value.trim().is_empty() && *value != "application/octet-stream")
            .and_then(|value| value.parse::<mime::Mime>().ok())
            .map(|mime| mime.essence_str().to_ascii_lowercase());

        declared.or_else(|| {
            mime_guess::from_path(&self.file_name)
                .first()
                .map(|mime| mime.essence_str().to_ascii_lowercase())
        })
    }
}

/// Size and type rules applied to every upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvidencePolicy {
    max_upload_size: u64,
}

impl EvidencePolicy {
    pub fn new(max_upload_size: u64) -> Self {
        Self { max_upload_size }
    }

    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size
    }

    /// Check an upload, type first, returning the message shown on the form.
    pub fn check(&self, field: &EvidenceField, file: &UploadedFile) -> Result<(), String> {
        let content_type = file.effective_content_type();
        let supported = content_type
            .as_deref()
            .map_or(false, |value| field.allowed_types.contains(&value));
        if !supported {
            return Err(UNSUPPORTED_TYPE.to_string());
        }

        if file.size() > self.max_upload_size {
            return Err(format!(
                "Please keep file size under {}. Current file size is {}",
                filesizeformat(self.max_upload_size),
                filesizeformat(file.size())
            ));
        }

        Ok(())
    }
}

impl Default for EvidencePolicy {
    fn default() -> Self {
        Self::new(MAX_UPLOAD_SIZE)
    }
}

/// Human readable size, e.g. `2.5 MB`.
pub fn filesizeformat(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let value = bytes as f64;
    if bytes == 1 {
        "1 byte".to_string()
    } else if value < KB {
        format!("{bytes} bytes")
    } else if value < MB {
        format!("{:.1} KB", value / KB)
    } else if value < GB {
        format!("{:.1} MB", value / MB)
    } else {
        format!("{:.1} GB", value / GB)
    }
}

/// Reference to evidence held by an [`EvidenceStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub path: String,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
}

/// Storage key for an upload: `uploads/{user}/{Entity Name}/{file}`.
pub fn upload_path(owner: &UserId, entity_name: &str, file_name: &str) -> String {
    format!(
        "uploads/{owner}/{entity_name}/{}",
        sanitize_file_name(file_name)
    )
}

fn sanitize_file_name(raw: &str) -> String {
    let last = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match last {
        "" | "." | ".." => "upload".to_string(),
        name => name.to_string(),
    }
}

fn with_random_suffix(path: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let suffix = &suffix[..7];
    let (dir, name) = match path.rfind('/') {
        Some(index) => path.split_at(index + 1),
        None => ("", path),
    };
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{dir}{}_{suffix}{}", &name[..dot], &name[dot..]),
        _ => format!("{dir}{name}_{suffix}"),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EvidenceStoreError {
    #[error("evidence storage failed: {0}")]
    Io(#[from] io::Error),
    #[error("evidence store unavailable: {0}")]
    Unavailable(String),
}

/// Backend that keeps uploaded evidence. Existing files are never overwritten.
pub trait EvidenceStore: Send + Sync {
    fn exists(&self, path: &str) -> Result<bool, EvidenceStoreError>;
    fn write(&self, path: &str, data: &[u8]) -> Result<(), EvidenceStoreError>;
    fn remove(&self, path: &str) -> Result<(), EvidenceStoreError>;

    /// Write under `path`, or a suffixed sibling if taken, returning the final path.
    fn save(&self, path: &str, data: &[u8]) -> Result<String, EvidenceStoreError> {
        let mut candidate = path.to_string();
        while self.exists(&candidate)? {
            candidate = with_random_suffix(path);
        }
        self.write(&candidate, data)?;
        Ok(candidate)
    }
}

/// Stores evidence beneath a media root on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalEvidenceStore {
    root: PathBuf,
}

impl LocalEvidenceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl EvidenceStore for LocalEvidenceStore {
    fn exists(&self, path: &str) -> Result<bool, EvidenceStoreError> {
        Ok(self.resolve(path).exists())
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), EvidenceStoreError> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, data)?;
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), EvidenceStoreError> {
        match fs::remove_file(self.resolve(path)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Keeps evidence in memory; used by tests and ephemeral deployments.
#[derive(Debug, Default, Clone)]
pub struct InMemoryEvidenceStore {
    files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryEvidenceStore {
    pub fn paths(&self) -> Vec<String> {
        self.files
            .lock()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .ok()
            .and_then(|files| files.get(path).cloned())
    }
}

impl EvidenceStore for InMemoryEvidenceStore {
    fn exists(&self, path: &str) -> Result<bool, EvidenceStoreError> {
        let files = self
            .files
            .lock()
            .map_err(|_| EvidenceStoreError::Unavailable("evidence map poisoned".to_string()))?;
        Ok(files.contains_key(path))
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), EvidenceStoreError> {
        let mut files = self
            .files
            .lock()
            .map_err(|_| EvidenceStoreError::Unavailable("evidence map poisoned".to_string()))?;
        files.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), EvidenceStoreError> {
        let mut files = self
            .files
            .lock()
            .map_err(|_| EvidenceStoreError::Unavailable("evidence map poisoned".to_string()))?;
        files.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(size: usize) -> UploadedFile {
        UploadedFile::new(
            "letter.pdf",
            Some("application/pdf".to_string()),
            vec![0u8; size],
        )
    }

    #[test]
    fn formats_sizes_like_the_upload_form() {
        assert_eq!(filesizeformat(1), "1 byte");
        assert_eq!(filesizeformat(512), "512 bytes");
        assert_eq!(filesizeformat(2048), "2.0 KB");
        assert_eq!(filesizeformat(MAX_UPLOAD_SIZE), "2.5 MB");
    }

    #[test]
    fn rejects_oversized_files_with_both_sizes() {
        let policy = EvidencePolicy::default();
        assert!(policy.check(&VERIFICATION_FILE, &pdf(1024)).is_ok());

        let message = policy
            .check(&VERIFICATION_FILE, &pdf(3 * 1024 * 1024))
            .expect_err("file is too large");
        assert_eq!(
            message,
            "Please keep file size under 2.5 MB. Current file size is 3.0 MB"
        );
    }

    #[test]
    fn rejects_types_outside_the_allow_list() {
        let policy = EvidencePolicy::default();
        let script = UploadedFile::new(
            "run.sh",
            Some("text/x-shellscript".to_string()),
            b"echo".to_vec(),
        );
        assert_eq!(
            policy.check(&VERIFICATION_FILE, &script),
            Err(UNSUPPORTED_TYPE.to_string())
        );

        let photo = UploadedFile::new("scan.png", Some("image/png".to_string()), vec![1u8; 10]);
        assert!(policy.check(&VERIFICATION_FILE, &photo).is_ok());
        assert_eq!(
            policy.check(&CPA_FILE, &photo),
            Err(UNSUPPORTED_TYPE.to_string())
        );
    }

    #[test]
    fn guesses_type_from_file_name_when_undeclared() {
        let file = UploadedFile::new("minutes.docx", None, vec![1u8; 4]);
        assert_eq!(file.effective_content_type().as_deref(), Some(DOCX));
        assert!(EvidencePolicy::default().check(&CPA_FILE, &file).is_ok());
    }

    #[test]
    fn upload_path_keeps_only_the_final_component() {
        let owner = UserId(Uuid::nil());
        assert_eq!(
            upload_path(&owner, "Grant Review", "../../etc/passwd"),
            "uploads/00000000-0000-0000-0000-000000000000/Grant Review/passwd"
        );
        assert!(upload_path(&owner, "Award", "..").ends_with("/Award/upload"));
    }

    #[test]
    fn memory_store_never_overwrites() {
        let store = InMemoryEvidenceStore::default();
        let first = store.save("uploads/a/Award/x.pdf", b"one").expect("saved");
        let second = store.save("uploads/a/Award/x.pdf", b"two").expect("saved");
        assert_eq!(first, "uploads/a/Award/x.pdf");
        assert_ne!(first, second);
        assert!(second.starts_with("uploads/a/Award/x_") && second.ends_with(".pdf"));
        assert_eq!(store.get(&first), Some(b"one".to_vec()));
        assert_eq!(store.paths().len(), 2);
    }

    #[test]
    fn local_store_writes_beneath_root() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = LocalEvidenceStore::new(dir.path());
        let path = store
            .save("uploads/u/Lecture/slides.pdf", b"%PDF")
            .expect("saved");
        let on_disk = dir.path().join(&path);
        assert_eq!(fs::read(&on_disk).expect("file written"), b"%PDF");
        store.remove(&path).expect("removed");
        store.remove(&path).expect("missing files are ignored");
        assert!(!on_disk.exists());
    }
}
