//! Upload pipeline: push one file to the library and describe the result.

use thiserror::Error;
use tracing::{debug, info};

use crate::fs::{FileSystem, FsError};
use crate::inventory::is_syncable_path;
use crate::mapping::{FileMapping, FileStatSnapshot};
use crate::remote::{RemoteError, RemoteLibrary};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No such file: {0}")]
    NotFound(String),

    #[error("Not a syncable file: {0}")]
    NotSyncable(String),

    #[error("Upload of {path} failed: {source}")]
    Remote {
        path: String,
        #[source]
        source: RemoteError,
    },

    #[error("Failed to read {path}: {source}")]
    Fs {
        path: String,
        #[source]
        source: FsError,
    },
}

pub type Result<T> = std::result::Result<T, UploadError>;

/// Upload `path` and return its new mapping.
///
/// The title sent to the library is the vault-relative path, which is what
/// later joins against the remote inventory. The returned mapping carries
/// the stat observed just before reading, making it the new upload snapshot.
/// Nothing is persisted here.
pub async fn upload_file<F, R>(
    fs: &F,
    remote: &R,
    library_id: u64,
    path: &str,
) -> Result<FileMapping>
where
    F: FileSystem + ?Sized,
    R: RemoteLibrary + ?Sized,
{
    let path = path.trim_matches('/');

    let stat = match fs.stat(path).await {
        Ok(stat) => stat,
        Err(FsError::NotFound(_)) => return Err(UploadError::NotFound(path.to_string())),
        Err(source) => {
            return Err(UploadError::Fs {
                path: path.to_string(),
                source,
            });
        }
    };
    if stat.is_dir || !is_syncable_path(path) {
        return Err(UploadError::NotSyncable(path.to_string()));
    }

    let bytes = fs.read(path).await.map_err(|source| match source {
        FsError::NotFound(_) => UploadError::NotFound(path.to_string()),
        source => UploadError::Fs {
            path: path.to_string(),
            source,
        },
    })?;
    let content = String::from_utf8_lossy(&bytes);

    debug!("Uploading {} ({} bytes)", path, bytes.len());
    let doc_id = remote
        .create_document(library_id, &content, path)
        .await
        .map_err(|source| UploadError::Remote {
            path: path.to_string(),
            source,
        })?;
    info!("Uploaded {} -> {}", path, doc_id);

    Ok(FileMapping::new(path, FileStatSnapshot::from(&stat)).with_doc_id(doc_id))
}
