use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::{validate_name, AdapterError, AdapterResult};
use crate::traits::{ByteReader, ByteWriter, StorageAdapter};

/// Storage adapter backed by a single directory on the local file system.
///
/// Every name maps to a file directly inside the directory. The directory is
/// created on [`init`](StorageAdapter::init); until then the adapter behaves
/// as an empty store.
#[derive(Clone, Debug)]
pub struct DirectoryAdapter {
    directory: PathBuf,
}

impl DirectoryAdapter {
    /// Create an adapter over `directory`. Nothing is touched on disk yet.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// The backing directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn resolve(&self, name: &str) -> AdapterResult<PathBuf> {
        validate_name(name)?;
        Ok(self.directory.join(name))
    }
}

/// Map an OS not-found error onto the adapter's own variant.
fn not_found_as(name: &str) -> impl FnOnce(std::io::Error) -> AdapterError + '_ {
    move |err| {
        if err.kind() == ErrorKind::NotFound {
            AdapterError::NotFound(name.to_string())
        } else {
            AdapterError::Io(err)
        }
    }
}

#[async_trait]
impl StorageAdapter for DirectoryAdapter {
    async fn init(&self) -> AdapterResult<()> {
        match fs::create_dir_all(&self.directory).await {
            Ok(()) => Ok(()),
            // Ignore an existing directory.
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_files(&self) -> AdapterResult<Vec<String>> {
        let mut entries = match fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => debug!(name = ?raw, "skipping non UTF-8 file name"),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn create_read_stream(&self, name: &str) -> AdapterResult<ByteReader> {
        let path = self.resolve(name)?;
        let file = fs::File::open(&path).await.map_err(not_found_as(name))?;
        Ok(Box::new(file))
    }

    async fn create_write_stream(&self, name: &str) -> AdapterResult<ByteWriter> {
        let path = self.resolve(name)?;
        let file = fs::File::create(&path).await?;
        Ok(Box::new(file))
    }

    async fn rename(&self, from: &str, to: &str) -> AdapterResult<()> {
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;
        fs::rename(&from_path, &to_path)
            .await
            .map_err(not_found_as(from))
    }

    async fn delete(&self, name: &str) -> AdapterResult<()> {
        let path = self.resolve(name)?;
        fs::remove_file(&path).await.map_err(not_found_as(name))
    }

    async fn read(&self, name: &str) -> AdapterResult<Vec<u8>> {
        let path = self.resolve(name)?;
        fs::read(&path).await.map_err(not_found_as(name))
    }

    async fn write(&self, name: &str, data: &[u8]) -> AdapterResult<()> {
        let path = self.resolve(name)?;
        fs::write(&path, data).await?;
        Ok(())
    }
}
