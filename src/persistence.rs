use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::item::ContentItem;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("storage i/o failed for {key:?}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("stored value is malformed: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("failed to encode stories: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),
}

/// Whole-value string storage. Each write replaces the previous value for the key.
pub trait KeyValue {
    /// `Ok(None)` if the key was never written or was cleared outside this process.
    fn read(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn write(&mut self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

impl<T: KeyValue + ?Sized> KeyValue for Box<T> {
    fn read(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        (**self).read(key)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        (**self).write(key, value)
    }
}

#[derive(Debug, Default)]
pub struct MemoryKv {
    data: HashMap<String, String>,
}

impl KeyValue for MemoryKv {
    fn read(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.data.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.data.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key inside `dir`.
#[derive(Debug)]
pub struct FileKv {
    dir: PathBuf,
}

impl FileKv {
    pub fn open<P>(dir: P) -> Result<Self, PersistenceError>
    where
        P: Into<PathBuf>,
    {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| PersistenceError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(FileKv { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
        if !valid {
            return Err(PersistenceError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValue for FileKv {
    fn read(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistenceError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        let io_err = |source: std::io::Error| PersistenceError::Io {
            key: key.to_string(),
            source,
        };
        std::fs::write(&tmp, value).map_err(io_err)?;
        std::fs::rename(&tmp, &path).map_err(io_err)
    }
}

pub fn encode_items(items: &[ContentItem]) -> Result<String, PersistenceError> {
    serde_json::to_string(items).map_err(PersistenceError::Encode)
}

pub fn decode_items(data: &str) -> Result<Vec<ContentItem>, PersistenceError> {
    serde_json::from_str(data).map_err(PersistenceError::Malformed)
}
