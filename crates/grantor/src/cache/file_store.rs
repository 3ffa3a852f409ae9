use std::{
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use url::form_urlencoded::byte_serialize;

use crate::token::AccessToken;

/// One JSON file per client id inside `dir`.
///
/// A scoped store, used for caches bound to one token endpoint, names its files
/// after the scope and the client id, so several endpoints can share `dir`.
///
/// Every failure is reported to the caller as `Err` or `None` and logged; none of
/// them are fatal for token acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FileStore {
    dir: PathBuf,
    scope: Option<String>,
}

impl FileStore {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            scope: None,
        }
    }

    pub(crate) fn scoped(self, scope: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            ..self
        }
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the token of `client_id`. The name is percent-encoded so
    /// that it can never escape `dir`.
    pub(crate) fn path_for(&self, client_id: &str) -> PathBuf {
        let key = match &self.scope {
            Some(scope) => format!("{scope}\n{client_id}"),
            None => client_id.to_string(),
        };
        let name: String = byte_serialize(key.as_bytes()).collect();
        self.dir.join(format!("{name}.json"))
    }

    pub(crate) fn read(&self, client_id: &str) -> Option<AccessToken> {
        let path = self.path_for(client_id);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::trace!("No persisted token at `{}`", path.display());
                return None;
            }
            Err(e) => {
                tracing::warn!("Failed to read persisted token `{}`: {e}", path.display());
                return None;
            }
        };

        serde_json::from_slice(&bytes)
            .inspect_err(|e| {
                tracing::warn!(
                    "Ignoring corrupt persisted token `{}`: {e}",
                    path.display()
                );
            })
            .ok()
    }

    /// Write `token` to a temporary file next to its destination, then rename it
    /// into place. Readers see either the previous file or the complete new one.
    pub(crate) fn write(&self, client_id: &str, token: &AccessToken) -> std::io::Result<()> {
        let path = self.path_for(client_id);
        std::fs::create_dir_all(&self.dir)?;

        let mut file = tempfile::NamedTempFile::new_in(&self.dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        serde_json::to_writer(&mut file, token)?;
        file.flush()?;
        file.as_file().sync_all()?;
        file.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    pub(crate) fn remove(&self, client_id: &str) -> std::io::Result<()> {
        match std::fs::remove_file(self.path_for(client_id)) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
