//! Directory-backed session store.
//!
//! Each peer gets one JSON file named after the SHA-256 of its id,
//! `session_<hex digest>.json`, so any id maps to a short, path-safe name.
//! Writes go to a temporary file first and are renamed into place so a crash
//! never leaves a half-written record behind.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{StoreError, StoreResult};
use crate::store::SessionStore;

const FILE_PREFIX: &str = "session_";
const FILE_SUFFIX: &str = ".json";

/// Session store writing one file per peer under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        log::debug!("file store opened at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, peer_id: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(peer_id.as_bytes()));
        self.dir.join(format!("{FILE_PREFIX}{digest}{FILE_SUFFIX}"))
    }

    fn is_record_name(name: &str) -> bool {
        name.strip_prefix(FILE_PREFIX)
            .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
            .is_some_and(|digest| {
                digest.len() == 64 && digest.bytes().all(|b| b.is_ascii_hexdigit())
            })
    }
}

/// The only field `list_peers` needs from a record.
#[derive(Deserialize)]
struct RecordOwner {
    peer_id: String,
}

impl SessionStore for FileStore {
    fn get_session(&self, peer_id: &str) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(peer_id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn has_session(&self, peer_id: &str) -> StoreResult<bool> {
        Ok(self.path_for(peer_id).is_file())
    }

    fn put_session(&self, peer_id: &str, record: &[u8]) -> StoreResult<()> {
        let path = self.path_for(peer_id);
        let tmp = path.with_extension("json.tmp");

        let mut file = fs::File::create(&tmp)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(record)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &path)?;
        log::debug!("stored session for peer {}", peer_id);
        Ok(())
    }

    fn delete_session(&self, peer_id: &str) -> StoreResult<()> {
        match fs::remove_file(self.path_for(peer_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn list_peers(&self) -> StoreResult<Vec<String>> {
        let mut peers = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !Self::is_record_name(name) {
                log::trace!("ignoring {} in session directory", name);
                continue;
            }
            let bytes = fs::read(entry.path())?;
            match serde_json::from_slice::<RecordOwner>(&bytes) {
                Ok(owner) => peers.push(owner.peer_id),
                Err(e) => log::warn!("unreadable session record {}: {}", name, e),
            }
        }
        peers.sort();
        Ok(peers)
    }
}
