//! Moving a corrupted store file aside and replacing it with a fresh one.
//!
//! The quarantined file keeps its original name with a
//! `.corrupt.<fingerprint>` suffix, where the fingerprint is derived from the
//! file's contents. Quarantining the same bytes twice yields the same name.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use vault_crypto::fingerprint_file;
use vault_store::Store;

use crate::error::QuarantineError;

/// A fresh store at the original path plus where the corrupted file went.
#[derive(Debug)]
pub struct Quarantined {
    pub store: Store,
    pub quarantine_path: PathBuf,
}

/// The path `path` would be quarantined to: `<name>.corrupt.<fingerprint>`.
pub fn corrupt_db_path(path: &Path) -> io::Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", path.display()),
        )
    })?;
    let fingerprint = fingerprint_file(path)?;
    let mut quarantined = name.to_os_string();
    quarantined.push(".corrupt.");
    quarantined.push(fingerprint);
    Ok(path.with_file_name(quarantined))
}

/// Rename the closed store file at `path` to its quarantine path.
///
/// On failure the original file is left where it was.
pub fn move_corrupt_db(path: &Path) -> Result<PathBuf, QuarantineError> {
    let target = corrupt_db_path(path).map_err(|source| QuarantineError::Fingerprint {
        path: path.to_path_buf(),
        source,
    })?;
    fs::rename(path, &target).map_err(|source| QuarantineError::Rename {
        from: path.to_path_buf(),
        to: target.clone(),
        source,
    })?;
    sync_parent_dir(&target)?;
    debug!(from = %path.display(), to = %target.display(), "store file moved");
    Ok(target)
}

/// Close `store`, move its file aside, and open an empty store in its place
/// with the same options.
pub fn quarantine(store: Store) -> Result<Quarantined, QuarantineError> {
    let path = store.path().to_path_buf();
    let options = store.options().clone();

    store.close().map_err(|source| QuarantineError::Close {
        path: path.clone(),
        source,
    })?;
    let quarantine_path = move_corrupt_db(&path)?;

    let store = Store::open(&path, options).map_err(|source| QuarantineError::Reopen {
        path: path.clone(),
        source,
    })?;
    info!(
        path = %path.display(),
        quarantine_path = %quarantine_path.display(),
        "store quarantined, fresh store opened"
    );
    Ok(Quarantined {
        store,
        quarantine_path,
    })
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<(), QuarantineError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|source| QuarantineError::SyncDir {
            dir: dir.to_path_buf(),
            source,
        })
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<(), QuarantineError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Fixture;
    use proptest::prelude::*;
    use vault_chain::{Blockchain, BLOCKS};
    use vault_crypto::FINGERPRINT_LEN;
    use vault_store::StoreOptions;

    #[test]
    fn corrupt_path_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");
        fs::write(&path, b"abc").unwrap();
        let target = corrupt_db_path(&path).unwrap();
        assert_eq!(target.parent(), path.parent());
        assert_eq!(
            target.file_name().unwrap().to_str().unwrap(),
            "data.db.corrupt.qZk-NkcGgWo"
        );
    }

    #[test]
    fn quarantine_moves_bytes_and_opens_fresh_store() {
        let fx = Fixture::with_chain(6);
        fx.corrupt_signature(2);
        let key = fx.key.verifying_key();
        let (_dir, path, _key, original) = fx.into_parts();

        let store = Store::open(&path, StoreOptions::default()).unwrap();
        let Quarantined {
            store,
            quarantine_path,
        } = quarantine(store).unwrap();

        assert_eq!(fs::read(&quarantine_path).unwrap(), original);
        assert_eq!(store.path(), path.as_path());
        let chain = Blockchain::new(key);
        store
            .view("fresh", |tx| {
                assert!(!tx.bucket_exists(BLOCKS)?);
                assert_eq!(chain.head_seq(tx)?, None);
                Ok::<_, vault_chain::ChainError>(())
            })
            .unwrap();
        let name = quarantine_path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("data.db.corrupt."));
        assert_eq!(name.len(), "data.db.corrupt.".len() + FINGERPRINT_LEN);
    }

    #[test]
    fn different_contents_get_different_names() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a").join("store.db");
        let b = dir.path().join("b").join("store.db");
        for (path, bytes) in [(&a, b"first".as_slice()), (&b, b"second".as_slice())] {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, bytes).unwrap();
        }
        let name_a = corrupt_db_path(&a).unwrap();
        let name_b = corrupt_db_path(&b).unwrap();
        assert_ne!(name_a.file_name(), name_b.file_name());
    }

    #[test]
    fn rename_failure_leaves_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");
        fs::write(&path, b"corrupted store").unwrap();
        let target = corrupt_db_path(&path).unwrap();
        // A non-empty directory in the way makes the rename fail.
        fs::create_dir(&target).unwrap();
        fs::write(target.join("blocker"), b"x").unwrap();

        let err = move_corrupt_db(&path).unwrap_err();
        assert!(matches!(err, QuarantineError::Rename { .. }));
        assert_eq!(fs::read(&path).unwrap(), b"corrupted store");
    }

    #[test]
    fn missing_file_fails_to_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let err = move_corrupt_db(&dir.path().join("absent.db")).unwrap_err();
        assert!(matches!(err, QuarantineError::Fingerprint { .. }));
    }

    proptest! {
        #[test]
        fn name_is_deterministic(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("p.db");
            fs::write(&path, &bytes).unwrap();
            let first = corrupt_db_path(&path).unwrap();
            let second = corrupt_db_path(&path).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
