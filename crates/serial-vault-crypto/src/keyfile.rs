//! Owner-only files for sealed key material.

use std::path::Path;

use crate::error::CryptoError;

/// Write `data` to `path`, creating parent directories and restricting
/// permissions to the owner on Unix.
pub fn write_private_file(path: &Path, data: &[u8]) -> Result<(), CryptoError> {
    let dir = path.parent().ok_or_else(|| {
        CryptoError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        ))
    })?;
    std::fs::create_dir_all(dir)?;
    std::fs::write(path, data)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

/// Read a file written by [`write_private_file`].
///
/// On Unix, refuses files readable by anyone but the owner.
pub fn read_private_file(path: &Path) -> Result<Vec<u8>, CryptoError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(path)?.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            return Err(CryptoError::IoError(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("key file has insecure permissions: {mode:o} (expected 600)"),
            )));
        }
    }
    Ok(std::fs::read(path)?)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brand").join("key.sealed");
        write_private_file(&path, b"sealed").unwrap();
        assert_eq!(read_private_file(&path).unwrap(), b"sealed");
    }

    #[cfg(unix)]
    #[test]
    fn world_readable_file_is_refused() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.sealed");
        std::fs::write(&path, b"sealed").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        let err = read_private_file(&path).unwrap_err();
        assert!(err.to_string().contains("insecure permissions"));
    }
}
