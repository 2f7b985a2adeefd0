// src/remote/staging.rs
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::errors::RdecError;

/// Raw-mode payload staged to disk before submission.
///
/// The file lives exactly as long as this guard: dropping it removes the
/// file, so success, failure, and cancellation all clean up the same way.
#[derive(Debug)]
pub struct StagedPayload {
    file: NamedTempFile,
    len: usize,
}

impl StagedPayload {
    pub fn write(bytes: &[u8]) -> Result<Self, RdecError> {
        let mut file = NamedTempFile::new()?;
        file.write_all(bytes)?;
        file.flush()?;
        debug!(
            "{} payload bytes staged in {}",
            bytes.len(),
            file.path().display()
        );
        Ok(Self {
            file,
            len: bytes.len(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read the staged bytes back for the multipart body.
    pub fn read(&self) -> Result<Vec<u8>, RdecError> {
        Ok(std::fs::read(self.file.path())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_payload_bytes() {
        let staged = StagedPayload::write(&[0xde, 0xad, 0xbe, 0xef]).unwrap();
        assert_eq!(staged.len(), 4);
        assert_eq!(staged.read().unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn file_is_removed_on_drop() {
        let path = {
            let staged = StagedPayload::write(b"payload").unwrap();
            let p = staged.path().to_path_buf();
            assert!(p.exists());
            p
        };
        assert!(!path.exists());
    }

    #[test]
    fn file_is_removed_when_a_scope_exits_early() {
        let mut path = std::path::PathBuf::new();
        let result: Result<(), RdecError> = (|| {
            let staged = StagedPayload::write(b"x")?;
            path = staged.path().to_path_buf();
            assert!(path.exists());
            Err(RdecError::Configuration("forced exit".to_string()))
        })();
        assert!(result.is_err());
        assert!(!path.exists());
    }
}
