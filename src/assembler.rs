//! # Transfer Assemblers
//!
//! One assembler exists per incoming logical object: it accumulates
//! ordered parcels and reconstructs either an in-memory byte buffer
//! (user objects / data blocks) or a growing temp file (file transfers),
//! finalising on the last parcel (design document §2/§4.4).

use std::path::PathBuf;

use tokio::fs::File as AsyncFile;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::JennyError;
use crate::io_manager;

/// Accumulates an in-memory object (user object or raw byte block).
pub struct DataAssembler {
    pub object_id: u64,
    pub method_id: u32,
    pub total_length: u64,
    pub parcel_count: u32,
    pub expected_crc: u32,
    pub remote_path: Option<String>,
    next_seq: u32,
    buffer: Vec<u8>,
    hasher: crc32fast::Hasher,
}

impl DataAssembler {
    pub fn new(
        object_id: u64,
        method_id: u32,
        total_length: u64,
        parcel_count: u32,
        expected_crc: u32,
    ) -> Self {
        DataAssembler {
            object_id,
            method_id,
            total_length,
            parcel_count,
            expected_crc,
            remote_path: None,
            next_seq: 0,
            buffer: Vec::with_capacity(total_length.min(1 << 20) as usize),
            hasher: crc32fast::Hasher::new(),
        }
    }

    /// Feed the next parcel's payload. Returns `true` once the object is
    /// complete. A sequence that does not match the expected next value
    /// is a protocol error (design document §4.4).
    pub fn push(&mut self, sequence: u32, payload: &[u8]) -> Result<bool, JennyError> {
        if sequence != self.next_seq {
            return Err(JennyError::FramingError(format!(
                "object {} expected sequence {} but got {}",
                self.object_id, self.next_seq, sequence
            )));
        }
        self.buffer.extend_from_slice(payload);
        self.hasher.update(payload);
        self.next_seq += 1;
        Ok(self.next_seq >= self.parcel_count)
    }

    /// Consume the assembler, verifying CRC and returning the
    /// reassembled bytes.
    pub fn finish(self) -> Result<Vec<u8>, JennyError> {
        let computed = self.hasher.finalize();
        if computed != self.expected_crc {
            return Err(JennyError::StorageCrcError);
        }
        Ok(self.buffer)
    }
}

/// Accumulates a file transfer into a temp file, renaming to its final
/// resolved path on completion.
pub struct FileAssembler {
    pub object_id: u64,
    pub total_length: u64,
    pub parcel_count: u32,
    pub expected_crc: u32,
    pub remote_path: String,
    next_seq: u32,
    bytes_written: u64,
    hasher: crc32fast::Hasher,
    temp_path: PathBuf,
    file: AsyncFile,
}

impl FileAssembler {
    pub async fn create(
        object_id: u64,
        total_length: u64,
        parcel_count: u32,
        expected_crc: u32,
        remote_path: String,
        temp_dir: &std::path::Path,
    ) -> Result<Self, JennyError> {
        let temp_path = temp_dir.join(format!("jnet-{}.temp", Uuid::new_v4()));
        let file = open_temp_file(&temp_path).await?;
        io_manager::acquire(&temp_path, io_manager::Direction::Incoming);
        Ok(FileAssembler {
            object_id,
            total_length,
            parcel_count,
            expected_crc,
            remote_path,
            next_seq: 0,
            bytes_written: 0,
            hasher: crc32fast::Hasher::new(),
            temp_path,
            file,
        })
    }

    pub async fn push(&mut self, sequence: u32, payload: &[u8]) -> Result<bool, JennyError> {
        if sequence != self.next_seq {
            return Err(JennyError::FramingError(format!(
                "object {} expected sequence {} but got {}",
                self.object_id, self.next_seq, sequence
            )));
        }
        self.file.write_all(payload).await?;
        self.hasher.update(payload);
        self.bytes_written += payload.len() as u64;
        self.next_seq += 1;
        Ok(self.next_seq >= self.parcel_count)
    }

    /// Close the temp file, CRC-verify, and resolve the final path under
    /// `file_root`. Absolute `remote_path`s are rejected (design doc
    /// §6, `file-aborted(info=102)`). Does not perform the rename;
    /// callers do that once the destination parent directories exist.
    pub async fn finish(
        mut self,
        file_root: Option<&std::path::Path>,
    ) -> Result<(PathBuf, PathBuf), JennyError> {
        self.file.flush().await?;
        drop(self.file);
        io_manager::release(&self.temp_path, io_manager::Direction::Incoming);

        let computed = self.hasher.finalize();
        if computed != self.expected_crc {
            let _ = tokio::fs::remove_file(&self.temp_path).await;
            return Err(JennyError::StorageCrcError);
        }

        let relative = std::path::Path::new(&self.remote_path);
        if relative.is_absolute() {
            let _ = tokio::fs::remove_file(&self.temp_path).await;
            return Err(JennyError::DestinationRealisationError);
        }
        let final_path = match file_root {
            Some(root) => root.join(relative),
            None => relative.to_path_buf(),
        };
        Ok((self.temp_path, final_path))
    }

    /// Abort: release IO-Manager reservation and delete the partial temp
    /// file (used by remote-initiated BREAK, design document §4.4).
    pub async fn abort(self) {
        drop(self.file);
        io_manager::release(&self.temp_path, io_manager::Direction::Incoming);
        let _ = tokio::fs::remove_file(&self.temp_path).await;
    }

    pub fn temp_path(&self) -> &std::path::Path {
        &self.temp_path
    }
}

#[cfg(unix)]
async fn open_temp_file(path: &std::path::Path) -> Result<AsyncFile, JennyError> {
    use std::os::unix::fs::OpenOptionsExt;
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
        .await?;
    Ok(file)
}

#[cfg(not(unix))]
async fn open_temp_file(path: &std::path::Path) -> Result<AsyncFile, JennyError> {
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    Ok(file)
}

/// Tagged variant over the two assembler shapes, keyed by (INCOMING,
/// object-id) in the connection's assembler table.
pub enum IncomingAssembler {
    Data(DataAssembler),
    File(FileAssembler),
}

impl IncomingAssembler {
    pub fn object_id(&self) -> u64 {
        match self {
            IncomingAssembler::Data(a) => a.object_id,
            IncomingAssembler::File(a) => a.object_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_assembler_detects_sequence_gap() {
        let mut a = DataAssembler::new(1, 1, 4, 2, 0);
        assert!(!a.push(0, b"ab").unwrap());
        let err = a.push(2, b"cd").unwrap_err();
        assert!(matches!(err, JennyError::FramingError(_)));
    }

    #[test]
    fn data_assembler_verifies_crc() {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(b"hello");
        let crc = hasher.finalize();

        let mut good = DataAssembler::new(1, 1, 5, 1, crc);
        assert!(good.push(0, b"hello").unwrap());
        assert!(good.finish().is_ok());

        let mut bad = DataAssembler::new(1, 1, 5, 1, crc ^ 1);
        assert!(bad.push(0, b"hello").unwrap());
        assert!(matches!(bad.finish().unwrap_err(), JennyError::StorageCrcError));
    }

    #[tokio::test]
    async fn file_assembler_rejects_absolute_remote_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(b"xy");
        let crc = hasher.finalize();
        let mut assembler = FileAssembler::create(
            1,
            2,
            1,
            crc,
            "/etc/passwd".to_string(),
            dir.path(),
        )
        .await
        .unwrap();
        assert!(assembler.push(0, b"xy").await.unwrap());
        let err = assembler.finish(Some(dir.path())).await.unwrap_err();
        assert!(matches!(err, JennyError::DestinationRealisationError));
    }

    #[tokio::test]
    async fn file_assembler_resolves_under_file_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(b"xy");
        let crc = hasher.finalize();
        let mut assembler = FileAssembler::create(
            1,
            2,
            1,
            crc,
            "empfang/ursula-1.dat".to_string(),
            dir.path(),
        )
        .await
        .unwrap();
        assert!(assembler.push(0, b"xy").await.unwrap());
        let (_temp, final_path) = assembler.finish(Some(dir.path())).await.unwrap();
        assert_eq!(final_path, dir.path().join("empfang/ursula-1.dat"));
    }
}
