//! Tar payloads that carry files across the container boundary.
//!
//! Docker's copy API only speaks tar, and tar headers carry the entry size
//! before its content, so code is fully materialized before it is packed.

use bytes::Bytes;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder, EntryType, Header};

use super::SandboxError;

/// An in-memory tar archive holding exactly one regular file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CodeArchive {
    file_name: String,
    bytes: Bytes,
}

impl CodeArchive {
    /// Packs source code into a single-entry archive named `file_name`.
    ///
    /// The output depends only on the inputs: timestamps, ownership, and mode
    /// are fixed, so identical code always yields identical bytes.
    pub(crate) fn pack(code: &str, file_name: &str) -> Result<Self, SandboxError> {
        Self::from_bytes(file_name, code.as_bytes())
    }

    /// Packs arbitrary file contents into a single-entry archive.
    pub(crate) fn from_bytes(file_name: &str, data: &[u8]) -> Result<Self, SandboxError> {
        validate_file_name(file_name)?;

        let mut header = Header::new_ustar();
        header
            .set_path(file_name)
            .map_err(|e| SandboxError::injection(format!("invalid file name {file_name}: {e}")))?;
        header.set_entry_type(EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_cksum();

        let mut builder = Builder::new(Vec::new());
        builder
            .append(&header, data)
            .map_err(|e| SandboxError::injection(format!("failed to build archive: {e}")))?;
        let buf = builder
            .into_inner()
            .map_err(|e| SandboxError::injection(format!("failed to finalize archive: {e}")))?;

        Ok(Self {
            file_name: file_name.to_string(),
            bytes: Bytes::from(buf),
        })
    }

    /// Name of the single entry.
    pub(crate) fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Archive payload. Cloning `Bytes` does not copy the buffer.
    pub(crate) fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }
}

/// Accepts a single plain path component: no separators, `.` or `..`.
pub(crate) fn validate_file_name(file_name: &str) -> Result<(), SandboxError> {
    let mut components = Path::new(file_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !file_name.contains(['/', '\\']) => Ok(()),
        _ => Err(SandboxError::injection(format!(
            "script name must be a plain file name, got {file_name:?}"
        ))),
    }
}

/// Unpacks the first regular file in `archive` into `dest_dir`.
///
/// Returns the path of the unpacked file. Entries that would land outside
/// `dest_dir` are refused.
pub(crate) fn unpack_first(archive: &[u8], dest_dir: &Path) -> Result<PathBuf, SandboxError> {
    let mut archive = Archive::new(Cursor::new(archive));
    let entries = archive
        .entries()
        .map_err(|e| SandboxError::extraction(format!("failed to read archive: {e}")))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| SandboxError::extraction(format!("failed to read entry: {e}")))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .map_err(|e| SandboxError::extraction(format!("invalid entry path: {e}")))?
            .into_owned();

        let unpacked = entry
            .unpack_in(dest_dir)
            .map_err(|e| SandboxError::extraction(format!("failed to unpack: {e}")))?;
        if !unpacked {
            return Err(SandboxError::extraction(format!(
                "refusing to unpack {} outside {}",
                relative.display(),
                dest_dir.display()
            )));
        }

        return Ok(dest_dir.join(relative));
    }

    Err(SandboxError::extraction("archive holds no regular file"))
}
