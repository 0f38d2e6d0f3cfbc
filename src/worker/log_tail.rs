//! Reading the worker log file for heartbeats and upload.

use crate::jobs::domain::LogTail;
use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use std::io::{self, Read, Seek, SeekFrom};

/// Bytes read from the end of the log; enough for [`LogTail::MAX_CHARS`]
/// characters of any UTF-8 text.
const TAIL_BYTES: u64 = 4 * LogTail::MAX_CHARS as u64;

fn open_log(path: &Utf8Path) -> io::Result<Option<cap_std::fs_utf8::File>> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("{path} names no file")))?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    match dir.open(file_name) {
        Ok(file) => Ok(Some(file)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Returns the tail of the log at `path`; a missing log has an empty tail.
///
/// # Errors
///
/// Returns an I/O error when the log exists but cannot be read.
pub fn read_log_tail(path: &Utf8Path) -> io::Result<LogTail> {
    let Some(mut file) = open_log(path)? else {
        return Ok(LogTail::default());
    };
    let length = file.metadata()?.len();
    file.seek(SeekFrom::Start(length.saturating_sub(TAIL_BYTES)))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(LogTail::new(String::from_utf8_lossy(&bytes).into_owned()))
}

/// Returns the whole log at `path`; a missing log is empty.
///
/// # Errors
///
/// Returns an I/O error when the log exists but cannot be read.
pub fn read_log(path: &Utf8Path) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    if let Some(mut file) = open_log(path)? {
        file.read_to_end(&mut bytes)?;
    }
    Ok(bytes)
}
