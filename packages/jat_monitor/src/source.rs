//! Buffer acquisition. The marker pipeline never touches I/O; this is the
//! caller side that feeds it.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Path argument meaning "read standard input".
pub const STDIN_PATH: &str = "-";

/// Reads a whole output buffer.
///
/// Terminal captures are not guaranteed to be valid UTF-8, so invalid
/// sequences are replaced rather than rejected.
pub fn read_buffer(path: &Path) -> Result<String> {
    let bytes = if path.as_os_str() == STDIN_PATH {
        let mut bytes = Vec::new();
        std::io::stdin()
            .read_to_end(&mut bytes)
            .context("Failed to read buffer from stdin")?;
        bytes
    } else {
        std::fs::read(path).with_context(|| format!("Failed to read buffer: {:?}", path))?
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Reads at most the last `max_bytes` of a buffer (`0` reads it all).
///
/// Files are read from `len - max_bytes` onwards, so the cost of a poll
/// does not grow with the file. A cut that lands inside a UTF-8 sequence
/// skips forward to the next character. Stdin cannot seek and is read
/// whole, then windowed.
pub fn read_tail(path: &Path, max_bytes: usize) -> Result<String> {
    if max_bytes == 0 || path.as_os_str() == STDIN_PATH {
        let buffer = read_buffer(path)?;
        return Ok(jat_markers::tail_window(&buffer, max_bytes).to_string());
    }

    let mut file =
        File::open(path).with_context(|| format!("Failed to read buffer: {:?}", path))?;
    let len = file
        .metadata()
        .with_context(|| format!("Failed to stat buffer: {:?}", path))?
        .len();
    let start = len.saturating_sub(max_bytes as u64);
    file.seek(SeekFrom::Start(start))
        .with_context(|| format!("Failed to seek buffer: {:?}", path))?;

    let mut bytes = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut bytes)
        .with_context(|| format!("Failed to read buffer: {:?}", path))?;

    let skip = if start > 0 {
        bytes.iter().take_while(|b| (0x80..0xC0).contains(*b)).count()
    } else {
        0
    };
    Ok(String::from_utf8_lossy(&bytes[skip..]).into_owned())
}
