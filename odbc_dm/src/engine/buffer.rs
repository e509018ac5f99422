//! Copying manager-produced values into caller buffers.

use crate::error::{DmError, Result};

/// Outcome of copying a string: the untruncated byte length and whether the
/// caller's buffer was too small for it and its terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Copied {
    pub length: usize,
    pub truncated: bool,
}

/// Copies `src` as a NUL-terminated string. A buffer of capacity `n` receives
/// at most `n - 1` bytes plus the terminator. `None` only reports the length.
pub fn copy_str(src: &str, out: Option<&mut [u8]>) -> Copied {
    let bytes = src.as_bytes();
    let Some(out) = out else {
        return Copied {
            length: bytes.len(),
            truncated: false,
        };
    };

    let truncated = out.len() < bytes.len() + 1;
    if let Some(room) = out.len().checked_sub(1) {
        let n = bytes.len().min(room);
        out[..n].copy_from_slice(&bytes[..n]);
        out[n] = 0;
    }
    Copied {
        length: bytes.len(),
        truncated,
    }
}

/// Writes a handle-sized value in native byte order.
pub fn write_word(value: usize, out: Option<&mut [u8]>) -> Result<usize> {
    const SIZE: usize = std::mem::size_of::<usize>();
    if let Some(out) = out {
        if out.len() < SIZE {
            return Err(DmError::InvalidBufferLength);
        }
        out[..SIZE].copy_from_slice(&value.to_ne_bytes());
    }
    Ok(SIZE)
}

/// Reads a handle-sized value written by the caller.
pub fn read_word(buf: Option<&[u8]>) -> Option<usize> {
    let bytes = buf?.get(..std::mem::size_of::<usize>())?;
    Some(usize::from_ne_bytes(bytes.try_into().ok()?))
}

/// Clamps a length to the `SQLSMALLINT` range used by length out-arguments.
pub fn short_length(length: usize) -> i16 {
    i16::try_from(length).unwrap_or(i16::MAX)
}
