//! Type-name compression.
//!
//! A compressed name is `u16 reference`, `u16 shared`, then a UTF-8 suffix.
//! `reference` is the 1-based index of a name sent earlier in the same
//! session (0 for none) and `shared` the number of leading bytes borrowed
//! from it. Both sides append every name they process to the same list, so
//! the list must be fed in stream order.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::DataError;
use crate::wire::decode::{decode_utf8, ensure_remaining};

const MAX_ENTRIES: usize = u16::MAX as usize;

/// Write-side name table.
#[derive(Debug, Default)]
pub struct NameCompressor {
    seen: Vec<String>,
    enabled: bool,
}

impl NameCompressor {
    pub fn new(enabled: bool) -> Self {
        Self {
            seen: Vec::new(),
            enabled,
        }
    }

    pub fn compress(&mut self, name: &str) -> Vec<u8> {
        let (reference, shared) = if self.enabled {
            self.best_match(name)
        } else {
            (0, 0)
        };

        let mut buf = BytesMut::with_capacity(4 + name.len() - shared);
        buf.put_u16(reference);
        buf.put_u16(shared as u16);
        buf.put_slice(&name.as_bytes()[shared..]);

        if self.seen.len() < MAX_ENTRIES {
            self.seen.push(name.to_owned());
        }
        buf.to_vec()
    }

    fn best_match(&self, name: &str) -> (u16, usize) {
        let mut best = (0u16, 0usize);
        for (index, prev) in self.seen.iter().enumerate() {
            let shared = shared_prefix(prev, name);
            if shared > best.1 {
                // index < MAX_ENTRIES, so index + 1 fits
                best = ((index + 1) as u16, shared);
            }
        }
        best
    }
}

/// Read-side name table.
#[derive(Debug, Default)]
pub struct NameDecompressor {
    seen: Vec<String>,
}

impl NameDecompressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decompress(&mut self, data: &[u8]) -> Result<String, DataError> {
        let name = self.resolve(data)?;
        if self.seen.len() < MAX_ENTRIES {
            self.seen.push(name.clone());
        }
        Ok(name)
    }

    /// Expands a compressed name without adding it to the table.
    pub fn resolve(&self, data: &[u8]) -> Result<String, DataError> {
        let mut buf = data;
        ensure_remaining(&buf, 4)?;
        let reference = usize::from(buf.get_u16());
        let shared = usize::from(buf.get_u16());

        let mut bytes = Vec::with_capacity(shared + buf.remaining());
        if reference == 0 {
            if shared != 0 {
                return Err(DataError::Protocol(format!(
                    "name shares {shared} bytes with no reference"
                )));
            }
        } else {
            let prev = self.seen.get(reference - 1).ok_or_else(|| {
                DataError::Protocol(format!("name reference {reference} was never sent"))
            })?;
            let prefix = prev.as_bytes().get(..shared).ok_or_else(|| {
                DataError::Protocol(format!(
                    "name reference {reference} is shorter than {shared} bytes"
                ))
            })?;
            bytes.extend_from_slice(prefix);
        }
        bytes.extend_from_slice(buf);

        decode_utf8(bytes)
    }
}

/// Longest common byte prefix, cut back to a char boundary and to `u16`.
fn shared_prefix(a: &str, b: &str) -> usize {
    let mut n = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count()
        .min(usize::from(u16::MAX));
    while !b.is_char_boundary(n) {
        n -= 1;
    }
    n
}
