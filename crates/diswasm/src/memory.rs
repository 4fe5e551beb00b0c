//! Flattened view of the initialized linear memory.
//!
//! All active data segments are copied into one buffer spanning
//! `[min(offset), max(offset + len))`; gaps between segments stay zero.

use crate::error::DecompileError;
use crate::ir::DataSegment;
use anyhow::{bail, Result};
use std::fmt::Write;

const ROW: usize = 16;
/// Largest flattened image, the size of a 32-bit address space.
const MAX_SPAN: u64 = 1 << 32;

/// Initialized memory, rebased so that `bytes[0]` lives at address `min`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryImage {
    pub min: u64,
    pub max: u64,
    pub bytes: Vec<u8>,
}

impl MemoryImage {
    pub fn from_segments(segments: &[DataSegment]) -> Result<Self> {
        let Some(min) = segments.iter().map(|s| s.offset).min() else {
            return Ok(Self::default());
        };
        let mut max = min;
        for seg in segments {
            let end = seg
                .offset
                .checked_add(seg.data.len() as u64)
                .ok_or_else(|| {
                    DecompileError::MalformedBody(format!(
                        "data segment at {:#x} ends past the address space",
                        seg.offset
                    ))
                })?;
            max = max.max(end);
        }
        if max - min > MAX_SPAN {
            bail!(DecompileError::MalformedBody(format!(
                "data segments span {:#x} bytes",
                max - min
            )));
        }
        let span = (max - min) as usize;

        let mut bytes = vec![0u8; span];
        for seg in segments {
            let start = (seg.offset - min) as usize;
            bytes[start..start + seg.data.len()].copy_from_slice(&seg.data);
        }
        Ok(Self { min, max, bytes })
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn contains(&self, addr: i64) -> bool {
        addr >= 0 && (addr as u64) >= self.min && (addr as u64) < self.max
    }

    /// NUL-terminated text at `addr`, if it is at least two printable bytes.
    pub fn string_at(&self, addr: i64) -> Option<String> {
        if !self.contains(addr) {
            return None;
        }
        let start = (addr as u64 - self.min) as usize;
        let len = self.bytes[start..].iter().position(|b| *b == 0)?;
        let text = &self.bytes[start..start + len];
        if text.len() < 2 || !text.iter().all(|b| is_text_byte(*b)) {
            return None;
        }
        Some(escape_text(text))
    }

    /// Hex and text rows, 16 bytes each, prefixed by the dump banner.
    pub fn dump(&self) -> String {
        let mut out = String::from("\n/****INITIALIZED MEMORY DUMP****/\n");
        for (i, row) in self.bytes.chunks(ROW).enumerate() {
            let hex: Vec<String> = row.iter().map(|b| format!("{:02x}", b)).collect();
            let _ = writeln!(
                out,
                "// {:08x}: {} : \"{}\"",
                self.min + (i * ROW) as u64,
                hex.join(" "),
                escape_text(row)
            );
        }
        out
    }
}

fn is_text_byte(b: u8) -> bool {
    (0x20..0x7f).contains(&b) || matches!(b, b'\n' | b'\t' | b'\r')
}

/// Quoted-string body for raw bytes; anything unprintable becomes `\xNN`.
pub fn escape_text(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\x{:02x}", b);
            }
        }
    }
    out
}
