//! Decoding of `-data-read-memory-bytes` responses.

use base64::Engine as _;
use serde::Serialize;

use crate::error::{MiError, Result};
use crate::mi::ResultRecord;

/// Page size assumed when estimating how many trailing bytes are unreadable.
/// Fixed regardless of the target's real page size.
pub const PAGE_SIZE: u64 = 4096;

/// Message GDB uses when no byte of the range could be read.
pub const UNREADABLE_MESSAGE: &str = "Unable to read memory.";

/// Parse the address at the start of a memory reference such as
/// `0x7fffffffe250 "/home/user/app"`. Hex needs a `0x` prefix.
pub fn parse_address(reference: &str) -> Option<u64> {
    let token = reference.split_whitespace().next()?;
    match token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => token.parse().ok(),
    }
}

/// Resolve `reference` plus `offset` to an absolute address.
pub fn resolve_address(reference: &str, offset: i64) -> Result<u64> {
    if reference.trim().is_empty() {
        return Err(MiError::InvalidArgument("memory reference is empty".to_string()));
    }
    let base = parse_address(reference).ok_or_else(|| {
        MiError::InvalidArgument(format!("invalid memory reference: {reference}"))
    })?;
    base.checked_add_signed(offset).ok_or_else(|| {
        MiError::InvalidArgument(format!("memory offset {offset} overflows {reference}"))
    })
}

pub fn read_command(address: u64, count: u64) -> String {
    format!("data-read-memory-bytes 0x{address:016x} {count}")
}

/// Decode hex text two characters per byte, stopping after `limit` bytes or
/// at the first malformed pair.
pub fn decode_hex(contents: &str, limit: usize) -> Vec<u8> {
    contents
        .as_bytes()
        .chunks_exact(2)
        .take(limit)
        .map_while(|pair| {
            let pair = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(pair, 16).ok()
        })
        .collect()
}

/// Bytes at the end of a short read that the front end should treat as
/// unreadable.
///
/// The read is assumed to have stopped at a page fault: when the rest of the
/// requested range crosses the next page boundary, only the bytes up to that
/// boundary are reported; otherwise the shortfall, at most one page.
pub fn unreadable_bytes(address: u64, requested: u64, bytes_read: u64) -> u64 {
    if bytes_read >= requested {
        return 0;
    }
    let shortfall = requested - bytes_read;
    let read_end = address.saturating_add(bytes_read);
    let mut next_page = read_end.div_ceil(PAGE_SIZE).saturating_mul(PAGE_SIZE);
    if next_page == read_end {
        next_page = read_end.saturating_add(PAGE_SIZE);
    }
    if address.saturating_add(requested) > next_page {
        shortfall.min(next_page - read_end)
    } else {
        shortfall.min(PAGE_SIZE)
    }
}

/// Result of a memory read, as handed to the front end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MemoryRead {
    pub address: u64,
    /// Base64 of the bytes that were read.
    pub data: String,
    pub unreadable_bytes: u64,
}

impl MemoryRead {
    pub fn empty(address: u64) -> Self {
        Self {
            address,
            data: String::new(),
            unreadable_bytes: 0,
        }
    }

    pub fn bytes(&self) -> Vec<u8> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.data)
            .unwrap_or_default()
    }

    /// Build from a successful `-data-read-memory-bytes` record for a read of
    /// `count` bytes at `address`.
    pub fn from_response(
        command: &str,
        address: u64,
        count: u64,
        record: &ResultRecord,
    ) -> Result<Self> {
        let field = |name: &str| {
            record
                .result_str(&format!("memory[0].{name}"))
                .ok_or_else(|| MiError::decode(command, format!("missing memory[0].{name}")))
        };
        let begin = parse_address(field("begin")?)
            .ok_or_else(|| MiError::decode(command, "malformed memory[0].begin"))?;
        let offset = parse_address(field("offset")?)
            .ok_or_else(|| MiError::decode(command, "malformed memory[0].offset"))?;
        let actual = begin.wrapping_add(offset);
        if actual != address {
            return Err(MiError::MemoryAddressMismatch {
                expected: address,
                actual,
            });
        }

        let contents = field("contents")?;
        let limit = usize::try_from(count).unwrap_or(usize::MAX);
        let bytes = decode_hex(contents, limit);
        let bytes_read = bytes.len() as u64;
        Ok(Self {
            address,
            data: base64::engine::general_purpose::STANDARD.encode(&bytes),
            unreadable_bytes: unreadable_bytes(address, count, bytes_read),
        })
    }
}
