//! Binary encoding of session sub-records.
//!
//! Header layout (big-endian, 22 bytes):
//!
//! ```text
//! version:u8 | flag:u8 | timeout_minutes:u32 | lock_owner:u64 | lock_timestamp_micros:i64
//! ```
//!
//! `lock_owner` is 0 when unlocked. The version byte lets the layout evolve;
//! readers reject versions they don't know.
//!
//! Data layout:
//!
//! ```text
//! count:u32 | count × (name_len:u16 | name:utf8 | type_tag:u8 | payload_len:u32 | payload)
//! ```

use bytes::{Buf, BufMut};
use chrono::DateTime;

use crate::items::{SessionItem, SessionItems, TypeTag};
use crate::record::{LockId, SessionAction, SessionHeader};

/// Current header layout version.
pub const HEADER_VERSION: u8 = 1;

/// Encoded header size for [`HEADER_VERSION`].
pub const HEADER_LEN: usize = 22;

/// Malformed sub-record bytes, or items too large to encode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("unknown header version {0}")]
    UnknownVersion(u8),

    #[error("header is {actual} bytes, expected {expected}")]
    HeaderLength { expected: usize, actual: usize },

    #[error("header timeout is zero")]
    ZeroTimeout,

    #[error("lock timestamp {0} out of range")]
    InvalidTimestamp(i64),

    #[error("truncated while reading {0}")]
    Truncated(&'static str),

    #[error("{0} trailing bytes after last item")]
    TrailingBytes(usize),

    #[error("item name is not valid UTF-8")]
    InvalidName,

    #[error("duplicate item name '{0}'")]
    DuplicateName(String),

    #[error("item name '{0}...' longer than 65535 bytes")]
    NameTooLong(String),

    #[error("item '{0}' payload larger than 4 GiB")]
    PayloadTooLarge(String),

    #[error("more than {} items", u32::MAX)]
    TooManyItems,
}

// ─────────────────────────────────────────────────────────────────────────────
// Header
// ─────────────────────────────────────────────────────────────────────────────

/// Encode a header.
pub fn encode_header(header: &SessionHeader) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN);
    buf.put_u8(HEADER_VERSION);
    buf.put_u8(header.flag.to_byte());
    buf.put_u32(header.timeout_minutes);
    buf.put_u64(header.lock_owner.map_or(0, LockId::get));
    buf.put_i64(header.lock_timestamp.timestamp_micros());
    buf
}

/// Decode a header.
pub fn decode_header(bytes: &[u8]) -> Result<SessionHeader, CodecError> {
    let Some(&version) = bytes.first() else {
        return Err(CodecError::Truncated("header version"));
    };
    if version != HEADER_VERSION {
        return Err(CodecError::UnknownVersion(version));
    }
    if bytes.len() != HEADER_LEN {
        return Err(CodecError::HeaderLength {
            expected: HEADER_LEN,
            actual: bytes.len(),
        });
    }

    let mut buf = &bytes[1..];
    let flag = SessionAction::from_byte(buf.get_u8());
    let timeout_minutes = buf.get_u32();
    let lock_owner = LockId::new(buf.get_u64());
    let micros = buf.get_i64();

    if timeout_minutes == 0 {
        return Err(CodecError::ZeroTimeout);
    }
    let lock_timestamp =
        DateTime::from_timestamp_micros(micros).ok_or(CodecError::InvalidTimestamp(micros))?;

    Ok(SessionHeader {
        flag,
        timeout_minutes,
        lock_owner,
        lock_timestamp,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Data
// ─────────────────────────────────────────────────────────────────────────────

/// Encode session items.
pub fn encode_data(items: &SessionItems) -> Result<Vec<u8>, CodecError> {
    let count = u32::try_from(items.len()).map_err(|_| CodecError::TooManyItems)?;
    let payload: usize = items.iter().map(|i| i.name.len() + i.value.len() + 7).sum();

    let mut buf = Vec::with_capacity(4 + payload);
    buf.put_u32(count);

    for item in items {
        let name_len = u16::try_from(item.name.len())
            .map_err(|_| CodecError::NameTooLong(truncated_name(&item.name)))?;
        let value_len = u32::try_from(item.value.len())
            .map_err(|_| CodecError::PayloadTooLarge(item.name.clone()))?;

        buf.put_u16(name_len);
        buf.put_slice(item.name.as_bytes());
        buf.put_u8(item.tag.0);
        buf.put_u32(value_len);
        buf.put_slice(&item.value);
    }

    Ok(buf)
}

/// Decode session items.
pub fn decode_data(bytes: &[u8]) -> Result<SessionItems, CodecError> {
    let mut buf = bytes;
    let count = take(&mut buf, 4, "item count")?.get_u32();

    // Every item needs at least 7 bytes; don't trust `count` for allocation.
    let mut items = SessionItems::with_capacity((count as usize).min(buf.len() / 7));

    for _ in 0..count {
        let name_len = take(&mut buf, 2, "item name length")?.get_u16();
        let name = std::str::from_utf8(take(&mut buf, name_len as usize, "item name")?)
            .map_err(|_| CodecError::InvalidName)?
            .to_string();
        let tag = TypeTag(take(&mut buf, 1, "item type tag")?.get_u8());
        let value_len = take(&mut buf, 4, "item payload length")?.get_u32();
        let value = take(&mut buf, value_len as usize, "item payload")?.to_vec();

        if items.contains(&name) {
            return Err(CodecError::DuplicateName(name));
        }
        items.push_unchecked(SessionItem { name, tag, value });
    }

    if !buf.is_empty() {
        return Err(CodecError::TrailingBytes(buf.len()));
    }

    Ok(items)
}

/// Split `n` bytes off the front of `buf`.
fn take<'a>(buf: &mut &'a [u8], n: usize, what: &'static str) -> Result<&'a [u8], CodecError> {
    if buf.len() < n {
        return Err(CodecError::Truncated(what));
    }
    let (head, rest) = buf.split_at(n);
    *buf = rest;
    Ok(head)
}

fn truncated_name(name: &str) -> String {
    name.chars().take(32).collect()
}
