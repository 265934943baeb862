//! Little-endian primitives shared by the entity state message and replication frames.

use thiserror::Error;

use crate::math::{Color, Vec3};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("label is {len} bytes, longer than the u16 length prefix allows")]
    LabelTooLong { len: usize },
    #[error("frame holds {count} {what}, limit is {limit}")]
    TooManyEntries {
        what: &'static str,
        count: usize,
        limit: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error(
        "truncated stream reading {field} at offset {offset}: needed {needed} bytes, {remaining} remaining"
    )]
    Truncated {
        field: &'static str,
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    #[error("label at offset {offset} is not valid UTF-8")]
    InvalidLabel { offset: usize },
    #[error("{count} unexpected trailing bytes after message")]
    TrailingBytes { count: usize },
    #[error("invalid frame magic")]
    BadMagic,
    #[error("unsupported frame version {found} (expected {expected})")]
    UnsupportedVersion { found: u8, expected: u8 },
    #[error("message of {len} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { len: usize, limit: usize },
    #[error("frame declares {declared} {what}, limit is {limit}")]
    TooManyEntries {
        what: &'static str,
        declared: usize,
        limit: usize,
    },
}

pub(crate) fn write_u8(target: &mut Vec<u8>, value: u8) {
    target.push(value);
}

pub(crate) fn write_u32(target: &mut Vec<u8>, value: u32) {
    target.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_u64(target: &mut Vec<u8>, value: u64) {
    target.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_f32(target: &mut Vec<u8>, value: f32) {
    target.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_vec3(target: &mut Vec<u8>, value: Vec3) {
    write_f32(target, value.x);
    write_f32(target, value.y);
    write_f32(target, value.z);
}

pub(crate) fn write_color(target: &mut Vec<u8>, value: Color) {
    target.extend_from_slice(&value.to_bytes());
}

pub(crate) fn write_string(target: &mut Vec<u8>, value: &str) -> Result<(), EncodeError> {
    let bytes = value.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(EncodeError::LabelTooLong { len: bytes.len() });
    }
    target.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    target.extend_from_slice(bytes);
    Ok(())
}

/// Writes `count` as a `u32`, refusing anything above `limit`.
pub(crate) fn write_count(
    target: &mut Vec<u8>,
    count: usize,
    limit: usize,
    what: &'static str,
) -> Result<(), EncodeError> {
    let limit = limit.min(u32::MAX as usize);
    if count > limit {
        return Err(EncodeError::TooManyEntries { what, count, limit });
    }
    write_u32(target, count as u32);
    Ok(())
}

pub(crate) fn read_exact<'a>(
    bytes: &'a [u8],
    cursor: &mut usize,
    len: usize,
    field: &'static str,
) -> Result<&'a [u8], DecodeError> {
    let end = cursor.saturating_add(len);
    if end > bytes.len() {
        return Err(DecodeError::Truncated {
            field,
            offset: *cursor,
            needed: len,
            remaining: bytes.len().saturating_sub(*cursor),
        });
    }
    let out = &bytes[*cursor..end];
    *cursor = end;
    Ok(out)
}

fn read_array<const N: usize>(
    bytes: &[u8],
    cursor: &mut usize,
    field: &'static str,
) -> Result<[u8; N], DecodeError> {
    let raw = read_exact(bytes, cursor, N, field)?;
    let mut out = [0u8; N];
    out.copy_from_slice(raw);
    Ok(out)
}

pub(crate) fn read_u8(
    bytes: &[u8],
    cursor: &mut usize,
    field: &'static str,
) -> Result<u8, DecodeError> {
    Ok(read_array::<1>(bytes, cursor, field)?[0])
}

pub(crate) fn read_u16(
    bytes: &[u8],
    cursor: &mut usize,
    field: &'static str,
) -> Result<u16, DecodeError> {
    read_array(bytes, cursor, field).map(u16::from_le_bytes)
}

pub(crate) fn read_u32(
    bytes: &[u8],
    cursor: &mut usize,
    field: &'static str,
) -> Result<u32, DecodeError> {
    read_array(bytes, cursor, field).map(u32::from_le_bytes)
}

pub(crate) fn read_u64(
    bytes: &[u8],
    cursor: &mut usize,
    field: &'static str,
) -> Result<u64, DecodeError> {
    read_array(bytes, cursor, field).map(u64::from_le_bytes)
}

pub(crate) fn read_f32(
    bytes: &[u8],
    cursor: &mut usize,
    field: &'static str,
) -> Result<f32, DecodeError> {
    read_array(bytes, cursor, field).map(f32::from_le_bytes)
}

pub(crate) fn read_vec3(
    bytes: &[u8],
    cursor: &mut usize,
    field: &'static str,
) -> Result<Vec3, DecodeError> {
    let raw = read_exact(bytes, cursor, 12, field)?;
    let mut offset = 0usize;
    let x = read_f32(raw, &mut offset, field)?;
    let y = read_f32(raw, &mut offset, field)?;
    let z = read_f32(raw, &mut offset, field)?;
    Ok(Vec3::new(x, y, z))
}

pub(crate) fn read_color(
    bytes: &[u8],
    cursor: &mut usize,
    field: &'static str,
) -> Result<Color, DecodeError> {
    read_array(bytes, cursor, field).map(Color::from_bytes)
}

pub(crate) fn read_string(
    bytes: &[u8],
    cursor: &mut usize,
    field: &'static str,
) -> Result<String, DecodeError> {
    let len = read_u16(bytes, cursor, field)? as usize;
    let offset = *cursor;
    let raw = read_exact(bytes, cursor, len, field)?;
    std::str::from_utf8(raw)
        .map(ToString::to_string)
        .map_err(|_| DecodeError::InvalidLabel { offset })
}
