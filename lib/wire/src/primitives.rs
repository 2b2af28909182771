//! Hand-rolled tagged binary layout: fixed-width network-byte-order
//! integers, `[u32 len][bytes]` strings (`len == NULL_LEN` means null),
//! `[u32 count][elements]` arrays, big-endian IEEE-754 floats.
//!
//! `SizedRead`/`WireDecode` are grounded on `flux::shared`'s
//! `SizedRead`/`Deserialize` pair: a decoder that knows how much of the
//! source remains can return `Error::Wait` instead of panicking or
//! reading past the end of a not-yet-fully-buffered message. The write
//! side is plain `Vec<u8>` appension: a `WireEncode` value is always
//! fully assembled in memory before encoding, so there is no equivalent
//! "not enough capacity yet" case to track.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use slurm_common::error::{Error, Result};
use std::io::Cursor;

/// Sentinel length marking a null string in the wire format.
pub const NULL_LEN: u32 = 0xFFFF_FFFF;

/// An `io::Read` source that knows how much unread data remains, so a
/// decoder can distinguish "truncated, wait for more bytes" from a
/// genuine framing error.
pub trait SizedRead {
    fn remaining(&self) -> usize;
    fn take(&mut self, n: usize) -> Result<&[u8]>;
}

impl<'a> SizedRead for Cursor<&'a [u8]> {
    fn remaining(&self) -> usize {
        self.get_ref().len() - self.position() as usize
    }

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        let pos = self.position() as usize;
        if self.get_ref().len() - pos < n {
            return Err(Error::Wait);
        }
        let slice = &self.get_ref()[pos..pos + n];
        self.set_position((pos + n) as u64);
        Ok(slice)
    }
}

pub trait WireEncode {
    fn encode(&self, out: &mut Vec<u8>);
}

pub trait WireDecode: Sized {
    fn decode(cursor: &mut Cursor<&[u8]>) -> Result<Self>;
}

pub fn write_u16(out: &mut Vec<u8>, v: u16) {
    out.write_u16::<BigEndian>(v).expect("write to Vec never fails");
}

pub fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.write_u32::<BigEndian>(v).expect("write to Vec never fails");
}

pub fn write_u64(out: &mut Vec<u8>, v: u64) {
    out.write_u64::<BigEndian>(v).expect("write to Vec never fails");
}

pub fn write_f64(out: &mut Vec<u8>, v: f64) {
    out.write_f64::<BigEndian>(v).expect("write to Vec never fails");
}

pub fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

/// `None` is written as the sentinel length with no body.
pub fn write_string(out: &mut Vec<u8>, s: Option<&str>) {
    match s {
        None => write_u32(out, NULL_LEN),
        Some(s) => write_bytes(out, s.as_bytes()),
    }
}

pub fn write_array<T, F>(out: &mut Vec<u8>, items: &[T], mut write_one: F)
where
    F: FnMut(&mut Vec<u8>, &T),
{
    write_u32(out, items.len() as u32);
    for item in items {
        write_one(out, item);
    }
}

fn need(cursor: &Cursor<&[u8]>, n: usize) -> Result<()> {
    if cursor.remaining() < n {
        Err(Error::Wait)
    } else {
        Ok(())
    }
}

pub fn read_u16(cursor: &mut Cursor<&[u8]>) -> Result<u16> {
    need(cursor, 2)?;
    Ok(cursor.read_u16::<BigEndian>().expect("checked above"))
}

pub fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32> {
    need(cursor, 4)?;
    Ok(cursor.read_u32::<BigEndian>().expect("checked above"))
}

pub fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64> {
    need(cursor, 8)?;
    Ok(cursor.read_u64::<BigEndian>().expect("checked above"))
}

pub fn read_f64(cursor: &mut Cursor<&[u8]>) -> Result<f64> {
    need(cursor, 8)?;
    Ok(cursor.read_f64::<BigEndian>().expect("checked above"))
}

pub fn read_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Vec<u8>> {
    let len = read_u32(cursor)? as usize;
    Ok(cursor.take(len)?.to_vec())
}

pub fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<Option<String>> {
    let save = cursor.position();
    let len = read_u32(cursor)?;
    if len == NULL_LEN {
        return Ok(None);
    }
    cursor.set_position(save);
    let bytes = {
        // re-read the length so `take` accounts for it via read_bytes
        read_bytes(cursor)?
    };
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|_| Error::ProtocolDecode("invalid utf8 in wire string".into()))
}

pub fn read_array<T, F>(cursor: &mut Cursor<&[u8]>, mut read_one: F) -> Result<Vec<T>>
where
    F: FnMut(&mut Cursor<&[u8]>) -> Result<T>,
{
    let count = read_u32(cursor)? as usize;
    let mut items = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        items.push(read_one(cursor)?);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_roundtrip_including_null() {
        let mut buf = Vec::new();
        write_string(&mut buf, Some("hello"));
        write_string(&mut buf, None);

        let mut cursor = Cursor::new(buf.as_slice());
        assert_eq!(read_string(&mut cursor).unwrap(), Some("hello".to_string()));
        assert_eq!(read_string(&mut cursor).unwrap(), None);
    }

    #[test]
    fn truncated_buffer_yields_wait() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 100);
        buf.truncate(buf.len() - 1);

        let mut cursor = Cursor::new(buf.as_slice());
        assert!(matches!(read_u32(&mut cursor), Err(Error::Wait)));
    }

    #[test]
    fn array_roundtrip() {
        let mut buf = Vec::new();
        write_array(&mut buf, &[1u32, 2, 3], |out, v| write_u32(out, *v));

        let mut cursor = Cursor::new(buf.as_slice());
        let items = read_array(&mut cursor, |c| read_u32(c)).unwrap();
        assert_eq!(items, vec![1, 2, 3]);
    }
}
