//! Fixed-width primitive reads/writes at a byte position within a page
//! buffer, plus a cursor that encoders consume.
//!
//! Built on the same `read_u16`/`write_u16` free-function style
//! (`std::io::Cursor` + `byteorder`) used elsewhere in this storage stack,
//! generalized to the full set of widths the header and slot array need,
//! and extended with an explicit cursor type so encoders can be written
//! against a `position`/`seek` contract instead of raw offsets.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::NodeError;

fn bounds_err(what: &str, off: usize, len: usize, buf_len: usize) -> NodeError {
    NodeError::corrupt(format!(
        "{what} out of bounds: off={off} len={len} buf_len={buf_len}"
    ))
}

pub fn read_u8(buf: &[u8], off: usize) -> Result<u8, NodeError> {
    buf.get(off)
        .copied()
        .ok_or_else(|| bounds_err("read_u8", off, 1, buf.len()))
}

pub fn write_u8(buf: &mut [u8], off: usize, v: u8) -> Result<(), NodeError> {
    let buf_len = buf.len();
    let slot = buf
        .get_mut(off)
        .ok_or_else(|| bounds_err("write_u8", off, 1, buf_len))?;
    *slot = v;
    Ok(())
}

macro_rules! rw_primitive {
    ($read_name:ident, $write_name:ident, $ty:ty, $width:expr, $read_fn:ident, $write_fn:ident) => {
        pub fn $read_name(buf: &[u8], off: usize) -> Result<$ty, NodeError> {
            if off + $width > buf.len() {
                return Err(bounds_err(stringify!($read_name), off, $width, buf.len()));
            }
            let mut rdr = std::io::Cursor::new(&buf[off..off + $width]);
            rdr.$read_fn::<LittleEndian>()
                .map_err(|e| NodeError::corrupt(e.to_string()))
        }

        pub fn $write_name(buf: &mut [u8], off: usize, v: $ty) -> Result<(), NodeError> {
            let buf_len = buf.len();
            if off + $width > buf_len {
                return Err(bounds_err(stringify!($write_name), off, $width, buf_len));
            }
            let mut w = std::io::Cursor::new(&mut buf[off..off + $width]);
            w.$write_fn::<LittleEndian>(v)
                .map_err(|e| NodeError::corrupt(e.to_string()))
        }
    };
}

rw_primitive!(read_u16, write_u16, u16, 2, read_u16, write_u16);
rw_primitive!(read_u32, write_u32, u32, 4, read_u32, write_u32);
rw_primitive!(read_u64, write_u64, u64, 8, read_u64, write_u64);

/// Shift `len` bytes from `src` to `dst` within the same buffer.
///
/// This is the sole primitive behind both the forward-growing slot shifts
/// and the backward-growing heap compaction shifts; `copy_within` already
/// handles overlapping forward/backward moves correctly.
pub fn move_data(buf: &mut [u8], src: usize, dst: usize, len: usize) -> Result<(), NodeError> {
    let buf_len = buf.len();
    if src + len > buf_len || dst + len > buf_len {
        return Err(bounds_err("move_data", src.max(dst), len, buf_len));
    }
    buf.copy_within(src..src + len, dst);
    Ok(())
}

/// A session-local cursor over a page buffer, consumed by `Encoder` impls.
///
/// Modeled as an explicit value rather than implicit state on the buffer
/// itself: encoders take `&mut PageCursor` and advance its position as they
/// read/write, exactly like `position`/`seek` on the page-buffer contract.
pub struct PageCursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> PageCursor<'a> {
    pub fn new(buf: &'a mut [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move to `pos`, returning the previous position.
    pub fn seek(&mut self, pos: usize) -> usize {
        std::mem::replace(&mut self.pos, pos)
    }

    pub fn read_u8(&mut self) -> Result<u8, NodeError> {
        let v = read_u8(self.buf, self.pos)?;
        self.pos += 1;
        Ok(v)
    }

    pub fn write_u8(&mut self, v: u8) -> Result<(), NodeError> {
        write_u8(self.buf, self.pos, v)?;
        self.pos += 1;
        Ok(())
    }

    pub fn read_u16(&mut self) -> Result<u16, NodeError> {
        let v = read_u16(self.buf, self.pos)?;
        self.pos += 2;
        Ok(v)
    }

    pub fn write_u16(&mut self, v: u16) -> Result<(), NodeError> {
        write_u16(self.buf, self.pos, v)?;
        self.pos += 2;
        Ok(())
    }

    pub fn read_u32(&mut self) -> Result<u32, NodeError> {
        let v = read_u32(self.buf, self.pos)?;
        self.pos += 4;
        Ok(v)
    }

    pub fn write_u32(&mut self, v: u32) -> Result<(), NodeError> {
        write_u32(self.buf, self.pos, v)?;
        self.pos += 4;
        Ok(())
    }

    pub fn read_u64(&mut self) -> Result<u64, NodeError> {
        let v = read_u64(self.buf, self.pos)?;
        self.pos += 8;
        Ok(v)
    }

    pub fn write_u64(&mut self, v: u64) -> Result<(), NodeError> {
        write_u64(self.buf, self.pos, v)?;
        self.pos += 8;
        Ok(())
    }

    /// Read `n` raw bytes, advancing the cursor.
    pub fn read_bytes(&mut self, n: usize) -> Result<&[u8], NodeError> {
        let buf_len = self.buf.len();
        if self.pos + n > buf_len {
            return Err(bounds_err("read_bytes", self.pos, n, buf_len));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Write raw bytes, advancing the cursor.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), NodeError> {
        let buf_len = self.buf.len();
        if self.pos + bytes.len() > buf_len {
            return Err(bounds_err("write_bytes", self.pos, bytes.len(), buf_len));
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }
}
