//! Little-endian cursor and writer helpers shared by the frame and batch codecs.

use bytes::{Buf, BufMut, BytesMut};
use vcm_types::VectorEncoding;

use crate::error::CodecError;

/// Bounds-checked reader over a byte slice.
///
/// Every read names the section it belongs to so truncation errors point at
/// the broken part of the frame.
pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, needed: usize, section: &'static str) -> Result<(), CodecError> {
        if self.buf.remaining() < needed {
            return Err(CodecError::Truncated {
                section,
                needed,
                available: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub(crate) fn take(&mut self, n: usize, section: &'static str) -> Result<&'a [u8], CodecError> {
        self.ensure(n, section)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub(crate) fn u8(&mut self, section: &'static str) -> Result<u8, CodecError> {
        self.ensure(1, section)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn u16(&mut self, section: &'static str) -> Result<u16, CodecError> {
        self.ensure(2, section)?;
        Ok(self.buf.get_u16_le())
    }

    pub(crate) fn u32(&mut self, section: &'static str) -> Result<u32, CodecError> {
        self.ensure(4, section)?;
        Ok(self.buf.get_u32_le())
    }

    pub(crate) fn f64(&mut self, section: &'static str) -> Result<f64, CodecError> {
        self.ensure(8, section)?;
        Ok(self.buf.get_f64_le())
    }

    /// Presence flag: 0 or 1, anything else is malformed.
    pub(crate) fn flag(&mut self, section: &'static str) -> Result<bool, CodecError> {
        match self.u8(section)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidField(format!(
                "{section}: presence flag {other}"
            ))),
        }
    }

    /// Read `count` components at the given encoding width.
    ///
    /// The byte budget is checked before allocating so a forged count cannot
    /// request more memory than the frame actually carries.
    pub(crate) fn values(
        &mut self,
        count: usize,
        encoding: VectorEncoding,
        section: &'static str,
    ) -> Result<Vec<f32>, CodecError> {
        let width = encoding.bytes_per_value();
        let needed = count.checked_mul(width).ok_or(CodecError::Truncated {
            section,
            needed: usize::MAX,
            available: self.remaining(),
        })?;
        let mut raw = self.take(needed, section)?;
        let mut out = Vec::with_capacity(count);
        match encoding {
            VectorEncoding::Float32 => {
                for _ in 0..count {
                    out.push(raw.get_f32_le());
                }
            }
            VectorEncoding::Float64 => {
                for _ in 0..count {
                    out.push(raw.get_f64_le() as f32);
                }
            }
        }
        Ok(out)
    }

    /// Fail if anything is left unread.
    pub(crate) fn finish(self) -> Result<(), CodecError> {
        match self.buf.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

pub(crate) fn put_values(buf: &mut BytesMut, values: &[f32], encoding: VectorEncoding) {
    match encoding {
        VectorEncoding::Float32 => {
            for v in values {
                buf.put_f32_le(*v);
            }
        }
        VectorEncoding::Float64 => {
            for v in values {
                buf.put_f64_le(f64::from(*v));
            }
        }
    }
}

pub(crate) fn len_u32(len: usize, what: &str) -> Result<u32, CodecError> {
    u32::try_from(len).map_err(|_| CodecError::InvalidField(format!("{what} length {len} exceeds u32")))
}

pub(crate) fn len_u16(len: usize, what: &str) -> Result<u16, CodecError> {
    u16::try_from(len).map_err(|_| CodecError::InvalidField(format!("{what} length {len} exceeds u16")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_reports_section_on_truncation() {
        let data = [1u8, 0];
        let mut reader = WireReader::new(&data);
        let err = reader.u32("header").unwrap_err();
        assert!(matches!(
            err,
            CodecError::Truncated { section: "header", needed: 4, available: 2 }
        ));
    }

    #[test]
    fn forged_count_does_not_allocate() {
        let data = [0u8; 8];
        let mut reader = WireReader::new(&data);
        let err = reader
            .values(usize::MAX / 2, VectorEncoding::Float64, "primary_vector")
            .unwrap_err();
        assert!(matches!(err, CodecError::Truncated { .. }));
    }

    #[test]
    fn float64_widening_is_lossless() {
        let values = vec![0.1f32, -3.5, f32::MIN_POSITIVE, 1.0e30];
        let mut buf = BytesMut::new();
        put_values(&mut buf, &values, VectorEncoding::Float64);
        assert_eq!(buf.len(), values.len() * 8);

        let mut reader = WireReader::new(&buf);
        let decoded = reader
            .values(values.len(), VectorEncoding::Float64, "test")
            .unwrap();
        for (a, b) in values.iter().zip(&decoded) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        reader.finish().unwrap();
    }

    #[test]
    fn finish_rejects_leftovers() {
        let data = [0u8; 3];
        let mut reader = WireReader::new(&data);
        reader.u8("x").unwrap();
        assert!(matches!(reader.finish(), Err(CodecError::TrailingBytes(2))));
    }
}
