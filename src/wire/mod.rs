//! DECT-2020 NR MAC wire formats
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte
//
// ETSI TS 103 636-4, all multi-octet fields are big-endian.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{DecodeError, DecodeErrorKind, EncodeError};

pub mod header_type;
pub use header_type::{HeaderKind, MacHeaderType, Security};

pub mod common;
pub use common::{BeaconHeader, CommonHeader, DataPduHeader, RdBroadcastHeader, UnicastHeader};

pub mod beacon;
pub use beacon::{ClusterBeaconMessage, ClusterBeaconPeriod, NetworkBeaconMessage, NetworkBeaconPeriod};

pub mod association;
pub use association::{AssociationReleaseMessage, AssociationRequestMessage, AssociationResponseMessage};

pub mod ie;
pub use ie::{AssociationControlIe, RandomAccessResourceIe, RdCapabilityIe};

pub mod mux;
pub use mux::{IeType, MacExt, MuxHeader};

pub mod phy_control;
pub use phy_control::{PhyControlField, PhyControlFieldType1, PhyControlFieldType2};

pub mod pdu;
pub use pdu::{Ie, MacPdu};

/// Binary codec shared by every header, message and IE
pub trait Wire: Sized {
    /// Name used when reporting decode errors
    const NAME: &'static str;

    /// Number of octets `encode` will write
    fn encoded_len(&self) -> usize;

    /// Encode into the start of `buf`, returning the number of octets written
    fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError>;

    /// Decode from the start of `buf`, returning the object and octets consumed
    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError>;

    /// Decode requiring `buf` to be consumed in full
    fn decode_exact(buf: &[u8]) -> Result<Self, DecodeError> {
        let (v, n) = Self::decode(buf)?;
        if n != buf.len() {
            return Err(DecodeError {
                field: Self::NAME,
                offset: n,
                kind: DecodeErrorKind::TrailingBytes(buf.len() - n),
            });
        }
        Ok(v)
    }
}

/// Mask for 13-bit absolute channel numbers carried in two octets
pub const CHANNEL_MASK: u16 = 0x1FFF;

/// Bounds-checked big-endian reader, tracks the offset for error reporting
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn take(&mut self, field: &'static str, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::truncated(field, self.offset, n, self.remaining()));
        }
        let buf: &'a [u8] = self.buf;
        let b = &buf[self.offset..self.offset + n];
        self.offset += n;
        Ok(b)
    }

    pub fn u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(field, 1)?[0])
    }

    pub fn u16(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        Ok(BigEndian::read_u16(self.take(field, 2)?))
    }

    pub fn u24(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        Ok(BigEndian::read_u24(self.take(field, 3)?))
    }

    pub fn u32(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        Ok(BigEndian::read_u32(self.take(field, 4)?))
    }

    /// 13-bit channel number, reserved high bits ignored
    pub fn channel(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        Ok(self.u16(field)? & CHANNEL_MASK)
    }

    /// Look up a closed enumerator, failing on unknown codes
    pub fn code<T>(&self, field: &'static str, code: u8, f: fn(u8) -> Option<T>) -> Result<T, DecodeError> {
        // Offset of the octet the code was read from
        let at = self.offset.saturating_sub(1);
        f(code).ok_or(DecodeError::unknown(field, at, code))
    }
}

/// Bounds-checked big-endian writer
pub(crate) struct Writer<'a> {
    buf: &'a mut [u8],
    offset: usize,
}

impl<'a> Writer<'a> {
    /// Create a writer, checking up front that `needed` octets fit
    pub fn new(buf: &'a mut [u8], needed: usize) -> Result<Self, EncodeError> {
        if buf.len() < needed {
            return Err(EncodeError::BufferTooSmall { needed, available: buf.len() });
        }
        Ok(Self { buf, offset: 0 })
    }

    fn reserve(&mut self, n: usize) -> Result<&mut [u8], EncodeError> {
        let available = self.buf.len() - self.offset;
        if available < n {
            return Err(EncodeError::BufferTooSmall { needed: self.offset + n, available: self.buf.len() });
        }
        let b = &mut self.buf[self.offset..self.offset + n];
        self.offset += n;
        Ok(b)
    }

    pub fn u8(&mut self, v: u8) -> Result<(), EncodeError> {
        self.reserve(1)?[0] = v;
        Ok(())
    }

    pub fn u16(&mut self, v: u16) -> Result<(), EncodeError> {
        BigEndian::write_u16(self.reserve(2)?, v);
        Ok(())
    }

    pub fn u24(&mut self, v: u32) -> Result<(), EncodeError> {
        BigEndian::write_u24(self.reserve(3)?, v & 0x00FF_FFFF);
        Ok(())
    }

    pub fn u32(&mut self, v: u32) -> Result<(), EncodeError> {
        BigEndian::write_u32(self.reserve(4)?, v);
        Ok(())
    }

    pub fn channel(&mut self, v: u16) -> Result<(), EncodeError> {
        self.u16(v & CHANNEL_MASK)
    }

    pub fn bytes(&mut self, v: &[u8]) -> Result<(), EncodeError> {
        self.reserve(v.len())?.copy_from_slice(v);
        Ok(())
    }

    /// Hand a sub-slice to a nested encoder and advance past what it wrote
    pub fn nested<T: Wire>(&mut self, v: &T) -> Result<(), EncodeError> {
        self.nested_with(|b| v.encode(b))
    }

    pub fn nested_with<F>(&mut self, f: F) -> Result<(), EncodeError>
    where
        F: FnOnce(&mut [u8]) -> Result<usize, EncodeError>,
    {
        let n = f(&mut self.buf[self.offset..])?;
        self.offset += n;
        Ok(())
    }

    pub fn finish(self) -> usize {
        self.offset
    }
}
