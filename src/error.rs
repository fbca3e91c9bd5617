
use crate::ChannelId;

/// Reason a buffer could not be decoded
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeErrorKind {
    /// Buffer ended before the field was complete
    Truncated { needed: usize, available: usize },
    /// Enumerated field holds a code outside its closed set
    UnknownCode(u8),
    /// Field value is not permitted in this position
    InvalidValue(u32),
    /// Bytes left over after a length-implied SDU was decoded
    TrailingBytes(usize),
}

/// Decode failure identifying the offending field and its byte offset
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DecodeError {
    pub field: &'static str,
    pub offset: usize,
    pub kind: DecodeErrorKind,
}

impl DecodeError {
    pub fn truncated(field: &'static str, offset: usize, needed: usize, available: usize) -> Self {
        Self { field, offset, kind: DecodeErrorKind::Truncated { needed, available } }
    }

    pub fn unknown(field: &'static str, offset: usize, code: u8) -> Self {
        Self { field, offset, kind: DecodeErrorKind::UnknownCode(code) }
    }

    pub fn invalid(field: &'static str, offset: usize, value: u32) -> Self {
        Self { field, offset, kind: DecodeErrorKind::InvalidValue(value) }
    }

    /// Shift the reported offset when a nested decoder ran on a sub-slice
    pub fn at(mut self, base: usize) -> Self {
        self.offset += base;
        self
    }
}

/// Encode failure
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    BufferTooSmall { needed: usize, available: usize },
    /// Too many elements to fit the frame or its count field
    TooManyElements,
}

/// Channel manager errors
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelError {
    /// Channel is not managed (configuration error)
    InvalidChannelId(ChannelId),
    /// No contiguous free run within the search horizon
    NoResourceAvailable,
    /// Requested run length or subslot does not exist in this configuration
    InvalidSubslot,
    /// Bounded reservation table has no room
    TableFull,
}

/// MAC errors
#[derive(Debug, Clone, PartialEq)]
pub enum CoreError<E> {
    /// Decoding error
    Decode(DecodeError),

    /// Encoding error
    Encode(EncodeError),

    /// Channel manager error other than exhaustion / invalid channel
    Channel(ChannelError),

    /// Channel scheduling exhaustion
    NoResourceAvailable,

    /// Expected response not received in time
    ProtocolTimeout,

    /// Channel not handled by this device
    InvalidChannelId(ChannelId),

    /// Bounded table or queue full
    BufferFull,

    /// Identifiers or limits in the MAC configuration are not permitted
    InvalidConfig,

    /// Wrapper for underlying PHY errors
    Phy(E),
}

impl<E> From<DecodeError> for CoreError<E> {
    fn from(e: DecodeError) -> Self {
        CoreError::Decode(e)
    }
}

impl<E> From<EncodeError> for CoreError<E> {
    fn from(e: EncodeError) -> Self {
        CoreError::Encode(e)
    }
}

impl<E> From<ChannelError> for CoreError<E> {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::NoResourceAvailable => CoreError::NoResourceAvailable,
            ChannelError::InvalidChannelId(c) => CoreError::InvalidChannelId(c),
            ChannelError::TableFull => CoreError::BufferFull,
            e => CoreError::Channel(e),
        }
    }
}
