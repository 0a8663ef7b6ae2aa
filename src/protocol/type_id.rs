/// Type byte of a BDOC element.
///
/// The end-of-document marker (0x00) is not an element type and is handled
/// separately by the decoder.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TypeId {
    /// 8-byte little-endian float.
    DOUBLE = 0x01,
    /// Length-prefixed UTF-8 text.
    STRING = 0x02,
    /// Nested document.
    OBJECT = 0x03,
    /// Nested document with keys "0", "1", ...
    ARRAY = 0x04,
    /// Subtyped byte payload.
    BINARY = 0x05,
    /// No payload.
    UNDEFINED = 0x06,
    /// Three 32-bit words.
    OBJECT_ID = 0x07,
    /// One byte, nonzero = true.
    BOOLEAN = 0x08,
    /// Milliseconds since the epoch as i64.
    DATE = 0x09,
    /// No payload.
    NULL = 0x0A,
    /// Two zero-terminated strings: pattern and options.
    REGEX = 0x0B,
    /// Namespace plus object id.
    DB_REF = 0x0C,
    /// Length-prefixed UTF-8 code.
    CODE = 0x0D,
    /// Length-prefixed UTF-8 symbol.
    SYMBOL = 0x0E,
    /// Code plus a nested scope document.
    CODE_WITH_SCOPE = 0x0F,
    /// 32-bit little-endian integer.
    INT = 0x10,
    /// Two 32-bit words: increment, then seconds.
    TIMESTAMP = 0x11,
    /// 64-bit little-endian integer.
    BIGINT = 0x12,
    /// No payload; sorts below everything.
    MINKEY = 0xFF,
    /// No payload; sorts above everything.
    MAXKEY = 0x7F,
}

impl TypeId {
    /// Maps a wire byte to its element type; `None` for unknown bytes
    /// (the decoder turns that into an `UnsupportedType` error carrying
    /// the element name).
    pub fn try_new(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::DOUBLE),
            0x02 => Some(Self::STRING),
            0x03 => Some(Self::OBJECT),
            0x04 => Some(Self::ARRAY),
            0x05 => Some(Self::BINARY),
            0x06 => Some(Self::UNDEFINED),
            0x07 => Some(Self::OBJECT_ID),
            0x08 => Some(Self::BOOLEAN),
            0x09 => Some(Self::DATE),
            0x0A => Some(Self::NULL),
            0x0B => Some(Self::REGEX),
            0x0C => Some(Self::DB_REF),
            0x0D => Some(Self::CODE),
            0x0E => Some(Self::SYMBOL),
            0x0F => Some(Self::CODE_WITH_SCOPE),
            0x10 => Some(Self::INT),
            0x11 => Some(Self::TIMESTAMP),
            0x12 => Some(Self::BIGINT),
            0xFF => Some(Self::MINKEY),
            0x7F => Some(Self::MAXKEY),
            _ => None,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}
