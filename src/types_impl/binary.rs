/// Subtype marker of a Binary element.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinarySubtype {
    /// General-purpose bytes; the payload is the element's total length.
    Generic,
    /// Old-style binary with a redundant inner length prefix.
    LegacyBinary,
    /// A 16-byte UUID.
    Uuid,
    /// Any other subtype byte; the payload is kept opaque.
    Other(u8),
}

impl BinarySubtype {
    pub fn from_u8(byte: u8) -> Self {
        match byte {
            0x00 => Self::Generic,
            0x02 => Self::LegacyBinary,
            0x03 => Self::Uuid,
            byte => Self::Other(byte),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Generic => 0x00,
            Self::LegacyBinary => 0x02,
            Self::Uuid => 0x03,
            Self::Other(byte) => byte,
        }
    }
}

/// Payload of a Binary element.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Binary {
    subtype: BinarySubtype,
    data: Vec<u8>,
}

impl Binary {
    pub fn new(subtype: BinarySubtype, data: Vec<u8>) -> Self {
        Self { subtype, data }
    }

    /// General-purpose bytes (subtype 0x00).
    pub fn generic(data: Vec<u8>) -> Self {
        Self::new(BinarySubtype::Generic, data)
    }

    /// A UUID (subtype 0x03).
    pub fn uuid(data: [u8; 16]) -> Self {
        Self::new(BinarySubtype::Uuid, data.to_vec())
    }

    pub fn subtype(&self) -> BinarySubtype {
        self.subtype
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
