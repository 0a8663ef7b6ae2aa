use crate::{usage_err, BdocError, BdocResult};

/// A 12-byte document id, transported on the wire as three 32-bit words
/// (creation time, machine, counter).
///
/// The canonical text form is 24 lowercase hex digits over the big-endian
/// byte representation of the three words.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ObjectId {
    time: i32,
    machine: i32,
    inc: i32,
}

impl ObjectId {
    pub fn new(time: i32, machine: i32, inc: i32) -> Self {
        Self { time, machine, inc }
    }

    /// Seconds since the epoch at which the id was generated.
    pub fn time(&self) -> i32 {
        self.time
    }

    /// Machine discriminator word.
    pub fn machine(&self) -> i32 {
        self.machine
    }

    /// Per-machine counter word.
    pub fn inc(&self) -> i32 {
        self.inc
    }

    /// The canonical 12-byte representation.
    pub fn to_bytes(&self) -> [u8; 12] {
        let mut bytes = [0_u8; 12];
        bytes[0..4].copy_from_slice(&self.time.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.machine.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.inc.to_be_bytes());
        bytes
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self {
            time: i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            machine: i32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            inc: i32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        }
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{}", hex::encode(self.to_bytes()))
    }
}

impl std::str::FromStr for ObjectId {
    type Err = BdocError;

    fn from_str(s: &str) -> BdocResult<Self> {
        let raw = hex::decode(s).map_err(|e| usage_err!("not a valid object id: {e}"))?;
        let bytes: [u8; 12] = raw
            .try_into()
            .map_err(|_| usage_err!("an object id has 24 hex digits"))?;
        Ok(Self::from_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::ObjectId;

    #[test]
    fn hex_round_trip() {
        let oid = ObjectId::new(0x1122_3344, 0x5566_7788_u32 as i32, 0x0102_0304);
        let text = oid.to_string();
        assert_eq!(text, "112233445566778801020304");
        assert_eq!(text.parse::<ObjectId>().unwrap(), oid);
    }

    #[test]
    fn bad_text_is_rejected() {
        assert!("11223344".parse::<ObjectId>().is_err());
        assert!("zz2233445566778801020304".parse::<ObjectId>().is_err());
    }
}
