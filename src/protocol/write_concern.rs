use crate::Document;

/// Degree of acknowledgement requested for write operations.
///
/// `w < 0` fires and forgets, swallowing even network errors into a synthetic
/// [`WriteResult`](crate::WriteResult). `w == 0` sends without asking for
/// acknowledgement but surfaces network errors. `w > 0` confirms every write
/// with the acknowledgement command on the same connection and waits for `w`
/// cluster members.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WriteConcern {
    w: i32,
    #[serde(default)]
    wtimeout_ms: u32,
    #[serde(default)]
    fsync: bool,
}

impl WriteConcern {
    /// Fire and forget; network errors are reported in-band.
    pub const NONE: WriteConcern = WriteConcern {
        w: -1,
        wtimeout_ms: 0,
        fsync: false,
    };
    /// No acknowledgement, but network errors are raised.
    pub const UNACKNOWLEDGED: WriteConcern = WriteConcern {
        w: 0,
        wtimeout_ms: 0,
        fsync: false,
    };
    /// Confirmed by the primary.
    pub const ACKNOWLEDGED: WriteConcern = WriteConcern {
        w: 1,
        wtimeout_ms: 0,
        fsync: false,
    };

    pub fn new(w: i32) -> Self {
        Self {
            w,
            wtimeout_ms: 0,
            fsync: false,
        }
    }

    /// Maximum milliseconds the server may spend waiting for replication.
    #[must_use]
    pub fn with_wtimeout(mut self, wtimeout_ms: u32) -> Self {
        self.wtimeout_ms = wtimeout_ms;
        self
    }

    /// Additionally ask the server to sync to disk before acknowledging.
    #[must_use]
    pub fn with_fsync(mut self) -> Self {
        self.fsync = true;
        self
    }

    pub fn w(&self) -> i32 {
        self.w
    }

    /// Whether a write under this concern is followed by the acknowledgement
    /// command.
    pub fn call_get_last_error(&self) -> bool {
        self.w > 0 || self.fsync
    }

    /// Whether network errors abort the write or are reported in-band.
    pub fn raises_network_errors(&self) -> bool {
        self.w >= 0
    }

    /// The acknowledgement command document.
    pub fn command(&self) -> Document {
        let mut command = Document::new();
        command.push("getlasterror", 1_i32);
        if self.w > 1 {
            command.push("w", self.w);
        }
        if self.wtimeout_ms > 0 {
            command.push("wtimeout", i64::from(self.wtimeout_ms));
        }
        if self.fsync {
            command.push("fsync", true);
        }
        command
    }
}

impl Default for WriteConcern {
    fn default() -> Self {
        Self::ACKNOWLEDGED
    }
}

#[cfg(test)]
mod tests {
    use super::WriteConcern;

    #[test]
    fn acknowledgement_levels() {
        assert!(!WriteConcern::NONE.call_get_last_error());
        assert!(!WriteConcern::NONE.raises_network_errors());
        assert!(!WriteConcern::UNACKNOWLEDGED.call_get_last_error());
        assert!(WriteConcern::UNACKNOWLEDGED.raises_network_errors());
        assert!(WriteConcern::ACKNOWLEDGED.call_get_last_error());
        assert!(WriteConcern::ACKNOWLEDGED.raises_network_errors());
        assert!(WriteConcern::NONE.with_fsync().call_get_last_error());
    }

    #[test]
    fn command_contents() {
        let command = WriteConcern::new(3).with_wtimeout(500).with_fsync().command();
        assert_eq!(command.get_i32("getlasterror"), Some(1));
        assert_eq!(command.get_i32("w"), Some(3));
        assert_eq!(command.get_i64("wtimeout"), Some(500));
        assert_eq!(command.get_bool("fsync"), Some(true));

        let plain = WriteConcern::ACKNOWLEDGED.command();
        assert!(!plain.contains_key("w"));
        assert!(!plain.contains_key("wtimeout"));
        assert!(!plain.contains_key("fsync"));
    }
}
