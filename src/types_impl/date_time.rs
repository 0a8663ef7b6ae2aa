use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// A point in time as transported in the Date element:
/// milliseconds since the Unix epoch, timezone-agnostic.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DateTime(i64);

impl DateTime {
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn millis(&self) -> i64 {
        self.0
    }

    /// Conversion into a calendar representation.
    ///
    /// Returns `None` for values outside the range `time` can represent.
    pub fn to_offset_date_time(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0) * 1_000_000).ok()
    }
}

impl std::fmt::Display for DateTime {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self
            .to_offset_date_time()
            .and_then(|odt| odt.format(&Rfc3339).ok())
        {
            Some(formatted) => write!(fmt, "{formatted}"),
            None => write!(fmt, "{}ms", self.0),
        }
    }
}
