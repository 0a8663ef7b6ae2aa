use crate::Document;

/// Outcome of a write dispatched with
/// [`Connector::say`](crate::Connector::say).
///
/// Only acknowledged writes carry trustworthy fields; an unacknowledged
/// result merely states that the message left this process.
#[derive(Clone, Debug)]
pub struct WriteResult {
    acknowledged: bool,
    ok: bool,
    err: Option<String>,
    code: Option<i32>,
    n: i64,
}

impl WriteResult {
    pub(crate) fn unacknowledged() -> Self {
        Self {
            acknowledged: false,
            ok: true,
            err: None,
            code: None,
            n: 0,
        }
    }

    // The in-band stand-in for a swallowed network error.
    pub(crate) fn network_error() -> Self {
        Self {
            acknowledged: false,
            ok: false,
            err: Some("NETWORK ERROR".to_string()),
            code: None,
            n: 0,
        }
    }

    pub(crate) fn from_acknowledgement(ack: &Document) -> Self {
        Self {
            acknowledged: true,
            ok: ack.is_ok(),
            err: ack.get_str("err").map(ToString::to_string),
            code: ack.get_i32("code"),
            n: ack.get_i64("n").unwrap_or(0),
        }
    }

    /// True if the server confirmed the write.
    pub fn acknowledged(&self) -> bool {
        self.acknowledged
    }

    pub fn ok(&self) -> bool {
        self.ok
    }

    pub fn err(&self) -> Option<&str> {
        self.err.as_deref()
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// Number of documents the write touched, when acknowledged.
    pub fn n(&self) -> i64 {
        self.n
    }
}
