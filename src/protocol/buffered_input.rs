use crate::DecodeError;
use byteorder::{ByteOrder, LittleEndian};

const INITIAL_CAPACITY: usize = 1024;
const MAX_READAHEAD: usize = 512;

lazy_static! {
    // Singleton strings for one-byte element names; single-letter keys
    // dominate real-world documents.
    static ref ASCII_NAMES: Vec<String> = (0_u8..128)
        .map(|b| char::from(b).to_string())
        .collect();
}

/// A windowed read-ahead buffer over one BDOC document.
///
/// Construction consumes the document's 4-byte outer length from the source;
/// all subsequent reads are bounded by that length, so several documents can
/// sit back to back on one stream without the buffer stealing bytes from the
/// next one.
pub struct BufferedInput<'a> {
    source: &'a mut dyn std::io::Read,
    buf: Vec<u8>,
    // window cursor and filled end; invariant 0 <= o <= l <= buf.len()
    o: usize,
    l: usize,
    // bytes drained past `o` since construction
    read: usize,
    // declared outer length of the document, including its own four bytes
    length: usize,
}

impl<'a> BufferedInput<'a> {
    pub fn new(source: &'a mut dyn std::io::Read) -> Result<Self, DecodeError> {
        let mut len_bytes = [0_u8; 4];
        source.read_exact(&mut len_bytes).map_err(map_eof)?;
        let length = LittleEndian::read_i32(&len_bytes);
        if length < 5 {
            return Err(DecodeError::BadLength(format!(
                "declared document length {length}"
            )));
        }
        #[allow(clippy::cast_sign_loss)]
        let length = length as usize;
        Ok(Self {
            source,
            buf: vec![0; INITIAL_CAPACITY],
            o: 0,
            l: 0,
            read: 4,
            length,
        })
    }

    /// The declared outer length of the document.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Total bytes consumed since construction, the outer length included.
    pub fn bytes_read(&self) -> usize {
        self.read + self.o
    }

    /// Guarantees that the next `n` bytes are present contiguously in the
    /// buffer. Compacts and grows the buffer as needed; reads ahead at most
    /// `MAX_READAHEAD` bytes and never past the document's declared end.
    pub fn ensure_contiguous(&mut self, n: usize) -> Result<(), DecodeError> {
        if self.l - self.o >= n {
            return Ok(());
        }
        self.buf.copy_within(self.o..self.l, 0);
        self.read += self.o;
        self.l -= self.o;
        self.o = 0;
        if self.buf.len() < n + MAX_READAHEAD {
            self.buf.resize(n + MAX_READAHEAD, 0);
        }
        while self.l < n {
            let remaining = self.length.saturating_sub(self.read + self.l);
            if self.l + remaining < n {
                return Err(DecodeError::UnexpectedEof);
            }
            let end = (self.l + MAX_READAHEAD.min(remaining))
                .min(self.buf.len())
                .max(n);
            let got = self.source.read(&mut self.buf[self.l..end])?;
            if got == 0 {
                return Err(DecodeError::UnexpectedEof);
            }
            self.l += got;
        }
        Ok(())
    }

    pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
        self.ensure_contiguous(1)?;
        let byte = self.buf[self.o];
        self.o += 1;
        Ok(byte)
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        self.ensure_contiguous(4)?;
        let value = LittleEndian::read_i32(&self.buf[self.o..]);
        self.o += 4;
        Ok(value)
    }

    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        self.ensure_contiguous(8)?;
        let value = LittleEndian::read_i64(&self.buf[self.o..]);
        self.o += 8;
        Ok(value)
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        self.ensure_contiguous(8)?;
        let value = LittleEndian::read_f64(&self.buf[self.o..]);
        self.o += 8;
        Ok(value)
    }

    /// Fills `dst` completely, draining the buffer first and reading the
    /// remainder directly from the source.
    pub fn fill(&mut self, dst: &mut [u8]) -> Result<(), DecodeError> {
        let buffered = (self.l - self.o).min(dst.len());
        dst[..buffered].copy_from_slice(&self.buf[self.o..self.o + buffered]);
        self.o += buffered;
        let direct = dst.len() - buffered;
        if direct > 0 {
            if self.length.saturating_sub(self.bytes_read()) < direct {
                return Err(DecodeError::UnexpectedEof);
            }
            self.source.read_exact(&mut dst[buffered..]).map_err(map_eof)?;
            self.read += direct;
        }
        Ok(())
    }

    /// Reads a zero-terminated name. Empty and one-byte-ASCII names take a
    /// fast path through the singleton cache.
    pub fn read_cstring(&mut self) -> Result<String, DecodeError> {
        let first = self.read_byte()?;
        if first == 0 {
            return Ok(String::new());
        }
        let second = self.read_byte()?;
        if second == 0 {
            if first < 128 {
                return Ok(ASCII_NAMES[first as usize].clone());
            }
            return bytes_to_string(vec![first]);
        }
        let mut bytes = vec![first, second];
        loop {
            let byte = self.read_byte()?;
            if byte == 0 {
                break;
            }
            bytes.push(byte);
        }
        bytes_to_string(bytes)
    }

    /// Reads a length-prefixed UTF-8 string: a positive 4-byte length `s`,
    /// then `s - 1` bytes of text, then a zero byte.
    pub fn read_utf8_len(&mut self) -> Result<String, DecodeError> {
        let declared = self.read_i32()?;
        if declared < 1 || declared > crate::MAX_STRING_LENGTH {
            return Err(DecodeError::BadLength(format!(
                "string length {declared}"
            )));
        }
        #[allow(clippy::cast_sign_loss)]
        let declared = declared as usize;
        self.ensure_contiguous(declared)?;
        let text = std::str::from_utf8(&self.buf[self.o..self.o + declared - 1])?.to_string();
        self.o += declared;
        Ok(text)
    }
}

impl std::fmt::Debug for BufferedInput<'_> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("BufferedInput")
            .field("o", &self.o)
            .field("l", &self.l)
            .field("read", &self.read)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

fn bytes_to_string(bytes: Vec<u8>) -> Result<String, DecodeError> {
    String::from_utf8(bytes).map_err(|e| DecodeError::Utf8 {
        source: e.utf8_error(),
    })
}

fn map_eof(error: std::io::Error) -> DecodeError {
    if error.kind() == std::io::ErrorKind::UnexpectedEof {
        DecodeError::UnexpectedEof
    } else {
        DecodeError::Io { source: error }
    }
}
