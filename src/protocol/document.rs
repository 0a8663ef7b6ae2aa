use crate::{protocol::decode, BdocResult, BdocValue};
use byteorder::{LittleEndian, WriteBytesExt};

/// An ordered BDOC document: a sequence of named elements.
///
/// Element order is preserved on the wire and on re-emission; lookups by name
/// scan the sequence, which is the right trade-off for the small documents
/// that commands and acknowledgements consist of.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    elements: Vec<(String, BdocValue)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an element; accepts anything convertible into a [`BdocValue`].
    pub fn push<N: Into<String>, V: Into<BdocValue>>(&mut self, name: N, value: V) -> &mut Self {
        self.elements.push((name.into(), value.into()));
        self
    }

    /// Builder-style variant of [`push`](Self::push).
    #[must_use]
    pub fn with<N: Into<String>, V: Into<BdocValue>>(mut self, name: N, value: V) -> Self {
        self.push(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&BdocValue> {
        self.elements
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(BdocValue::as_str)
    }

    pub fn get_i32(&self, name: &str) -> Option<i32> {
        self.get(name).and_then(BdocValue::as_i32)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(BdocValue::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(BdocValue::as_f64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(BdocValue::as_bool)
    }

    pub fn get_document(&self, name: &str) -> Option<&Document> {
        self.get(name).and_then(BdocValue::as_document)
    }

    pub fn get_array(&self, name: &str) -> Option<&[BdocValue]> {
        self.get(name).and_then(BdocValue::as_array)
    }

    /// True if the element exists and is neither NULL nor UNDEFINED.
    pub fn has_value(&self, name: &str) -> bool {
        matches!(
            self.get(name),
            Some(v) if !matches!(v, BdocValue::NULL | BdocValue::UNDEFINED)
        )
    }

    /// The `ok` convention of command replies: numeric field `ok` is nonzero.
    #[allow(clippy::float_cmp)]
    pub fn is_ok(&self) -> bool {
        self.get_f64("ok").unwrap_or(0.0) != 0.0
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (String, BdocValue)> {
        self.elements.iter()
    }

    /// Serializes the document into its framed wire form.
    pub fn to_bytes(&self) -> BdocResult<Vec<u8>> {
        let mut bytes = Vec::new();
        self.emit(&mut bytes)
            .map_err(|e| crate::impl_err!("document serialization failed: {e}"))?;
        Ok(bytes)
    }

    /// Parses one framed document from a byte slice.
    pub fn from_bytes(mut bytes: &[u8]) -> BdocResult<Self> {
        Self::from_reader(&mut bytes)
    }

    /// Parses one framed document from a byte source.
    pub fn from_reader(rdr: &mut dyn std::io::Read) -> BdocResult<Self> {
        decode::parse_document(rdr)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write) -> std::io::Result<()> {
        let mut body = Vec::new();
        for (name, value) in &self.elements {
            body.write_u8(value.type_id().to_u8())?;
            emit_cstring(name, &mut body)?;
            value.emit(&mut body)?;
        }
        body.push(0);
        w.write_i32::<LittleEndian>(body.len() as i32 + 4)?;
        w.write_all(&body)
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = &'a (String, BdocValue);
    type IntoIter = std::slice::Iter<'a, (String, BdocValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub(crate) fn emit_cstring(s: &str, w: &mut dyn std::io::Write) -> std::io::Result<()> {
    if s.as_bytes().contains(&0) {
        return Err(std::io::Error::other("element name contains a NUL byte"));
    }
    w.write_all(s.as_bytes())?;
    w.write_u8(0)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub(crate) fn emit_utf8(s: &str, w: &mut dyn std::io::Write) -> std::io::Result<()> {
    w.write_i32::<LittleEndian>(s.len() as i32 + 1)?;
    w.write_all(s.as_bytes())?;
    w.write_u8(0)
}
