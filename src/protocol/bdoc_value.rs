use crate::{
    protocol::{
        document::{emit_cstring, emit_utf8},
        Document, TypeId,
    },
    types::{Binary, BinarySubtype, DateTime, ObjectId},
};
use byteorder::{LittleEndian, WriteBytesExt};

/// Enum for all element types of the BDOC format.
#[allow(non_camel_case_types)]
#[derive(Clone, Debug, PartialEq)]
pub enum BdocValue {
    /// Stores a double-precision 64-bit floating-point number.
    DOUBLE(f64),
    /// Stores UTF-8 text.
    STRING(String),
    /// Stores a nested document.
    OBJECT(Document),
    /// Stores an ordered list; transported as a nested document with
    /// keys "0", "1", ...
    ARRAY(Vec<BdocValue>),
    /// Stores subtyped binary data.
    BINARY(Binary),
    /// Representation of an explicitly undefined value.
    UNDEFINED,
    /// Stores a 12-byte document id.
    OBJECT_ID(ObjectId),
    /// Stores TRUE or FALSE.
    BOOLEAN(bool),
    /// Stores a point in time with millisecond precision.
    DATE(DateTime),
    /// Representation of a database NULL value.
    NULL,
    /// Stores a regular expression as pattern and option letters.
    REGEX {
        pattern: String,
        options: String,
    },
    /// Stores a reference to a document in another namespace.
    DB_REF {
        ns: String,
        id: ObjectId,
    },
    /// Stores server-side code.
    CODE(String),
    /// Stores an interned symbol.
    SYMBOL(String),
    /// Stores server-side code together with its scope document.
    CODE_WITH_SCOPE {
        code: String,
        scope: Document,
    },
    /// Stores a 32-bit signed integer.
    INT(i32),
    /// Stores an internal timestamp: a counter within a second.
    TIMESTAMP {
        increment: i32,
        seconds: i32,
    },
    /// Stores a 64-bit signed integer.
    BIGINT(i64),
    /// The smallest possible key.
    MINKEY,
    /// The largest possible key.
    MAXKEY,
}

impl BdocValue {
    pub fn type_id(&self) -> TypeId {
        match *self {
            BdocValue::DOUBLE(_) => TypeId::DOUBLE,
            BdocValue::STRING(_) => TypeId::STRING,
            BdocValue::OBJECT(_) => TypeId::OBJECT,
            BdocValue::ARRAY(_) => TypeId::ARRAY,
            BdocValue::BINARY(_) => TypeId::BINARY,
            BdocValue::UNDEFINED => TypeId::UNDEFINED,
            BdocValue::OBJECT_ID(_) => TypeId::OBJECT_ID,
            BdocValue::BOOLEAN(_) => TypeId::BOOLEAN,
            BdocValue::DATE(_) => TypeId::DATE,
            BdocValue::NULL => TypeId::NULL,
            BdocValue::REGEX { .. } => TypeId::REGEX,
            BdocValue::DB_REF { .. } => TypeId::DB_REF,
            BdocValue::CODE(_) => TypeId::CODE,
            BdocValue::SYMBOL(_) => TypeId::SYMBOL,
            BdocValue::CODE_WITH_SCOPE { .. } => TypeId::CODE_WITH_SCOPE,
            BdocValue::INT(_) => TypeId::INT,
            BdocValue::TIMESTAMP { .. } => TypeId::TIMESTAMP,
            BdocValue::BIGINT(_) => TypeId::BIGINT,
            BdocValue::MINKEY => TypeId::MINKEY,
            BdocValue::MAXKEY => TypeId::MAXKEY,
        }
    }

    /// Returns true if the value is a NULL value.
    pub fn is_null(&self) -> bool {
        matches!(*self, BdocValue::NULL)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BdocValue::STRING(s) | BdocValue::CODE(s) | BdocValue::SYMBOL(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            BdocValue::BOOLEAN(b) => Some(b),
            _ => None,
        }
    }

    /// Numeric access with the usual widening/narrowing coercions.
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            BdocValue::INT(i) => Some(i),
            BdocValue::BIGINT(i) => i32::try_from(i).ok(),
            BdocValue::DOUBLE(f) => Some(f as i32),
            _ => None,
        }
    }

    /// Numeric access with the usual widening/narrowing coercions.
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            BdocValue::INT(i) => Some(i64::from(i)),
            BdocValue::BIGINT(i) => Some(i),
            BdocValue::DOUBLE(f) => Some(f as i64),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            BdocValue::DOUBLE(f) => Some(f),
            BdocValue::INT(i) => Some(f64::from(i)),
            BdocValue::BIGINT(i) => Some(i as f64),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            BdocValue::OBJECT(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[BdocValue]> {
        match self {
            BdocValue::ARRAY(items) => Some(items),
            _ => None,
        }
    }

    // Writes the payload; type byte and element name are the document's job.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write) -> std::io::Result<()> {
        match *self {
            BdocValue::DOUBLE(f) => w.write_f64::<LittleEndian>(f)?,
            BdocValue::STRING(ref s) | BdocValue::CODE(ref s) | BdocValue::SYMBOL(ref s) => {
                emit_utf8(s, w)?;
            }
            BdocValue::OBJECT(ref doc) => doc.emit(w)?,
            BdocValue::ARRAY(ref items) => {
                let mut doc = Document::new();
                for (i, item) in items.iter().enumerate() {
                    doc.push(i.to_string(), item.clone());
                }
                doc.emit(w)?;
            }
            BdocValue::BINARY(ref binary) => emit_binary(binary, w)?,
            BdocValue::UNDEFINED
            | BdocValue::NULL
            | BdocValue::MINKEY
            | BdocValue::MAXKEY => {}
            BdocValue::OBJECT_ID(ref oid) => emit_object_id(oid, w)?,
            BdocValue::BOOLEAN(b) => w.write_u8(u8::from(b))?,
            BdocValue::DATE(dt) => w.write_i64::<LittleEndian>(dt.millis())?,
            BdocValue::REGEX {
                ref pattern,
                ref options,
            } => {
                emit_cstring(pattern, w)?;
                emit_cstring(options, w)?;
            }
            BdocValue::DB_REF { ref ns, ref id } => {
                w.write_i32::<LittleEndian>(ns.len() as i32 + 1)?;
                emit_cstring(ns, w)?;
                emit_object_id(id, w)?;
            }
            BdocValue::CODE_WITH_SCOPE {
                ref code,
                ref scope,
            } => {
                let mut inner = Vec::new();
                emit_utf8(code, &mut inner)?;
                scope.emit(&mut inner)?;
                w.write_i32::<LittleEndian>(inner.len() as i32 + 4)?;
                w.write_all(&inner)?;
            }
            BdocValue::INT(i) => w.write_i32::<LittleEndian>(i)?,
            BdocValue::TIMESTAMP { increment, seconds } => {
                w.write_i32::<LittleEndian>(increment)?;
                w.write_i32::<LittleEndian>(seconds)?;
            }
            BdocValue::BIGINT(i) => w.write_i64::<LittleEndian>(i)?,
        }
        Ok(())
    }
}

fn emit_object_id(oid: &ObjectId, w: &mut dyn std::io::Write) -> std::io::Result<()> {
    w.write_i32::<LittleEndian>(oid.time())?;
    w.write_i32::<LittleEndian>(oid.machine())?;
    w.write_i32::<LittleEndian>(oid.inc())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn emit_binary(binary: &Binary, w: &mut dyn std::io::Write) -> std::io::Result<()> {
    let data = binary.data();
    match binary.subtype() {
        BinarySubtype::LegacyBinary => {
            // redundant inner length, included in the total
            w.write_i32::<LittleEndian>(data.len() as i32 + 4)?;
            w.write_u8(BinarySubtype::LegacyBinary.to_u8())?;
            w.write_i32::<LittleEndian>(data.len() as i32)?;
        }
        BinarySubtype::Uuid => {
            if data.len() != 16 {
                return Err(std::io::Error::other("a UUID payload has 16 bytes"));
            }
            w.write_i32::<LittleEndian>(16)?;
            w.write_u8(BinarySubtype::Uuid.to_u8())?;
        }
        subtype => {
            w.write_i32::<LittleEndian>(data.len() as i32)?;
            w.write_u8(subtype.to_u8())?;
        }
    }
    w.write_all(data)
}

impl From<f64> for BdocValue {
    fn from(f: f64) -> Self {
        BdocValue::DOUBLE(f)
    }
}
impl From<i32> for BdocValue {
    fn from(i: i32) -> Self {
        BdocValue::INT(i)
    }
}
impl From<i64> for BdocValue {
    fn from(i: i64) -> Self {
        BdocValue::BIGINT(i)
    }
}
impl From<bool> for BdocValue {
    fn from(b: bool) -> Self {
        BdocValue::BOOLEAN(b)
    }
}
impl From<&str> for BdocValue {
    fn from(s: &str) -> Self {
        BdocValue::STRING(s.to_string())
    }
}
impl From<String> for BdocValue {
    fn from(s: String) -> Self {
        BdocValue::STRING(s)
    }
}
impl From<Document> for BdocValue {
    fn from(doc: Document) -> Self {
        BdocValue::OBJECT(doc)
    }
}
impl From<Vec<BdocValue>> for BdocValue {
    fn from(items: Vec<BdocValue>) -> Self {
        BdocValue::ARRAY(items)
    }
}
impl From<ObjectId> for BdocValue {
    fn from(oid: ObjectId) -> Self {
        BdocValue::OBJECT_ID(oid)
    }
}
impl From<DateTime> for BdocValue {
    fn from(dt: DateTime) -> Self {
        BdocValue::DATE(dt)
    }
}
impl From<Binary> for BdocValue {
    fn from(binary: Binary) -> Self {
        BdocValue::BINARY(binary)
    }
}
