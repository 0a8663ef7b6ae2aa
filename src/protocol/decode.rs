use crate::{
    protocol::{BufferedInput, Document, TypeId},
    types::{Binary, BinarySubtype, DateTime, ObjectId},
    BdocResult, BdocValue, DecodeError,
};

/// One step of a streaming BDOC parse.
///
/// A document yields `ObjectStart { name: None }`, one event per element
/// (with nested documents, arrays and code scopes bracketed by their own
/// start/done pairs), and a final `ObjectDone`.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A document begins; `name` is `None` for the outermost one.
    ObjectStart { name: Option<String> },
    ObjectDone,
    /// An array begins; its elements arrive with names "0", "1", ...
    ArrayStart { name: String },
    ArrayDone,
    /// A code-with-scope element begins; the scope document's elements follow.
    ScopeStart { name: String, code: String },
    ScopeDone,
    /// A terminal element.
    Scalar { name: String, value: BdocValue },
}

#[derive(Clone, Copy, Debug)]
enum Frame {
    Object,
    Array,
    Scope,
}

/// A streaming parser for one BDOC document.
///
/// Finite and non-restartable: `next_event` yields `Ok(Some(_))` until the
/// outer end-of-document marker, then `Ok(None)` forever. The in-progress
/// parse *is* this value, so a second concurrent decode of the same input
/// cannot be expressed.
#[derive(Debug)]
pub struct Decoder<'a> {
    input: BufferedInput<'a>,
    frames: Vec<Frame>,
    started: bool,
    finished: bool,
}

impl<'a> Decoder<'a> {
    /// Consumes the document's outer length field from `source`.
    pub fn new(source: &'a mut dyn std::io::Read) -> BdocResult<Self> {
        Ok(Self {
            input: BufferedInput::new(source)?,
            frames: Vec::new(),
            started: false,
            finished: false,
        })
    }

    /// Total bytes consumed from the source, the outer length included.
    pub fn bytes_read(&self) -> usize {
        self.input.bytes_read()
    }

    /// The document's declared outer length.
    pub fn declared_length(&self) -> usize {
        self.input.length()
    }

    pub fn next_event(&mut self) -> BdocResult<Option<Event>> {
        if self.finished {
            return Ok(None);
        }
        if !self.started {
            self.started = true;
            self.frames.push(Frame::Object);
            return Ok(Some(Event::ObjectStart { name: None }));
        }

        let type_byte = self.input.read_byte()?;
        if type_byte == 0 {
            let event = match self.frames.pop() {
                Some(Frame::Object) => Event::ObjectDone,
                Some(Frame::Array) => Event::ArrayDone,
                Some(Frame::Scope) => Event::ScopeDone,
                None => return Err(crate::impl_err!("end marker without an open document")),
            };
            if self.frames.is_empty() {
                self.finished = true;
                if self.input.bytes_read() != self.input.length() {
                    return Err(DecodeError::BadLength(format!(
                        "document declared {} bytes but held {}",
                        self.input.length(),
                        self.input.bytes_read()
                    ))
                    .into());
                }
            }
            return Ok(Some(event));
        }

        let name = self.input.read_cstring()?;
        let Some(type_id) = TypeId::try_new(type_byte) else {
            return Err(DecodeError::UnsupportedType { type_byte, name }.into());
        };
        let event = match type_id {
            TypeId::DOUBLE => scalar(name, BdocValue::DOUBLE(self.input.read_f64()?)),
            TypeId::STRING => scalar(name, BdocValue::STRING(self.input.read_utf8_len()?)),
            TypeId::OBJECT => {
                // the nested length is consumed but not validated against the
                // outer frame
                self.input.read_i32()?;
                self.frames.push(Frame::Object);
                Event::ObjectStart { name: Some(name) }
            }
            TypeId::ARRAY => {
                self.input.read_i32()?;
                self.frames.push(Frame::Array);
                Event::ArrayStart { name }
            }
            TypeId::BINARY => scalar(name, BdocValue::BINARY(self.read_binary()?)),
            TypeId::UNDEFINED => scalar(name, BdocValue::UNDEFINED),
            TypeId::OBJECT_ID => scalar(name, BdocValue::OBJECT_ID(self.read_object_id()?)),
            TypeId::BOOLEAN => scalar(name, BdocValue::BOOLEAN(self.input.read_byte()? != 0)),
            TypeId::DATE => scalar(
                name,
                BdocValue::DATE(DateTime::from_millis(self.input.read_i64()?)),
            ),
            TypeId::NULL => scalar(name, BdocValue::NULL),
            TypeId::REGEX => {
                let pattern = self.input.read_cstring()?;
                let options = self.input.read_cstring()?;
                scalar(name, BdocValue::REGEX { pattern, options })
            }
            TypeId::DB_REF => {
                self.input.read_i32()?; // string length of ns, redundant
                let ns = self.input.read_cstring()?;
                let id = self.read_object_id()?;
                scalar(name, BdocValue::DB_REF { ns, id })
            }
            TypeId::CODE => scalar(name, BdocValue::CODE(self.input.read_utf8_len()?)),
            TypeId::SYMBOL => scalar(name, BdocValue::SYMBOL(self.input.read_utf8_len()?)),
            TypeId::CODE_WITH_SCOPE => {
                self.input.read_i32()?; // total length, redundant
                let code = self.input.read_utf8_len()?;
                self.input.read_i32()?; // the scope document's own length
                self.frames.push(Frame::Scope);
                Event::ScopeStart { name, code }
            }
            TypeId::INT => scalar(name, BdocValue::INT(self.input.read_i32()?)),
            TypeId::TIMESTAMP => {
                let increment = self.input.read_i32()?;
                let seconds = self.input.read_i32()?;
                scalar(name, BdocValue::TIMESTAMP { increment, seconds })
            }
            TypeId::BIGINT => scalar(name, BdocValue::BIGINT(self.input.read_i64()?)),
            TypeId::MINKEY => scalar(name, BdocValue::MINKEY),
            TypeId::MAXKEY => scalar(name, BdocValue::MAXKEY),
        };
        Ok(Some(event))
    }

    fn read_object_id(&mut self) -> Result<ObjectId, DecodeError> {
        let time = self.input.read_i32()?;
        let machine = self.input.read_i32()?;
        let inc = self.input.read_i32()?;
        Ok(ObjectId::new(time, machine, inc))
    }

    #[allow(clippy::cast_sign_loss)]
    fn read_binary(&mut self) -> Result<Binary, DecodeError> {
        let total = self.input.read_i32()?;
        if total < 0 {
            return Err(DecodeError::BadLength(format!("binary length {total}")));
        }
        let subtype_byte = self.input.read_byte()?;
        match BinarySubtype::from_u8(subtype_byte) {
            BinarySubtype::LegacyBinary => {
                let inner = self.input.read_i32()?;
                if inner < 0 || inner + 4 != total {
                    return Err(DecodeError::BadBinarySubtype {
                        subtype: subtype_byte,
                        detail: format!("inner length {inner} + 4 != total {total}"),
                    });
                }
                let mut data = vec![0_u8; inner as usize];
                self.input.fill(&mut data)?;
                Ok(Binary::new(BinarySubtype::LegacyBinary, data))
            }
            BinarySubtype::Uuid => {
                if total != 16 {
                    return Err(DecodeError::BadBinarySubtype {
                        subtype: subtype_byte,
                        detail: format!("total length {total} != 16"),
                    });
                }
                let mut data = [0_u8; 16];
                data[0..8].copy_from_slice(&self.input.read_i64()?.to_le_bytes());
                data[8..16].copy_from_slice(&self.input.read_i64()?.to_le_bytes());
                Ok(Binary::new(BinarySubtype::Uuid, data.to_vec()))
            }
            subtype => {
                let mut data = vec![0_u8; total as usize];
                self.input.fill(&mut data)?;
                Ok(Binary::new(subtype, data))
            }
        }
    }
}

fn scalar(name: String, value: BdocValue) -> Event {
    Event::Scalar { name, value }
}

// What the builder is currently assembling.
enum Node {
    Doc(Document),
    Arr(Vec<BdocValue>),
    Scope { code: String, doc: Document },
}

/// Assembles a [`Document`] tree from the event stream of one document.
pub(crate) fn parse_document(source: &mut dyn std::io::Read) -> BdocResult<Document> {
    let mut decoder = Decoder::new(source)?;
    let mut stack: Vec<(Option<String>, Node)> = Vec::new();

    loop {
        let Some(event) = decoder.next_event()? else {
            return Err(crate::impl_err!("event stream ended before the document"));
        };
        match event {
            Event::ObjectStart { name } => stack.push((name, Node::Doc(Document::new()))),
            Event::ArrayStart { name } => stack.push((Some(name), Node::Arr(Vec::new()))),
            Event::ScopeStart { name, code } => stack.push((
                Some(name),
                Node::Scope {
                    code,
                    doc: Document::new(),
                },
            )),
            Event::Scalar { name, value } => attach(&mut stack, &name, value)?,
            Event::ObjectDone | Event::ArrayDone | Event::ScopeDone => {
                let Some((o_name, node)) = stack.pop() else {
                    return Err(crate::impl_err!("unbalanced event stream"));
                };
                let value = match node {
                    Node::Doc(doc) if stack.is_empty() => return Ok(doc),
                    Node::Doc(doc) => BdocValue::OBJECT(doc),
                    Node::Arr(items) => BdocValue::ARRAY(items),
                    Node::Scope { code, doc } => BdocValue::CODE_WITH_SCOPE { code, scope: doc },
                };
                let name = o_name.ok_or_else(|| crate::impl_err!("nested value without a name"))?;
                attach(&mut stack, &name, value)?;
            }
        }
    }
}

fn attach(
    stack: &mut [(Option<String>, Node)],
    name: &str,
    value: BdocValue,
) -> BdocResult<()> {
    match stack.last_mut() {
        Some((_, Node::Doc(doc) | Node::Scope { doc, .. })) => {
            doc.push(name, value);
            Ok(())
        }
        Some((_, Node::Arr(items))) => {
            // element names inside arrays are the indices; the order on the
            // wire is authoritative
            items.push(value);
            Ok(())
        }
        None => Err(crate::impl_err!("element outside of any document")),
    }
}
