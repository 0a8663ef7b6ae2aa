use crate::{protocol::document::emit_cstring, BdocResult, Document};
use byteorder::{LittleEndian, WriteBytesExt};
use std::sync::atomic::{AtomicI32, Ordering};

pub(crate) const OP_REPLY: i32 = 1;
pub(crate) const OP_UPDATE: i32 = 2001;
pub(crate) const OP_INSERT: i32 = 2002;
pub(crate) const OP_QUERY: i32 = 2004;
pub(crate) const OP_DELETE: i32 = 2006;

/// Name of the pseudo-collection commands are addressed to. Calls against it
/// are never redispatched after an I/O failure.
pub const CMD_COLLECTION: &str = "$cmd";

static NEXT_REQUEST_ID: AtomicI32 = AtomicI32::new(1);

/// A framed outbound wire message: a 16-byte header (total length, request
/// id, response-to, opcode) followed by the operation payload.
///
/// Messages own their buffer; dropping the message releases it.
#[derive(Debug)]
pub struct Message {
    request_id: i32,
    opcode: i32,
    options: i32,
    bytes: Vec<u8>,
}

impl Message {
    /// Option bit permitting dispatch to a secondary.
    pub const SLAVE_OK: i32 = 1 << 2;

    /// A query against `ns` (`"db.collection"`).
    pub fn query(
        ns: &str,
        options: i32,
        number_to_skip: i32,
        number_to_return: i32,
        query: &Document,
    ) -> BdocResult<Self> {
        let mut body = Vec::new();
        emit(&mut body, |w| {
            w.write_i32::<LittleEndian>(options)?;
            emit_cstring(ns, w)?;
            w.write_i32::<LittleEndian>(number_to_skip)?;
            w.write_i32::<LittleEndian>(number_to_return)?;
            query.emit(w)
        })?;
        Ok(Self::assemble(OP_QUERY, options, body))
    }

    /// A command against `db`, addressed to the command pseudo-collection.
    pub fn command(db: &str, command: &Document) -> BdocResult<Self> {
        Self::query(&format!("{db}.{CMD_COLLECTION}"), 0, 0, -1, command)
    }

    /// An insert of one or more documents into `ns`.
    pub fn insert(ns: &str, documents: &[Document]) -> BdocResult<Self> {
        let mut body = Vec::new();
        emit(&mut body, |w| {
            w.write_i32::<LittleEndian>(0)?;
            emit_cstring(ns, w)?;
            for document in documents {
                document.emit(w)?;
            }
            Ok(())
        })?;
        Ok(Self::assemble(OP_INSERT, 0, body))
    }

    /// An update of the documents matching `selector`.
    pub fn update(
        ns: &str,
        upsert: bool,
        multi: bool,
        selector: &Document,
        update: &Document,
    ) -> BdocResult<Self> {
        let flags = i32::from(upsert) | (i32::from(multi) << 1);
        let mut body = Vec::new();
        emit(&mut body, |w| {
            w.write_i32::<LittleEndian>(0)?;
            emit_cstring(ns, w)?;
            w.write_i32::<LittleEndian>(flags)?;
            selector.emit(w)?;
            update.emit(w)
        })?;
        Ok(Self::assemble(OP_UPDATE, 0, body))
    }

    /// A delete of the documents matching `selector`.
    pub fn delete(ns: &str, selector: &Document) -> BdocResult<Self> {
        let mut body = Vec::new();
        emit(&mut body, |w| {
            w.write_i32::<LittleEndian>(0)?;
            emit_cstring(ns, w)?;
            w.write_i32::<LittleEndian>(0)?;
            selector.emit(w)
        })?;
        Ok(Self::assemble(OP_DELETE, 0, body))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn assemble(opcode: i32, options: i32, body: Vec<u8>) -> Self {
        let request_id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
        let mut bytes = Vec::with_capacity(16 + body.len());
        bytes.extend_from_slice(&(body.len() as i32 + 16).to_le_bytes());
        bytes.extend_from_slice(&request_id.to_le_bytes());
        bytes.extend_from_slice(&0_i32.to_le_bytes());
        bytes.extend_from_slice(&opcode.to_le_bytes());
        bytes.extend_from_slice(&body);
        Self {
            request_id,
            opcode,
            options,
            bytes,
        }
    }

    pub fn has_option(&self, option: i32) -> bool {
        self.options & option != 0
    }

    pub fn request_id(&self) -> i32 {
        self.request_id
    }

    pub fn opcode(&self) -> i32 {
        self.opcode
    }

    /// The complete frame, header included.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

fn emit(
    body: &mut Vec<u8>,
    f: impl FnOnce(&mut dyn std::io::Write) -> std::io::Result<()>,
) -> BdocResult<()> {
    f(body).map_err(|e| crate::impl_err!("message serialization failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::Message;
    use crate::Document;

    fn read_i32(bytes: &[u8], at: usize) -> i32 {
        i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    #[test]
    fn query_frame_layout() {
        let query = Document::new().with("x", 1_i32);
        let message = Message::query("db.coll", Message::SLAVE_OK, 3, 10, &query).unwrap();
        let bytes = message.bytes();

        assert_eq!(read_i32(bytes, 0), i32::try_from(bytes.len()).unwrap());
        assert_eq!(read_i32(bytes, 4), message.request_id());
        assert_eq!(read_i32(bytes, 8), 0); // response-to
        assert_eq!(read_i32(bytes, 12), super::OP_QUERY);
        assert_eq!(read_i32(bytes, 16), Message::SLAVE_OK);
        assert_eq!(&bytes[20..28], b"db.coll\0");
        assert_eq!(read_i32(bytes, 28), 3);
        assert_eq!(read_i32(bytes, 32), 10);
        assert_eq!(
            Document::from_bytes(&bytes[36..]).unwrap(),
            query
        );
    }

    #[test]
    fn request_ids_are_distinct() {
        let doc = Document::new();
        let first = Message::command("admin", &doc).unwrap();
        let second = Message::command("admin", &doc).unwrap();
        assert_ne!(first.request_id(), second.request_id());
    }

    #[test]
    fn slave_ok_is_interrogated() {
        let doc = Document::new();
        let plain = Message::query("a.b", 0, 0, 0, &doc).unwrap();
        let routed = Message::query("a.b", Message::SLAVE_OK, 0, 0, &doc).unwrap();
        assert!(!plain.has_option(Message::SLAVE_OK));
        assert!(routed.has_option(Message::SLAVE_OK));
    }
}
