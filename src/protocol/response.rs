use crate::{
    protocol::{message::OP_REPLY, ServerError},
    BdocError, BdocResult, Document,
};
use byteorder::{LittleEndian, ReadBytesExt};

// Response flag: the query could not be executed; the single returned
// document describes the failure.
const QUERY_FAILURE: i32 = 1 << 1;

/// A framed server reply: header fields plus the returned documents.
#[derive(Debug)]
pub struct Response {
    response_to: i32,
    flags: i32,
    cursor_id: i64,
    starting_from: i32,
    documents: Vec<Document>,
}

impl Response {
    /// Reads one reply frame from the wire.
    pub fn parse(rdr: &mut dyn std::io::Read) -> BdocResult<Self> {
        let _total_length = read_i32(rdr)?;
        let _request_id = read_i32(rdr)?;
        let response_to = read_i32(rdr)?;
        let opcode = read_i32(rdr)?;
        if opcode != OP_REPLY {
            return Err(crate::impl_err!("unexpected reply opcode {opcode}"));
        }
        let flags = read_i32(rdr)?;
        let cursor_id = rdr
            .read_i64::<LittleEndian>()
            .map_err(|source| BdocError::Network {
                source,
                retried: false,
            })?;
        let starting_from = read_i32(rdr)?;
        let number_returned = read_i32(rdr)?;
        let mut documents =
            Vec::with_capacity(usize::try_from(number_returned.max(0)).unwrap_or_default());
        for _ in 0..number_returned {
            documents.push(Document::from_reader(rdr)?);
        }
        Ok(Self {
            response_to,
            flags,
            cursor_id,
            starting_from,
            documents,
        })
    }

    /// Request id of the message this reply answers.
    pub fn response_to(&self) -> i32 {
        self.response_to
    }

    pub fn flags(&self) -> i32 {
        self.flags
    }

    pub fn cursor_id(&self) -> i64 {
        self.cursor_id
    }

    pub fn starting_from(&self) -> i32 {
        self.starting_from
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn first(&self) -> Option<&Document> {
        self.documents.first()
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }

    pub fn into_first_document(self) -> Option<Document> {
        self.documents.into_iter().next()
    }

    /// The error the server embedded in this reply, if any.
    pub fn get_error(&self) -> Option<ServerError> {
        let o_doc = self.documents.first();
        if let Some(message) = o_doc.and_then(|doc| doc.get_str("$err")) {
            let code = o_doc.and_then(|doc| doc.get_i32("code")).unwrap_or(-1);
            return Some(ServerError::new(code, message.to_string()));
        }
        if self.flags & QUERY_FAILURE != 0 {
            return Some(ServerError::new(-1, "query failure".to_string()));
        }
        None
    }
}

fn read_i32(rdr: &mut dyn std::io::Read) -> BdocResult<i32> {
    rdr.read_i32::<LittleEndian>()
        .map_err(|source| BdocError::Network {
            source,
            retried: false,
        })
}

#[cfg(test)]
mod tests {
    use super::{Response, QUERY_FAILURE};
    use crate::Document;

    fn reply_frame(flags: i32, response_to: i32, documents: &[Document]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&flags.to_le_bytes());
        body.extend_from_slice(&0_i64.to_le_bytes());
        body.extend_from_slice(&0_i32.to_le_bytes());
        body.extend_from_slice(&i32::try_from(documents.len()).unwrap().to_le_bytes());
        for document in documents {
            body.extend_from_slice(&document.to_bytes().unwrap());
        }
        let mut frame = Vec::new();
        frame.extend_from_slice(&(i32::try_from(body.len()).unwrap() + 16).to_le_bytes());
        frame.extend_from_slice(&7_i32.to_le_bytes()); // server-side request id
        frame.extend_from_slice(&response_to.to_le_bytes());
        frame.extend_from_slice(&super::OP_REPLY.to_le_bytes());
        frame.extend_from_slice(&body);
        frame
    }

    #[test]
    fn parses_documents_and_header() {
        let docs = vec![
            Document::new().with("x", 1_i32),
            Document::new().with("x", 2_i32),
        ];
        let frame = reply_frame(0, 99, &docs);
        let mut source: &[u8] = &frame;
        let response = Response::parse(&mut source).unwrap();
        assert_eq!(response.response_to(), 99);
        assert_eq!(response.documents(), &docs[..]);
        assert!(response.get_error().is_none());
    }

    #[test]
    fn embedded_error_is_exposed() {
        let err_doc = Document::new()
            .with("$err", "not master")
            .with("code", 10054_i32);
        let frame = reply_frame(QUERY_FAILURE, 1, &[err_doc]);
        let mut source: &[u8] = &frame;
        let response = Response::parse(&mut source).unwrap();
        let error = response.get_error().unwrap();
        assert_eq!(error.code(), 10054);
        assert!(error.is_not_master());
    }

    #[test]
    fn failure_flag_without_document_is_still_an_error() {
        let frame = reply_frame(QUERY_FAILURE, 1, &[]);
        let mut source: &[u8] = &frame;
        let response = Response::parse(&mut source).unwrap();
        assert!(response.get_error().is_some());
    }
}
