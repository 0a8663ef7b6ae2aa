pub(crate) mod bdoc_value;
pub(crate) mod buffered_input;
pub(crate) mod decode;
pub(crate) mod document;
pub(crate) mod message;
pub(crate) mod response;
pub(crate) mod server_error;
pub(crate) mod type_id;
pub(crate) mod write_concern;
pub(crate) mod write_result;

pub use self::bdoc_value::BdocValue;
pub use self::buffered_input::BufferedInput;
pub use self::decode::{Decoder, Event};
pub use self::document::Document;
pub use self::message::{Message, CMD_COLLECTION};
pub use self::response::Response;
pub use self::server_error::ServerError;
pub use self::type_id::TypeId;
pub use self::write_concern::WriteConcern;
pub use self::write_result::WriteResult;
