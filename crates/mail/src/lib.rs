pub mod message;
pub mod spool;

pub use message::{compose_eml, normalize_sender, parse_eml, MessageError};
pub use spool::SpoolMailTransport;
