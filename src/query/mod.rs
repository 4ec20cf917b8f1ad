//! Request-scoped query types: what the client asks for and what the server allows.

mod options;
mod request;

pub use options::*;
pub use request::*;
