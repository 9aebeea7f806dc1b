mod channel;
mod error;
mod request;
mod response;

pub use channel::*;
pub use error::*;
pub use request::*;
pub use response::*;
