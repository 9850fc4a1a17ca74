pub mod error;
pub mod requests;
pub mod responses;


pub use error::{HabaseError, Result};
pub use requests::{MethodName, Request, SeqId, Value};
pub use responses::{RemoteError, Response};
