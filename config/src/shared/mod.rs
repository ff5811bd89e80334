mod base;
mod ingest;
mod mutation;
mod retry;
mod source;

pub use base::*;
pub use ingest::*;
pub use mutation::*;
pub use retry::*;
pub use source::*;
