pub mod client;
pub mod errors;
pub mod protocol;
pub mod resolver;
pub mod server;

use errors::Error;

pub type BftpResult<T> = std::result::Result<T, Error>;
