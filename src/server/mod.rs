mod builder;
mod handler;
mod registry;
mod server_struct;
pub use builder::*;
pub use server_struct::*;

use crate::errors::ServerErrors;

pub type ServerResult<T> = std::result::Result<T, ServerErrors>;
