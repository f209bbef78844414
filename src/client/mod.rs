mod builder;
mod client_struct;

pub use builder::*;
pub use client_struct::*;
