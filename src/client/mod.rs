//! Client connection layer

pub mod commands;
pub mod raw_connection;
pub mod resp;

pub use commands::{Commands, CommandsExt};
pub use raw_connection::{ConnectionFactory, RawConnection, Timeouts};
pub use resp::{Redirect, RespDecoder, RespEncoder, RespValue};
