//! remotefs daemon library: the IPC HTTP surface, POSIX attribute
//! synthesis, and the CLI operation layer shared by the two binaries.

pub mod cli;
pub mod http_server;
pub mod process;

pub use http_server::{serve, IpcServer, Transport};
