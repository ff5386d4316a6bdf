//! Transport implementations

pub mod tcp;

pub use tcp::TcpTransport;
