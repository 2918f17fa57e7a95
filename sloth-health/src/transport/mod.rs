//! Transports that reach a node

pub mod ssh;

pub use ssh::SshExecutor;
