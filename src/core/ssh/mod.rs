//! Secure-shell transport: key loading and the connection/session model.

pub mod client;
pub mod credential;

pub use client::{
    OpenSshConnection, OpenSshConnector, OpenSshSession, SshConnection, SshConnector, SshSession,
    SshTarget,
};
pub use credential::{load_private_key, KeyFormat, PrivateKey};
