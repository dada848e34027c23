//! Database access shared by swarm services

pub mod init;

pub use init::{ensure_schema, init_pool};
