#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    InMemoryRepository, ResultRepository, ResultRow, SessionStore, Storage, StorageError,
};
