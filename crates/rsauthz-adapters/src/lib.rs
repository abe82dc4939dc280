//! rsauthz-adapters: Policy adapters
//!
//! File-backed policy storage in the same line format the in-memory
//! adapter uses (`p, alice, data1, read`).

mod file_adapter;

pub use file_adapter::FileAdapter;
