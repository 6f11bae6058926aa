pub mod error;
pub mod expiration;
pub mod keys;
pub mod kv;
pub mod metadata;
pub mod storage;
pub mod transfer;
