//! Cross-cutting error code trait. Individual layers (`bench-storage`,
//! `bench-gateway`, `bench-pipeline`, `bench-queue`) define their own
//! `thiserror` enums and implement `BenchErrorCode` against it so a
//! caller can log/report a stable string code regardless of which layer
//! raised.

pub mod error_code;

pub use error_code::BenchErrorCode;
