//! # bench-gateway
//!
//! The LLM gateway (C4) and base-URL discovery used by C10 before
//! constructing it.

pub mod client;
pub mod discovery;
pub mod errors;

pub use client::{FakeGateway, GatewayRuntime, LlmGateway, VllmGateway};
pub use errors::GatewayError;
