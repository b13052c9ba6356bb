//! Hardware control adapter: a gRPC client to the robot's onboard control
//! service, plus the tool-schema translation that exposes it to the LLM
//! adapter as a fixed set of callable tools.

pub mod client;
pub mod error;
pub mod tool_schema;

mod proto;

pub use client::HardwareClient;
pub use error::HardwareError;
pub use tool_schema::{tool_schemas, HardwareToolExecutor, ToolSchema};
