//! Workflow service client
//!
//! This module provides:
//! - The service RPC surface ([`WorkflowService`]) and its fault model ([`ServiceError`])
//! - Transports: [`HttpWorkflowService`] and [`InMemoryWorkflowService`]
//! - The protocol client used by pollers and workers ([`WorkflowClient`])

mod http;
mod memory;
mod protocol;
mod service;
pub mod wire;

pub use http::HttpWorkflowService;
pub use memory::{ExecutionStatus, InMemoryConfig, InMemoryWorkflowService};
pub use protocol::{ClientConfig, ClientError, StartWorkflowOptions, WorkflowClient};
pub use service::{ServiceError, ServiceErrorKind, WorkflowService};
