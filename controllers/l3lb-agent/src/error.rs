//! Agent-specific error types.
//!
//! This module defines error types for the l3lb agent that are not covered
//! by upstream library errors.

use ifaddr_client::AddressError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the l3lb agent.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Kubernetes credentials could not be loaded
    #[error("Kubernetes configuration error: {0}")]
    KubeConfig(String),

    /// Interface address backend error
    #[error("Address backend error: {0}")]
    Address(#[from] AddressError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// A background task ended abnormally
    #[error("Task failed: {0}")]
    Task(String),
}
