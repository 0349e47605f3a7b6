//! Tidecast Core - Decentralized content delivery and metered access
//!
//! This crate provides the building blocks for streaming content from
//! redundant content-addressed storage gateways: failover gateway resolution,
//! entitlement and purchase handling, metered payment channels, and the
//! stream session orchestrator that ties them together.

pub mod access;
pub mod config;
pub mod events;
pub mod gateway;
pub mod payment;
pub mod session;
pub mod task;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use access::{
    AccessController, AccessError, ContractError, PaymentContract, PurchaseStep,
    SimulatedPaymentContract,
};
pub use config::TidecastConfig;
pub use events::{EventBus, EventKind, StreamEvent};
pub use gateway::{
    GatewayError, GatewayProbe, GatewayResolver, HttpGatewayProbe, ResolvedSource,
    SimulatedGatewayProbe,
};
pub use payment::MeteredPaymentChannel;
pub use session::{
    ContentDescriptor, HttpMetadataSource, MetadataError, MetadataSource, SessionError,
    SessionStatus, StaticMetadataSource, StreamSession,
};
pub use task::PeriodicTask;

/// Core errors that can bubble up from any Tidecast subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TidecastError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TidecastError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            TidecastError::Gateway(GatewayError::AllGatewaysExhausted { attempted }) => {
                format!("No gateway reachable ({attempted} tried), playing from local fallback")
            }
            TidecastError::Gateway(_) => "Gateway error occurred".to_string(),
            TidecastError::Access(AccessError::AccessDenied { content_id }) => {
                format!("Access denied for {content_id}")
            }
            TidecastError::Access(AccessError::PurchaseFailed { step, .. }) => {
                format!("Purchase failed during {step}")
            }
            TidecastError::Session(_) => "Stream session error occurred".to_string(),
            TidecastError::Metadata(_) => "Content metadata unavailable".to_string(),
            TidecastError::Configuration { reason } => {
                format!("Configuration error: {reason}")
            }
            TidecastError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(self, TidecastError::Configuration { .. })
    }
}

pub type Result<T> = std::result::Result<T, TidecastError>;
