//! Core of the mlhub platform: evaluate instance lifecycle and the event
//! consumers behind the message server.
//!
//! ```text
//! HTTP create ──► EvaluateService ── save(version) ──► EvaluateRepository
//!                      │
//!                      └── create_evaluate ──► broker
//!                                                │
//!                 MessageHandler ◄───────────────┘
//!                      │  (Retrier)
//!                      ├──► EvaluateProvisioner ──► EvaluateManager
//!                      │         └── update_detail(expiry)
//!                      └──► like / download / fork / related services
//! ```
//!
//! - `types` - resource and evaluate domain types
//! - `ports` - traits for storage, transport and compute backends
//! - `evaluate` - create-or-reuse decision and provisioning
//! - `retry` - bounded retry with a last-chance attempt
//! - `handler` - event routing to domain services
//! - `memory` - in-memory port implementations

pub mod error;
pub mod evaluate;
pub mod handler;
pub mod memory;
pub mod message;
pub mod ports;
pub mod retry;
pub mod types;

pub use error::{MlHubError, Result};
pub use evaluate::{
    CustomEvaluateCreateCmd, EvaluateDto, EvaluateInternalService, EvaluateProvisioner,
    EvaluateService, StandardEvaluateCreateCmd,
};
pub use handler::{MessageHandler, RelationTable, ResourceServices, FINETUNE_RETRY_INTERVAL};
pub use message::{EvaluateInfo, Event, EventHandler, Topic};
pub use retry::{Retrier, DEFAULT_RETRY_INTERVAL};
