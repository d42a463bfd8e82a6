//! Evaluate instance lifecycle: create-or-reuse on the request path and
//! provisioning on the event path.

pub mod provision;
pub mod service;

pub use provision::EvaluateProvisioner;
pub use service::{
    decide, CustomEvaluateCreateCmd, EvaluateDto, EvaluateInternalService, EvaluateService,
    StandardEvaluateCreateCmd,
};
