pub mod engine;
pub mod states;

pub use engine::{EnrollmentFlow, FlowDefinition, FlowEngine, FlowTransitionError};
pub use states::{FlowAction, FlowContext, FlowEvent, TransitionOutcome};
