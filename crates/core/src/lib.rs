pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod notify;
pub mod ports;
pub mod pricing;
pub mod workflow;

pub use domain::enrollment::{
    EnrollmentLine, EnrollmentRequest, EnrollmentRequestId, EnrollmentStatus,
};
pub use domain::grade::{Grade, GradeId};
pub use domain::student::{StudentId, StudentProgress};
pub use errors::{ApplicationError, EnrollmentError, InterfaceError};
pub use notify::{Notification, NotificationOutbox};
pub use ports::{EnrollmentStore, GradeCatalog, StoreError};
pub use workflow::{ActorContext, ActorRole, EnrollmentWorkflow, WorkflowSettings};
