pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_in_memory, DbPool};
pub use fixtures::{EnrollmentSeedDataset, SeedResult, VerificationResult};
pub use repositories::{
    InMemoryEnrollmentStore, InMemoryGradeCatalog, RepositoryError, SqlEnrollmentStore,
    SqlGradeCatalog, SqlStudentDirectory, StudentRecord,
};
