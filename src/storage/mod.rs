//! Storage: persistence gateway, domain repository, schema bootstrap

pub mod gateway;
pub mod repo;
pub mod schema;

pub use gateway::{PgGateway, SqlParam, StorageError};
pub use repo::{
    AbsenceStore, ClassAbsences, ClassRow, ClassScope, PgRepository, RegisterOutcome, RemoveOutcome,
};
pub use schema::ensure_schema;
