pub mod entity;
pub mod mapper;
pub mod sqlite_repo;

pub use sqlite_repo::{SqliteAppointmentsRepository, SqlitePartiesRepository};
