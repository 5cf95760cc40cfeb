//! Durable backends for the resident import pipeline.

pub mod sqlite;

pub use sqlite::SqliteResidentRepository;
