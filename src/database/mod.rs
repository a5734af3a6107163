pub mod manager;

pub use manager::{DatabaseManager, DatabaseError};
