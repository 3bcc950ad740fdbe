//! Tasklane Core - Entity Types
//!
//! Pure data structures shared by the storage and API crates: row ids,
//! tasks and their public projection, listing queries, users, field
//! validation and the error taxonomy. No I/O lives here.

pub mod error;
pub mod identity;
pub mod listing;
pub mod task;
pub mod user;
pub mod validation;

pub use error::*;
pub use identity::*;
pub use listing::*;
pub use task::*;
pub use user::*;
pub use validation::*;
