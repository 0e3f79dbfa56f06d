pub mod crypto;
pub mod db;
pub mod jobs;
pub mod mailboxes;
pub mod messages;
pub mod models;
pub mod occurrences;
pub mod orgs;
pub mod routing;
pub mod schema;
pub mod sync_events;
pub mod tickets;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
