pub mod admin;
pub mod auth;
pub mod contributors;
pub mod error;
pub mod keys;
pub mod likes;
pub mod middleware;
pub mod password;
pub mod routes;
pub mod state;
pub mod users;
pub mod validate;
pub mod verification;

pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, AppStateInner, PortalSettings};
