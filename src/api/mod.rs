pub mod middleware;
pub mod request;
pub mod response;
pub mod routes;

pub use middleware::authorize;
pub use routes::{create_router, AppState};
