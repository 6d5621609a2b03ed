pub mod handlers;
pub mod identity;
pub mod jwt;
pub mod middleware;
pub mod rate_limit;
pub mod users;
