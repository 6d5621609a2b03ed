pub mod handlers;
pub mod majors;
pub mod universities;
