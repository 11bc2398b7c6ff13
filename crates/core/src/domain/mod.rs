pub mod monitor;
pub mod post;
pub mod profile;
