pub mod config;
pub mod prefix;
pub mod validate;
