// RBAC Manager Engine - Core module structure
pub mod config;
pub mod database;
pub mod rbac;
pub mod cli;

pub use config::RbacConfig;
pub use database::Database;
pub use rbac::Manager;
