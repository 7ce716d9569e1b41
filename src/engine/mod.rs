// Rolegate Engine - Core module structure
pub mod config;
pub mod database;
pub mod logging;
pub mod rbac;
pub mod api;
pub mod cli;

pub use config::Config;
pub use database::Database;
pub use rbac::RoleService;
