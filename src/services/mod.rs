pub mod database;
pub mod handler;
pub mod import;
pub mod install_data;
pub mod install_meta;
pub mod uninstall;

pub use database::DatabaseResolver;
pub use handler::{Handler, HandlerBase};
pub use import::ImportHandler;
pub use install_data::InstallDataHandler;
pub use install_meta::InstallMetaHandler;
pub use uninstall::UninstallHandler;
