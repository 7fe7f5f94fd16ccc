pub mod config;
pub mod emit;
pub mod flush;
pub mod install_id;
pub mod status;
pub mod toggle;
