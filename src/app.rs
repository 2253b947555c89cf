pub mod errors;
pub mod server;
pub mod types;
pub mod utils;
