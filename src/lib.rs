pub mod custom_field;
pub mod env;
mod error;
pub mod firestore;
mod http_client;
pub mod organization;
pub mod update;

pub use error::Error;
