pub mod client;
pub mod connection;
pub(crate) mod manager;
pub mod transport;
pub mod value;
