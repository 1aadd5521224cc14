mod protocol;

pub use protocol::client::*;
pub use protocol::connection::{ConnectionState, ConnectionStatus, ConnectionTracker};
pub use protocol::transport::{
    ADDRESS_AUTO, DEFAULT_STALE_READ_AGE, DEFAULT_VERSION, DataPointTransport, TuyaOptions,
    TuyaOptionsBuilder, TuyaTransport,
};
pub use protocol::value::{DpReport, DpValue};
pub use rustuya::TuyaError;
