use std::time::Duration;

use rustuya::TuyaError;
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

use crate::protocol::transport::DataPointTransport;
use crate::protocol::value::DpValue;

#[derive(Error, Debug)]
pub enum WindcalmClientError {
    #[error("Not connected")]
    NotConnected,
    #[error(transparent)]
    Device(#[from] TuyaError),
    #[error("Data point {index} did not answer after {attempts} attempts")]
    Timeout { index: u32, attempts: u32 },
    #[error("Unexpected value for data point {index}: {value}")]
    UnexpectedValue { index: u32, value: DpValue },
    #[error("Invalid options: {0}")]
    Options(String),
}

/// How long a single attempt may take before it is abandoned and
/// reissued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// `None` retries until the device answers or fails.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(500),
            write_timeout: Duration::from_millis(250),
            max_attempts: None,
        }
    }
}

/// Reads and writes data points through a [`DataPointTransport`],
/// reissuing any attempt the device leaves unanswered.
///
/// The Tuya protocol can drop a request without reporting anything, so an
/// attempt that outlives its timeout is abandoned and a fresh request is
/// sent. A write may therefore reach the device more than once. Errors
/// reported by the transport end the call right away.
pub struct DataPointClient<T> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: DataPointTransport> DataPointClient<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn get(&self, index: u32) -> Result<DpValue, WindcalmClientError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            debug!("GET {index}");
            match timeout(self.policy.read_timeout, self.transport.get(index)).await {
                Ok(Ok(value)) => {
                    debug!("GET SUCCESS {index}: {value}");
                    return Ok(value);
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    self.check_attempts(index, attempts)?;
                    debug!("GET {index} timed out (attempt {attempts}), retrying");
                }
            }
        }
    }

    pub async fn set(&self, index: u32, value: DpValue) -> Result<(), WindcalmClientError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            debug!("SET {index}: {value}");
            match timeout(
                self.policy.write_timeout,
                self.transport.set(index, value.clone()),
            )
            .await
            {
                Ok(Ok(())) => {
                    debug!("SET SUCCESS {index}: {value}");
                    return Ok(());
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    self.check_attempts(index, attempts)?;
                    debug!("SET {index} timed out (attempt {attempts}), retrying");
                }
            }
        }
    }

    fn check_attempts(&self, index: u32, attempts: u32) -> Result<(), WindcalmClientError> {
        match self.policy.max_attempts {
            Some(max) if attempts >= max => Err(WindcalmClientError::Timeout { index, attempts }),
            _ => Ok(()),
        }
    }
}
