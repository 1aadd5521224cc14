use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use derive_builder::Builder;
use futures_util::{Stream, StreamExt};
use rustuya::protocol::TuyaMessage;
use rustuya::{Device, Scanner, TuyaError, Version};
use serde_json::Value;
use tokio::sync::{Notify, OnceCell, broadcast, oneshot};
use tracing::{debug, error, warn};

use crate::protocol::connection::{ConnectionState, ConnectionStatus, ConnectionTracker};
use crate::protocol::manager::RequestManager;
use crate::protocol::value::{DpReport, DpValue};

pub const ADDRESS_AUTO: &str = "Auto";
pub const DEFAULT_VERSION: &str = "3.3";

/// How long a read may wait for its report before it is dropped.
pub const DEFAULT_STALE_READ_AGE: Duration = Duration::from_secs(10);

const KEY_ERR: &str = "Err";
const LIVENESS_TICK: Duration = Duration::from_secs(1);

/// Raw access to the data points of one device.
///
/// A call settles when the device answers; implementations never time out
/// on their own, the retry policy lives in [`crate::DataPointClient`].
#[async_trait]
pub trait DataPointTransport: Send + Sync {
    async fn get(&self, index: u32) -> Result<DpValue, TuyaError>;

    async fn set(&self, index: u32, value: DpValue) -> Result<(), TuyaError>;
}

#[derive(Builder, Debug, Clone)]
#[builder(setter(into))]
pub struct TuyaOptions {
    pub id: String,
    pub key: String,
    #[builder(default = "ADDRESS_AUTO.to_string()")]
    pub address: String,
    #[builder(default = "DEFAULT_VERSION.to_string()")]
    pub version: String,
    /// Display name used in log lines.
    #[builder(default = "String::from(\"Windcalm\")")]
    pub name: String,
    /// Pending reads older than this are dropped. Keep it above the read
    /// timeout of the retry policy.
    #[builder(default = "DEFAULT_STALE_READ_AGE")]
    pub stale_read_age: Duration,
}

impl TuyaOptions {
    pub fn builder() -> TuyaOptionsBuilder {
        TuyaOptionsBuilder::default()
    }
}

struct Inner {
    name: String,
    device: OnceCell<Device>,
    requests: RequestManager,
    tracker: ConnectionTracker,
    reports: broadcast::Sender<DpReport>,
    shutdown: Notify,
}

/// [`DataPointTransport`] over the Tuya local protocol.
#[derive(Clone)]
pub struct TuyaTransport {
    inner: Arc<Inner>,
}

impl TuyaTransport {
    /// Creates the transport and starts discovery and connection in the
    /// background. The returned handle is usable right away; calls fail
    /// with [`TuyaError::Offline`] until the device is connected.
    pub fn spawn(options: TuyaOptions) -> Self {
        let inner = Arc::new(Inner::new(&options.name, options.stale_read_age));

        let inner_ = inner.clone();
        tokio::spawn(async move {
            let (address, version) = inner_.find(&options).await;
            inner_.tracker.transition(ConnectionState::Connecting);
            let device = Device::new(options.id.clone(), address, options.key.clone(), version);
            if inner_.device.set(device.clone()).is_err() {
                warn!("Device for '{}' was already created", inner_.name);
            }
            inner_.run(device).await;
        });

        Self { inner }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.tracker.subscribe()
    }

    /// Every data-point report the device sends, solicited or not.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<DpReport> {
        self.inner.reports.subscribe()
    }

    pub async fn stop(&self) {
        self.inner.shutdown.notify_one();
        if let Some(device) = self.inner.device.get() {
            device.stop().await;
        }
        self.inner.tracker.transition(ConnectionState::Disconnected);
    }

    fn connected_device(&self) -> Result<&Device, TuyaError> {
        self.inner
            .device
            .get()
            .filter(|device| device.is_connected())
            .ok_or(TuyaError::Offline)
    }
}

#[async_trait]
impl DataPointTransport for TuyaTransport {
    async fn get(&self, index: u32) -> Result<DpValue, TuyaError> {
        let device = self.connected_device()?;
        let response = self.inner.requests.add_read(index);
        device.status().await;
        Ok(wait_for_report(response).await)
    }

    async fn set(&self, index: u32, value: DpValue) -> Result<(), TuyaError> {
        let device = self.connected_device()?;
        device.set_value(index, value.to_json()).await;
        Ok(())
    }
}

impl Inner {
    fn new(name: &str, stale_read_age: Duration) -> Self {
        let (reports, _) = broadcast::channel(16);
        Self {
            name: name.to_string(),
            device: OnceCell::new(),
            requests: RequestManager::new(stale_read_age),
            tracker: ConnectionTracker::new(name),
            reports,
            shutdown: Notify::new(),
        }
    }

    /// Resolves the address to connect to, running UDP discovery when the
    /// address is `Auto`.
    async fn find(&self, options: &TuyaOptions) -> (String, Version) {
        let configured: Version = options.version.as_str().into();
        if options.address != ADDRESS_AUTO {
            return (options.address.clone(), configured);
        }

        self.tracker.transition(ConnectionState::Discovering);
        match Scanner::new().discover_device(&options.id).await {
            Ok(Some(found)) => {
                debug!("Found '{}' at {}", self.name, found.ip);
                (found.ip, found.version.unwrap_or(configured))
            }
            Ok(None) => {
                warn!(
                    "'{}' did not answer discovery, leaving address resolution to the device task",
                    self.name
                );
                (ADDRESS_AUTO.to_string(), configured)
            }
            Err(e) => {
                warn!("Discovery of '{}' failed: {}", self.name, e);
                (ADDRESS_AUTO.to_string(), configured)
            }
        }
    }

    async fn run(&self, device: Device) {
        self.pump(|| device.listener(), || self.sync_state(&device)).await;
    }

    /// Feeds device messages to [`Inner::handle_message`] until shutdown.
    ///
    /// The device stream ends when its subscriber falls behind the
    /// device broadcast; a fresh subscription is taken and the pump goes
    /// on.
    async fn pump<S>(&self, mut subscribe: impl FnMut() -> S, mut on_tick: impl FnMut())
    where
        S: Stream<Item = Result<TuyaMessage, TuyaError>>,
    {
        let mut liveness = tokio::time::interval(LIVENESS_TICK);
        liveness.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        'pump: loop {
            let stream = subscribe();
            tokio::pin!(stream);
            loop {
                tokio::select! {
                    _ = self.shutdown.notified() => {
                        debug!("Stopping message pump for '{}'", self.name);
                        break 'pump;
                    }
                    message = stream.next() => match message {
                        Some(Ok(message)) => self.handle_message(&message),
                        Some(Err(e)) => error!("Error from '{}': {}", self.name, e),
                        None => {
                            warn!(
                                "Message stream of '{}' fell behind, subscribing again",
                                self.name
                            );
                            continue 'pump;
                        }
                    },
                    _ = liveness.tick() => {
                        on_tick();
                        self.requests.remove_stale();
                    }
                }
            }
        }

        self.tracker.transition(ConnectionState::Disconnected);
    }

    fn sync_state(&self, device: &Device) {
        if device.is_connected() {
            self.tracker.transition(ConnectionState::Connected);
        } else if self.tracker.state() == ConnectionState::Connected {
            self.tracker.transition(ConnectionState::Disconnected);
        }
    }

    fn handle_message(&self, message: &TuyaMessage) {
        let payload = match serde_json::from_slice::<Value>(&message.payload) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(
                    "Ignoring non-JSON message 0x{:02X} from '{}': {}",
                    message.cmd, self.name, e
                );
                return;
            }
        };

        if let Some(code) = error_code(&payload) {
            let err = TuyaError::from_code(code);
            error!("Error from '{}': {}", self.name, err);
            if matches!(err, TuyaError::Offline | TuyaError::ConnectionFailed)
                && self.tracker.state() == ConnectionState::Connected
            {
                self.tracker.transition(ConnectionState::Disconnected);
            }
            return;
        }

        if let Some(report) = DpReport::from_payload(&payload)
            && !report.is_empty()
        {
            debug!("Report from '{}': {:?}", self.name, report.dps);
            self.requests.complete(&report);
            // no subscribers is fine
            let _ = self.reports.send(report);
        }
    }
}

/// Value of a pending read. A read dropped for its age never settles, so
/// the caller's own timeout reissues it.
async fn wait_for_report(response: oneshot::Receiver<DpValue>) -> DpValue {
    match response.await {
        Ok(value) => value,
        Err(_) => std::future::pending().await,
    }
}

/// Error code of a device error report, `None` for regular messages.
fn error_code(payload: &Value) -> Option<u32> {
    let code = match payload.get(KEY_ERR)? {
        Value::String(s) => s.parse::<u32>().ok()?,
        Value::Number(n) => u32::try_from(n.as_u64()?).ok()?,
        _ => return None,
    };
    (code != 0).then_some(code)
}
