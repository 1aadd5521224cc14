use std::fmt;

use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Lifecycle of the link to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Looking for the device on the local network.
    #[default]
    Discovering,
    /// Address known, session not established yet.
    Connecting,
    Connected,
    /// The session was lost; the device task keeps reconnecting.
    Disconnected,
}

impl ConnectionState {
    fn can_move_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Discovering, Connecting)
                | (Discovering, Disconnected)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
                | (Disconnected, Discovering)
                | (Disconnected, Connecting)
                | (Disconnected, Connected)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Discovering => "discovering",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Owning side of the connection state machine. Only the transport moves it.
#[derive(Debug)]
pub struct ConnectionTracker {
    name: String,
    tx: watch::Sender<ConnectionState>,
}

impl ConnectionTracker {
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, _) = watch::channel(ConnectionState::default());
        Self {
            name: name.into(),
            tx,
        }
    }

    pub fn subscribe(&self) -> ConnectionStatus {
        ConnectionStatus {
            rx: self.tx.subscribe(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Moves to `next`. Returns `false` when already there or when the move
    /// is not a valid transition.
    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut rejected = None;
        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                false
            } else if current.can_move_to(next) {
                *current = next;
                true
            } else {
                rejected = Some(*current);
                false
            }
        });

        if let Some(current) = rejected {
            warn!(
                "Ignoring transition of '{}' from {current} to {next}",
                self.name
            );
        }
        if changed {
            match next {
                ConnectionState::Discovering => debug!("Looking for '{}'", self.name),
                ConnectionState::Connecting => debug!("Connecting to '{}'", self.name),
                ConnectionState::Connected => info!("Connected to '{}'", self.name),
                ConnectionState::Disconnected => debug!("Disconnected from '{}'", self.name),
            }
        }
        changed
    }
}

/// Read side of the connection state machine, handed to whoever needs to
/// check or follow the link status.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    rx: watch::Receiver<ConnectionState>,
}

impl ConnectionStatus {
    pub fn state(&self) -> ConnectionState {
        *self.rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Waits for the next transition. `None` once the tracker is gone.
    pub async fn changed(&mut self) -> Option<ConnectionState> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}
