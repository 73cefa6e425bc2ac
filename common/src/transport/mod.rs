//! Publish/subscribe transport
//!
//! A [`Transport`] delivers whole messages to subscription handlers. Handlers
//! run synchronously inside [`Transport::poll_once`], on the polling thread,
//! so two handlers never run at the same time.

pub mod memory;
pub mod packet;
pub mod udpm;

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

pub use memory::{MemoryPublisher, MemoryTransport};
pub use udpm::UdpmTransport;

/// Default LCM multicast group used on the robot
pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 76, 67);
pub const DEFAULT_PORT: u16 = 7667;
pub const DEFAULT_URL: &str = "udpm://239.255.76.67:7667?ttl=0";

/// Pattern matching every channel
pub const ALL_CHANNELS: &str = ".*";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid transport url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported transport scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("invalid channel pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown subscription {0}")]
    UnknownSubscription(SubscriptionId),

    #[error("message on '{channel}' cannot be sent: {reason}")]
    Unsendable { channel: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// A fatal error means the transport will never deliver again
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

/// Handle returned by [`Transport::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Callback invoked with `(channel, payload)` for each matching message
pub type MessageHandler = Box<dyn FnMut(&str, &[u8]) + Send>;

pub trait Transport: Send {
    /// Register a handler for channels whose whole name matches the regex `pattern`
    fn subscribe(
        &mut self,
        pattern: &str,
        handler: MessageHandler,
    ) -> Result<SubscriptionId, TransportError>;

    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), TransportError>;

    fn publish(&mut self, channel: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Wait up to `timeout` for one message and dispatch it to matching
    /// handlers before returning. Returns `true` if a message arrived.
    fn poll_once(&mut self, timeout: Duration) -> Result<bool, TransportError>;

    /// Human readable description, e.g. the URL it is connected to
    fn description(&self) -> &str;
}

struct Subscription {
    id: SubscriptionId,
    pattern: Regex,
    handler: MessageHandler,
}

/// Subscription bookkeeping shared by the transport implementations
#[derive(Default)]
pub struct Dispatcher {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns: Vec<_> = self.subscriptions.iter().map(|s| s.pattern.as_str()).collect();
        f.debug_struct("Dispatcher").field("patterns", &patterns).finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        pattern: &str,
        handler: MessageHandler,
    ) -> Result<SubscriptionId, TransportError> {
        // Channel patterns must match the whole channel name
        let regex =
            Regex::new(&format!("^(?:{pattern})$")).map_err(|source| TransportError::Pattern {
                pattern: pattern.to_string(),
                source,
            })?;
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription {
            id,
            pattern: regex,
            handler,
        });
        Ok(id)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), TransportError> {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        if self.subscriptions.len() == before {
            return Err(TransportError::UnknownSubscription(id));
        }
        Ok(())
    }

    /// Invoke every matching handler in subscription order. Returns how many ran.
    pub fn dispatch(&mut self, channel: &str, payload: &[u8]) -> usize {
        let mut invoked = 0;
        for subscription in &mut self.subscriptions {
            if subscription.pattern.is_match(channel) {
                (subscription.handler)(channel, payload);
                invoked += 1;
            }
        }
        invoked
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

/// A parsed transport URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportUrl {
    /// UDP multicast, as used by LCM
    Udpm { group: Ipv4Addr, port: u16, ttl: u32 },
    /// In-process loopback queue
    Memq,
}

impl TransportUrl {
    pub fn parse(text: &str) -> Result<Self, TransportError> {
        let invalid = |reason: &str| TransportError::InvalidUrl {
            url: text.to_string(),
            reason: reason.to_string(),
        };

        let url = url::Url::parse(text).map_err(|e| invalid(&e.to_string()))?;
        match url.scheme() {
            "memq" => Ok(TransportUrl::Memq),
            "udpm" => {
                let group = match url.host_str() {
                    None | Some("") => DEFAULT_GROUP,
                    Some(host) => host
                        .parse::<Ipv4Addr>()
                        .map_err(|_| invalid("host must be an IPv4 address"))?,
                };
                if !group.is_multicast() {
                    return Err(invalid("host is not a multicast group"));
                }
                let port = url.port().unwrap_or(DEFAULT_PORT);

                let mut ttl = 0;
                for (key, value) in url.query_pairs() {
                    match key.as_ref() {
                        "ttl" => ttl = value.parse().map_err(|_| invalid("ttl must be a number"))?,
                        // Receive buffer sizing is left to the OS
                        "recv_buf_size" => {}
                        other => return Err(invalid(&format!("unknown option '{other}'"))),
                    }
                }
                Ok(TransportUrl::Udpm { group, port, ttl })
            }
            other => Err(TransportError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl fmt::Display for TransportUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportUrl::Udpm { group, port, ttl } => write!(f, "udpm://{group}:{port}?ttl={ttl}"),
            TransportUrl::Memq => write!(f, "memq://"),
        }
    }
}

/// Open a transport for `url`
pub fn connect(url: &str) -> Result<Box<dyn Transport>, TransportError> {
    match TransportUrl::parse(url)? {
        TransportUrl::Udpm { group, port, ttl } => {
            Ok(Box::new(UdpmTransport::connect(group, port, ttl)?))
        }
        TransportUrl::Memq => Ok(Box::new(MemoryTransport::new())),
    }
}
