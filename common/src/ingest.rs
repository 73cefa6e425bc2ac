//! Background receive loop
//!
//! Repeatedly polls the transport with a bounded wait so a shutdown request is
//! noticed within one poll timeout. After a transient error the loop waits one
//! poll timeout (or until shutdown) before polling again. Message handlers run inside the poll, so
//! an in-flight handler always finishes before the loop checks for shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::schema::SchemaRegistry;
use crate::shutdown::ShutdownSignal;
use crate::table::ChannelTable;
use crate::transport::{MessageHandler, SubscriptionId, Transport, TransportError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub polls: u64,
    pub deliveries: u64,
    pub timeouts: u64,
    pub errors: u64,
}

/// What the loop hands back when it stops
pub struct IngestExit {
    pub transport: Box<dyn Transport>,
    pub stats: IngestStats,
    /// Set if the loop stopped because the transport closed
    pub fatal: Option<TransportError>,
}

pub struct IngestLoop {
    transport: Box<dyn Transport>,
    poll_timeout: Duration,
    shutdown: ShutdownSignal,
}

impl IngestLoop {
    pub fn new(
        transport: Box<dyn Transport>,
        poll_timeout: Duration,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            transport,
            poll_timeout,
            shutdown,
        }
    }

    /// Poll until shutdown or until the transport closes for good
    pub fn run(mut self) -> IngestExit {
        let mut stats = IngestStats::default();
        let mut fatal = None;
        info!("Ingest started on {}", self.transport.description());

        while !self.shutdown.is_triggered() {
            stats.polls += 1;
            match self.transport.poll_once(self.poll_timeout) {
                Ok(true) => stats.deliveries += 1,
                Ok(false) => stats.timeouts += 1,
                Err(e) if e.is_fatal() => {
                    error!("Transport failed permanently: {e}");
                    fatal = Some(e);
                    break;
                }
                Err(e) => {
                    stats.errors += 1;
                    warn!("Transport error: {e}");
                    // Back off for one poll period before retrying
                    self.shutdown.wait_timeout(self.poll_timeout);
                }
            }
        }

        info!(
            polls = stats.polls,
            deliveries = stats.deliveries,
            timeouts = stats.timeouts,
            errors = stats.errors,
            "Ingest stopped"
        );
        IngestExit {
            transport: self.transport,
            stats,
            fatal,
        }
    }

    /// Run on the blocking thread pool
    pub fn spawn(self) -> JoinHandle<IngestExit> {
        tokio::task::spawn_blocking(move || self.run())
    }
}

/// Handler that records every message in `table`, inferring its type from `registry`
pub fn channel_table_handler(
    table: Arc<ChannelTable>,
    registry: Arc<SchemaRegistry>,
) -> MessageHandler {
    Box::new(move |channel: &str, payload: &[u8]| {
        let decoded = registry.infer(payload);
        if decoded.is_none() {
            debug!("No schema matches {} bytes on {channel}", payload.len());
        }
        table.upsert(channel, Instant::now(), payload.len(), decoded);
    })
}

/// Subscribe `table` to every channel matching `pattern`
pub fn track_channels(
    transport: &mut dyn Transport,
    pattern: &str,
    table: Arc<ChannelTable>,
    registry: Arc<SchemaRegistry>,
) -> Result<SubscriptionId, TransportError> {
    transport.subscribe(pattern, channel_table_handler(table, registry))
}
