// MBot telemetry common library - main library exports

pub mod configuration;
pub mod health;
pub mod ingest;
pub mod probe;
pub mod schema;
pub mod shutdown;
pub mod stats;
pub mod table;
pub mod transport;

// Flattened re-exports
pub use self::configuration::TelemetryConfig;
pub use self::schema::SchemaRegistry;
pub use self::shutdown::{Shutdown, ShutdownSignal};
pub use self::table::{ChannelRecord, ChannelTable};
pub use self::transport::{Transport, TransportError};
