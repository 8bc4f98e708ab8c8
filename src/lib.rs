/*!
 * Handle Service Library
 * Descriptor bookkeeping for file/device/socket provider processes
 */

pub mod core;
pub mod lifecycle;
pub mod monitoring;
pub mod notify;
pub mod server;
pub mod table;
pub mod transport;

// Re-exports
pub use crate::core::{
    EventMask, FastConfirm, FileFlags, HandleError, HandleFlags, HandleId, HandleResult, IoOp,
    Pid, ServiceConfig, Trigger,
};
pub use lifecycle::{LifecycleBus, LifecycleEvent, LifecycleProducer, LocalBus};
pub use monitoring::init_tracing;
pub use server::{HandleService, IoContext, Provider, ServiceBuilder};
pub use table::{FileId, HandleTable, TableStats};
pub use transport::{
    ChannelClient, ChannelTransport, Delivery, Endpoint, PollEvent, Reply, Request, Transport,
};
