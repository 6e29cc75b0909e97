pub mod bus;
mod handler;
mod ipc;
pub mod metrics;
pub mod pprof;
mod rpc;
pub mod signals;
mod slot;

pub use bus::{ControlClient, LocalBus, MessageBus};
pub use handler::{Handler, HandlerOptions, DEBUG_DOT_TIMEOUT};
pub use ipc::socket_address;
