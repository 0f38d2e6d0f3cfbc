//! Scheduler RPC adapters: the in-process client, the HTTP client and the
//! axum server routes sharing one JSON wire format.

mod http;
mod local;
mod server;
pub mod wire;

pub use http::HttpSchedulerClient;
pub use local::LocalSchedulerClient;
pub use server::scheduler_router;
