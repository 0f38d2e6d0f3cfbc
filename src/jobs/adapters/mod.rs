//! Adapter implementations for the code import store and scheduler RPC
//! ports.

pub mod memory;
pub mod postgres;
pub mod rpc;
