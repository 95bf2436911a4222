//! Beach Surf: streams frames from a blocking world model to websocket clients.

pub mod app;
pub mod channel;
pub mod coalesce;
pub mod config;
pub mod context;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod seed;
pub mod session;
pub mod telemetry;
pub mod warmup;
pub mod world;

#[cfg(test)]
mod testing;
