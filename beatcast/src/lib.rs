//! beatcast: terminal watcher for a beatcast agent.

pub mod types;
pub mod ws;
