//! wppbridge core library: webhook ingress, per-sender aggregation windows, and dispatch
//! of combined messages to the conversational agent, with replies sent back over WPPConnect.

pub mod agent;
pub mod aggregator;
pub mod channels;
pub mod config;
pub mod dispatcher;
pub mod gateway;
pub mod ingress;
pub mod init;
pub mod llm;
pub mod session;
pub mod voice;
