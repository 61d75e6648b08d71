pub mod agents;
pub mod client;
