pub mod connection;
pub mod mock;
pub mod process;
pub mod wire;

pub use connection::{AgentConnection, TurnRequest, TurnStream};
