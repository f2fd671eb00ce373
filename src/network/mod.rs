//! Network front-end: the TCP gateway that accepts connections and wires
//! up a stream runtime for each.

pub mod gateway;

pub use gateway::Gateway;
