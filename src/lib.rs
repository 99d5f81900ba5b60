pub mod backends;
pub mod config;
pub mod flow;
pub mod interfaces;
pub mod monitor;
pub mod ports;
pub mod process;
pub mod traffic_classifier;

pub use flow::{FlowCounters, FlowRates, FlowWindow};
pub use monitor::FlowMonitor;
pub use process::Pid;
