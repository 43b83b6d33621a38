

pub mod server;

pub use server::{WayfinderMcpServer, run_server};
