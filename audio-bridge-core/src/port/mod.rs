pub mod adapter;
pub mod bridge;
pub mod device_port;
