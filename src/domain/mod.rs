// Domain layer - Pure telemetry types, no I/O
pub mod connection;
pub mod metric;
pub mod reading;
pub mod selection;
pub mod telemetry;
