// Application layer - Pipeline services and the seams they depend on
pub mod connector;
pub mod error;
pub mod ingest;
pub mod producer;
pub mod renderer;
pub mod scheduler;
pub mod store;
pub mod transport;
