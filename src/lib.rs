pub mod agent;
pub mod cli;
pub mod messages;
pub mod models;
pub mod relay;
pub mod server;
pub mod store;
