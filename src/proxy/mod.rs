pub mod adapters;
pub mod filter;
pub mod handlers;
pub mod middleware;
pub mod reasoning;
pub mod server;
pub mod state;
pub mod thinking_bus;
pub mod upstream;

pub use filter::StreamFilter;
pub use thinking_bus::ThinkingBus;

#[cfg(test)]
pub mod tests;
