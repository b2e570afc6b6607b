pub mod app;
pub mod cli;
pub mod config;
pub mod contacts;
pub mod failover;
pub mod filter;
pub mod gateway;
pub mod output;
pub mod records;
pub mod runner;
pub mod view;

#[cfg(test)]
mod tests;
