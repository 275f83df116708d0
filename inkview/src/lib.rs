// ABOUTME: Library exports for inkview modules for testing and external use
// ABOUTME: Makes internal modules available to integration tests and benchmarks

pub mod blocks;
pub mod capability;
pub mod cli;
pub mod config;
pub mod constants;
pub mod document;
pub mod markdown;
pub mod protocols;
pub mod viewer;
