//! Storage traits.

pub mod graph;

pub use graph::GraphDriver;
