//! Utility types shared across the pipeline

pub mod moving;

pub use moving::MovingStat;
