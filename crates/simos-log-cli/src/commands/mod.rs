//! Command implementations for simoslog

pub mod plan;
pub mod replay;

pub use plan::plan;
pub use replay::replay;
