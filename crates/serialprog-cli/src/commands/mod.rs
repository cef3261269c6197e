//! Command implementations for serialprog

pub mod program;
pub mod scan;

pub use program::program;
pub use scan::scan;
