pub mod area;
pub mod document;
pub mod poll_cycle;
pub mod scheduler;
