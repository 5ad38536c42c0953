pub mod api;
pub mod job;
pub mod lead;
pub mod order;
