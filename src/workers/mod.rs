pub mod coordinator;
pub mod enrichment;
pub mod order_machine;
