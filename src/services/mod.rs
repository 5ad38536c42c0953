pub mod credits;
pub mod dedupe;
pub mod oracle;
pub mod patterns;
pub mod provider;
pub mod queue;
pub mod quota;
pub mod scheduler;
pub mod storage;
