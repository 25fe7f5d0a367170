pub mod domain;
pub mod result_subscription;
pub mod worker_pool;
