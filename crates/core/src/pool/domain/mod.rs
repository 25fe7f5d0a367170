pub mod pool_health;
pub mod task;
