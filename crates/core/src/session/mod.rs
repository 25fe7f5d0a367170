pub mod domain;
pub mod infrastructure;
pub mod session_store;
pub mod session_sweeper;
