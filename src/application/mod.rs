pub mod app_error;
pub mod ports;
pub mod reference_locks;
pub mod use_cases;
