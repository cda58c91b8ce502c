pub mod context;
pub mod secrets;
