pub mod constants;
pub mod error;
pub mod text;
pub mod time;
pub mod types;
