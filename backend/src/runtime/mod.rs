pub mod builtins;
pub mod error;
pub mod frozen;
pub mod value;
pub mod vm;
