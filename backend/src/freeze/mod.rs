pub mod emitter;
pub mod error;
pub mod label;
pub mod loader;
pub mod pipeline;
pub mod session;
pub mod toolchain;
