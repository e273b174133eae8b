//! Request handlers.

pub mod files;
pub mod health;
pub mod process;

pub use files::*;
pub use health::*;
pub use process::*;
