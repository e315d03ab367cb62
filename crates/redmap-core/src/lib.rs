#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

#[cfg(not(any(feature = "mem", feature = "redis")))]
compile_error!("enable at least one store backend: `mem` or `redis`");

mod config;
mod error;
mod store;

pub use config::*;
pub use error::*;
pub use store::*;
