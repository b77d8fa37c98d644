#![no_std]
#[cfg(feature = "std")]
extern crate std;

mod utils;

pub mod payload;
pub mod frame;
pub mod command;
pub mod registers;
pub mod catalog;
pub mod treadmill;
#[cfg(feature = "host")]
pub mod host;
#[cfg(feature = "responder")]
pub mod responder;

pub use utils::checksum;
