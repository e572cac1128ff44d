#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod error;
pub mod jid;
pub mod util;

pub use jid::Jid;
