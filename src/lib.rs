#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate lazy_static;

pub mod block;
pub mod blockdb;
pub mod config;
pub mod crypto;
pub mod execution;
pub mod miner;
pub mod state;
pub mod transaction;
