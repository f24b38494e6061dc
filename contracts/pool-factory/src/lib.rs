#![no_std]

mod constants;
mod contract;
mod errors;
mod events;
mod helpers;
mod oracle;
mod storage;

pub use contract::{PoolFactory, PoolFactoryClient};
pub use errors::Error;
pub use storage::{AccountPosition, PoolState};

mod test;
