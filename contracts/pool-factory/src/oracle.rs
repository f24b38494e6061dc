#![allow(dead_code)]
use soroban_sdk::{contracttype, Address, Env};

// Price feed interface the pools consume. Feeds report `(price, timestamp)`
// pairs in `decimals` fixed-point, refreshed every `resolution` seconds.
#[soroban_sdk::contractclient(name = "PriceFeedClient")]
pub trait PriceFeed {
    fn decimals(e: Env) -> u32;
    fn resolution(e: Env) -> u32;
    fn lastprice(e: Env, asset: Address) -> Option<PriceData>;
}

#[contracttype(export = false)]
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PriceData {
    pub price: i128,
    pub timestamp: u64,
}
