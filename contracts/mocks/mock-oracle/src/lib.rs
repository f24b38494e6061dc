#![no_std]

use soroban_sdk::{contract, contractimpl, contracttype, Address, Env};

#[contracttype]
enum DataKey {
    Decimals,
    Resolution,
    Price(Address),
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PriceData {
    pub price: i128,
    pub timestamp: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
struct StoredPrice {
    price: i128,
    timestamp: Option<u64>,
}

/// Price feed stub for tests. Prices set without an explicit timestamp are
/// always reported fresh; `set_price_at` pins the timestamp so staleness
/// handling can be exercised.
#[contract]
pub struct MockOracle;

#[contractimpl]
impl MockOracle {
    pub fn initialize(env: Env, decimals: u32, resolution: u32) {
        env.storage().instance().set(&DataKey::Decimals, &decimals);
        env.storage()
            .instance()
            .set(&DataKey::Resolution, &resolution);
    }

    pub fn set_price(env: Env, asset: Address, price: i128) {
        env.storage().persistent().set(
            &DataKey::Price(asset),
            &StoredPrice {
                price,
                timestamp: None,
            },
        );
    }

    pub fn set_price_at(env: Env, asset: Address, price: i128, timestamp: u64) {
        env.storage().persistent().set(
            &DataKey::Price(asset),
            &StoredPrice {
                price,
                timestamp: Some(timestamp),
            },
        );
    }

    pub fn remove_price(env: Env, asset: Address) {
        env.storage().persistent().remove(&DataKey::Price(asset));
    }

    pub fn decimals(env: Env) -> u32 {
        env.storage()
            .instance()
            .get(&DataKey::Decimals)
            .unwrap_or(7u32)
    }

    pub fn resolution(env: Env) -> u32 {
        env.storage()
            .instance()
            .get(&DataKey::Resolution)
            .unwrap_or(300u32)
    }

    pub fn lastprice(env: Env, asset: Address) -> Option<PriceData> {
        let stored: StoredPrice = env.storage().persistent().get(&DataKey::Price(asset))?;
        Some(PriceData {
            price: stored.price,
            timestamp: stored.timestamp.unwrap_or_else(|| env.ledger().timestamp()),
        })
    }
}
