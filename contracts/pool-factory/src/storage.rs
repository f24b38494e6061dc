use soroban_sdk::{contracttype, Address, Env, String, Vec};

use crate::constants::INDEX_SCALE_1E18;
use crate::errors::Error;

// Storage key types for the contract. Configuration and the pool counter
// live in instance storage; the registry and every pool/position record get
// their own persistent key so unrelated pools' traffic touches disjoint
// footprints.
#[contracttype]
pub enum DataKey {
    Owner,
    Initialized,
    RateModel,    // Address
    Oracle,       // Address
    FeeCollector, // Address
    PoolCount,    // u64
    AllPools,               // Vec<u64>, creation order
    PoolByAsset(Address),   // u64
    Pool(u64),              // PoolState
    Position(u64, Address), // AccountPosition
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolState {
    pub asset: Address,
    pub name: String,
    pub symbol: String,
    pub collateral_factor_bps: u32,
    pub reserve_factor_bps: u32,
    pub supply_cap: u128, // 0 disables
    pub borrow_cap: u128, // 0 disables
    pub total_supplied: u128,
    pub total_borrowed: u128,
    pub reserves: u128,
    pub supply_index: u128, // scaled 1e18
    pub borrow_index: u128, // scaled 1e18
    pub last_accrual: u64,
}

/// Per-account balances plus the index each side was last settled at.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AccountPosition {
    pub supplied: u128,
    pub supply_snapshot: u128,
    pub borrowed: u128,
    pub borrow_snapshot: u128,
    pub collateral: u128,
}

const TTL_THRESHOLD: u32 = 100_000;
const TTL_EXTEND_TO: u32 = 200_000;

pub fn read_pool(env: &Env, pool_id: u64) -> Result<PoolState, Error> {
    let key = DataKey::Pool(pool_id);
    let pool = env
        .storage()
        .persistent()
        .get(&key)
        .ok_or(Error::PoolNotFound)?;
    env.storage()
        .persistent()
        .extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);
    Ok(pool)
}

pub fn write_pool(env: &Env, pool_id: u64, pool: &PoolState) {
    env.storage().persistent().set(&DataKey::Pool(pool_id), pool);
}

/// Read an account's position; a fresh position starts settled at the
/// pool's current indexes.
pub fn read_position(env: &Env, pool_id: u64, account: &Address, pool: &PoolState) -> AccountPosition {
    let key = DataKey::Position(pool_id, account.clone());
    match env.storage().persistent().get(&key) {
        Some(pos) => {
            env.storage()
                .persistent()
                .extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);
            pos
        }
        None => AccountPosition {
            supplied: 0,
            supply_snapshot: pool.supply_index,
            borrowed: 0,
            borrow_snapshot: pool.borrow_index,
            collateral: 0,
        },
    }
}

pub fn write_position(env: &Env, pool_id: u64, account: &Address, pos: &AccountPosition) {
    let key = DataKey::Position(pool_id, account.clone());
    if pos.supplied == 0 && pos.borrowed == 0 && pos.collateral == 0 {
        env.storage().persistent().remove(&key);
    } else {
        env.storage().persistent().set(&key, pos);
    }
}

pub fn all_pools(env: &Env) -> Vec<u64> {
    env.storage()
        .persistent()
        .get(&DataKey::AllPools)
        .unwrap_or(Vec::new(env))
}

pub fn initial_pool_state(
    env: &Env,
    asset: Address,
    name: String,
    symbol: String,
    collateral_factor_bps: u32,
    reserve_factor_bps: u32,
) -> PoolState {
    PoolState {
        asset,
        name,
        symbol,
        collateral_factor_bps,
        reserve_factor_bps,
        supply_cap: 0,
        borrow_cap: 0,
        total_supplied: 0,
        total_borrowed: 0,
        reserves: 0,
        supply_index: INDEX_SCALE_1E18,
        borrow_index: INDEX_SCALE_1E18,
        last_accrual: env.ledger().timestamp(),
    }
}

pub fn ensure_initialized(env: &Env) -> Result<(), Error> {
    if !env.storage().instance().has(&DataKey::Initialized) {
        return Err(Error::NotInitialized);
    }
    bump_instance_ttl(env);
    Ok(())
}

pub fn require_owner(env: &Env, caller: &Address) -> Result<(), Error> {
    ensure_initialized(env)?;
    let stored: Address = env
        .storage()
        .instance()
        .get(&DataKey::Owner)
        .ok_or(Error::NotInitialized)?;
    if stored != *caller {
        return Err(Error::NotOwner);
    }
    caller.require_auth();
    Ok(())
}

pub fn config_address(env: &Env, key: DataKey) -> Result<Address, Error> {
    env.storage().instance().get(&key).ok_or(Error::NotInitialized)
}

pub fn bump_instance_ttl(env: &Env) {
    if env.storage().instance().has(&DataKey::Initialized) {
        env.storage()
            .instance()
            .extend_ttl(TTL_THRESHOLD, TTL_EXTEND_TO);
    }
}
