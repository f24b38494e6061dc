#![no_std]
use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, Address, BytesN, Env,
};

pub const BPS_SCALE: u32 = 10_000;
/// Upper bound on every curve parameter, in annual bps (1000% APR).
pub const MAX_RATE_PARAM_BPS: u32 = 100_000;

const TTL_THRESHOLD: u32 = 100_000_000;
const TTL_EXTEND_TO: u32 = 200_000_000;

#[contracttype]
pub enum DataKey {
    Owner,
    Params,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RateParams {
    pub base_rate_bps: u32,
    pub multiplier_bps: u32,
    pub jump_multiplier_bps: u32,
    pub kink_bps: u32,
}

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    NotOwner = 3,
    InvalidKink = 4,
    InvalidRateParam = 5,
    InvalidUtilization = 6,
    InvalidReserveFactor = 7,
    RateOverflow = 8,
}

#[contract]
pub struct InterestRateModel;

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModelInitialized {
    pub base_rate_bps: u32,
    pub multiplier_bps: u32,
    pub jump_multiplier_bps: u32,
    pub kink_bps: u32,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParamsUpdated {
    pub base_rate_bps: u32,
    pub multiplier_bps: u32,
    pub jump_multiplier_bps: u32,
    pub kink_bps: u32,
}

#[contractimpl]
impl InterestRateModel {
    pub fn initialize(
        env: Env,
        owner: Address,
        base_rate_bps: u32,
        multiplier_bps: u32,
        jump_multiplier_bps: u32,
        kink_bps: u32,
    ) -> Result<(), Error> {
        if env
            .storage()
            .persistent()
            .get::<_, Address>(&DataKey::Owner)
            .is_some()
        {
            return Err(Error::AlreadyInitialized);
        }
        owner.require_auth();
        let params = RateParams {
            base_rate_bps,
            multiplier_bps,
            jump_multiplier_bps,
            kink_bps,
        };
        validate_params(&params)?;
        env.storage().persistent().set(&DataKey::Owner, &owner);
        env.storage().persistent().set(&DataKey::Params, &params);
        bump_ttl(&env);
        ModelInitialized {
            base_rate_bps,
            multiplier_bps,
            jump_multiplier_bps,
            kink_bps,
        }
        .publish(&env);
        Ok(())
    }

    /// Owner: replace the curve parameters. Pools accrue with the new curve
    /// from their next accrual onward; the model itself holds no pool state.
    pub fn set_params(
        env: Env,
        caller: Address,
        base_rate_bps: u32,
        multiplier_bps: u32,
        jump_multiplier_bps: u32,
        kink_bps: u32,
    ) -> Result<(), Error> {
        require_owner(&env, &caller)?;
        let params = RateParams {
            base_rate_bps,
            multiplier_bps,
            jump_multiplier_bps,
            kink_bps,
        };
        validate_params(&params)?;
        env.storage().persistent().set(&DataKey::Params, &params);
        ParamsUpdated {
            base_rate_bps,
            multiplier_bps,
            jump_multiplier_bps,
            kink_bps,
        }
        .publish(&env);
        Ok(())
    }

    /// Annual borrow rate in bps for the given utilization.
    pub fn borrow_rate(env: Env, utilization_bps: u32) -> Result<u32, Error> {
        let params = get_params(&env)?;
        bump_ttl(&env);
        compute_borrow_rate(&params, utilization_bps)
    }

    /// Annual supply rate in bps: the borrow rate earned on the utilized
    /// share, net of the reserve factor.
    pub fn supply_rate(
        env: Env,
        utilization_bps: u32,
        reserve_factor_bps: u32,
    ) -> Result<u32, Error> {
        if reserve_factor_bps > BPS_SCALE {
            return Err(Error::InvalidReserveFactor);
        }
        let params = get_params(&env)?;
        bump_ttl(&env);
        let borrow_rate = compute_borrow_rate(&params, utilization_bps)? as u64;
        let rate_to_pool = borrow_rate * (utilization_bps as u64) / (BPS_SCALE as u64);
        let net = rate_to_pool * ((BPS_SCALE - reserve_factor_bps) as u64) / (BPS_SCALE as u64);
        u32::try_from(net).map_err(|_| Error::RateOverflow)
    }

    pub fn get_params(env: Env) -> Result<RateParams, Error> {
        get_params(&env)
    }

    pub fn owner(env: Env) -> Result<Address, Error> {
        env.storage()
            .persistent()
            .get(&DataKey::Owner)
            .ok_or(Error::NotInitialized)
    }

    pub fn set_owner(env: Env, caller: Address, new_owner: Address) -> Result<(), Error> {
        require_owner(&env, &caller)?;
        env.storage().persistent().set(&DataKey::Owner, &new_owner);
        Ok(())
    }

    pub fn upgrade_wasm(env: Env, caller: Address, new_wasm_hash: BytesN<32>) -> Result<(), Error> {
        require_owner(&env, &caller)?;
        env.deployer().update_current_contract_wasm(new_wasm_hash);
        Ok(())
    }
}

fn validate_params(params: &RateParams) -> Result<(), Error> {
    if params.kink_bps > BPS_SCALE {
        return Err(Error::InvalidKink);
    }
    if params.base_rate_bps > MAX_RATE_PARAM_BPS
        || params.multiplier_bps > MAX_RATE_PARAM_BPS
        || params.jump_multiplier_bps > MAX_RATE_PARAM_BPS
    {
        return Err(Error::InvalidRateParam);
    }
    // The curve must stay representable across its whole domain.
    compute_borrow_rate(params, BPS_SCALE)?;
    Ok(())
}

fn compute_borrow_rate(params: &RateParams, utilization_bps: u32) -> Result<u32, Error> {
    if utilization_bps > BPS_SCALE {
        return Err(Error::InvalidUtilization);
    }
    let base = params.base_rate_bps as u64;
    let scale = BPS_SCALE as u64;
    let rate = if utilization_bps <= params.kink_bps {
        base + (utilization_bps as u64) * (params.multiplier_bps as u64) / scale
    } else {
        let normal = base + (params.kink_bps as u64) * (params.multiplier_bps as u64) / scale;
        let excess = (utilization_bps - params.kink_bps) as u64;
        normal + excess * (params.jump_multiplier_bps as u64) / scale
    };
    u32::try_from(rate).map_err(|_| Error::RateOverflow)
}

fn get_params(env: &Env) -> Result<RateParams, Error> {
    env.storage()
        .persistent()
        .get(&DataKey::Params)
        .ok_or(Error::NotInitialized)
}

fn require_owner(env: &Env, caller: &Address) -> Result<(), Error> {
    let stored: Address = env
        .storage()
        .persistent()
        .get(&DataKey::Owner)
        .ok_or(Error::NotInitialized)?;
    bump_ttl(env);
    if stored != *caller {
        return Err(Error::NotOwner);
    }
    caller.require_auth();
    Ok(())
}

fn bump_ttl(env: &Env) {
    let persistent = env.storage().persistent();
    if persistent.has(&DataKey::Owner) {
        persistent.extend_ttl(&DataKey::Owner, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::Params) {
        persistent.extend_ttl(&DataKey::Params, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
}
