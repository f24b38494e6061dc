#![no_std]
use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, token, Address, BytesN,
    Env,
};

pub const BPS_SCALE: u32 = 10_000;

const TTL_THRESHOLD: u32 = 100_000_000;
const TTL_EXTEND_TO: u32 = 200_000_000;

#[contracttype]
pub enum DataKey {
    Owner,
    Initialized,
    FeeToken,
    CreationFee,         // u128
    ProtocolFeeShareBps, // u32
    Treasury,            // Address
    AccumulatedBalance,  // u128
    AuthorizedCaller(Address),
}

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    NotOwner = 3,
    NotAuthorized = 4,
    InvalidFeeShare = 5,
    InsufficientFee = 6,
    OverpaymentNotAccepted = 7,
    InsufficientBalance = 8,
    ZeroAmount = 9,
}

#[contract]
pub struct FeeCollector;

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FeeCollected {
    #[topic]
    pub caller: Address,
    #[topic]
    pub payer: Address,
    pub timestamp: u64,
    pub amount: u128,
    pub accumulated: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FeeWithdrawn {
    #[topic]
    pub treasury: Address,
    pub timestamp: u64,
    pub amount: u128,
    pub accumulated: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreationFeeUpdated {
    pub amount: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProtocolFeeShareUpdated {
    pub share_bps: u32,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TreasuryUpdated {
    #[topic]
    pub treasury: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallerAuthorized {
    #[topic]
    pub caller: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallerRevoked {
    #[topic]
    pub caller: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewOwner {
    #[topic]
    pub owner: Address,
}

#[contractimpl]
impl FeeCollector {
    pub fn initialize(
        env: Env,
        owner: Address,
        fee_token: Address,
        creation_fee: u128,
        protocol_fee_share_bps: u32,
        treasury: Address,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Initialized) {
            return Err(Error::AlreadyInitialized);
        }
        if protocol_fee_share_bps > BPS_SCALE {
            return Err(Error::InvalidFeeShare);
        }
        owner.require_auth();
        let instance = env.storage().instance();
        instance.set(&DataKey::Owner, &owner);
        instance.set(&DataKey::FeeToken, &fee_token);
        instance.set(&DataKey::CreationFee, &creation_fee);
        instance.set(&DataKey::ProtocolFeeShareBps, &protocol_fee_share_bps);
        instance.set(&DataKey::Treasury, &treasury);
        instance.set(&DataKey::AccumulatedBalance, &0u128);
        instance.set(&DataKey::Initialized, &true);
        bump_ttl(&env);
        Ok(())
    }

    /// Accept a payment of exactly the configured creation fee from `payer`.
    /// Only callers the owner has authorized may trigger collection; when the
    /// pool factory is the caller, invoker-contract auth satisfies
    /// `caller.require_auth()` without a separate signature.
    pub fn collect_creation_fee(
        env: Env,
        caller: Address,
        payer: Address,
        payment: u128,
    ) -> Result<(), Error> {
        ensure_initialized(&env)?;
        caller.require_auth();
        if !Self::is_authorized(env.clone(), caller.clone()) {
            return Err(Error::NotAuthorized);
        }
        let fee: u128 = env
            .storage()
            .instance()
            .get(&DataKey::CreationFee)
            .unwrap_or(0u128);
        if payment < fee {
            return Err(Error::InsufficientFee);
        }
        if payment > fee {
            return Err(Error::OverpaymentNotAccepted);
        }
        if payment > 0 {
            let fee_token: Address = env
                .storage()
                .instance()
                .get(&DataKey::FeeToken)
                .ok_or(Error::NotInitialized)?;
            token::Client::new(&env, &fee_token).transfer(
                &payer,
                &env.current_contract_address(),
                &to_i128(payment),
            );
        }
        let accumulated: u128 = env
            .storage()
            .instance()
            .get(&DataKey::AccumulatedBalance)
            .unwrap_or(0u128);
        let accumulated = accumulated + payment;
        env.storage()
            .instance()
            .set(&DataKey::AccumulatedBalance, &accumulated);
        FeeCollected {
            caller,
            payer,
            timestamp: env.ledger().timestamp(),
            amount: payment,
            accumulated,
        }
        .publish(&env);
        Ok(())
    }

    /// Owner: move collected fees to the treasury.
    pub fn withdraw(env: Env, caller: Address, amount: u128) -> Result<(), Error> {
        require_owner(&env, &caller)?;
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let accumulated: u128 = env
            .storage()
            .instance()
            .get(&DataKey::AccumulatedBalance)
            .unwrap_or(0u128);
        if amount > accumulated {
            return Err(Error::InsufficientBalance);
        }
        let accumulated = accumulated - amount;
        env.storage()
            .instance()
            .set(&DataKey::AccumulatedBalance, &accumulated);
        let fee_token: Address = env
            .storage()
            .instance()
            .get(&DataKey::FeeToken)
            .ok_or(Error::NotInitialized)?;
        let treasury: Address = env
            .storage()
            .instance()
            .get(&DataKey::Treasury)
            .ok_or(Error::NotInitialized)?;
        token::Client::new(&env, &fee_token).transfer(
            &env.current_contract_address(),
            &treasury,
            &to_i128(amount),
        );
        FeeWithdrawn {
            treasury,
            timestamp: env.ledger().timestamp(),
            amount,
            accumulated,
        }
        .publish(&env);
        Ok(())
    }

    pub fn set_creation_fee(env: Env, caller: Address, amount: u128) -> Result<(), Error> {
        require_owner(&env, &caller)?;
        env.storage().instance().set(&DataKey::CreationFee, &amount);
        CreationFeeUpdated { amount }.publish(&env);
        Ok(())
    }

    pub fn set_protocol_fee_share(env: Env, caller: Address, share_bps: u32) -> Result<(), Error> {
        require_owner(&env, &caller)?;
        if share_bps > BPS_SCALE {
            return Err(Error::InvalidFeeShare);
        }
        env.storage()
            .instance()
            .set(&DataKey::ProtocolFeeShareBps, &share_bps);
        ProtocolFeeShareUpdated { share_bps }.publish(&env);
        Ok(())
    }

    pub fn set_treasury(env: Env, caller: Address, treasury: Address) -> Result<(), Error> {
        require_owner(&env, &caller)?;
        env.storage().instance().set(&DataKey::Treasury, &treasury);
        TreasuryUpdated { treasury }.publish(&env);
        Ok(())
    }

    pub fn authorize_caller(env: Env, caller: Address, who: Address) -> Result<(), Error> {
        require_owner(&env, &caller)?;
        env.storage()
            .persistent()
            .set(&DataKey::AuthorizedCaller(who.clone()), &true);
        CallerAuthorized { caller: who }.publish(&env);
        Ok(())
    }

    pub fn revoke_caller(env: Env, caller: Address, who: Address) -> Result<(), Error> {
        require_owner(&env, &caller)?;
        env.storage()
            .persistent()
            .remove(&DataKey::AuthorizedCaller(who.clone()));
        CallerRevoked { caller: who }.publish(&env);
        Ok(())
    }

    pub fn is_authorized(env: Env, who: Address) -> bool {
        env.storage()
            .persistent()
            .get(&DataKey::AuthorizedCaller(who))
            .unwrap_or(false)
    }

    pub fn get_creation_fee(env: Env) -> u128 {
        env.storage()
            .instance()
            .get(&DataKey::CreationFee)
            .unwrap_or(0u128)
    }

    pub fn get_protocol_fee_share(env: Env) -> u32 {
        env.storage()
            .instance()
            .get(&DataKey::ProtocolFeeShareBps)
            .unwrap_or(0u32)
    }

    pub fn get_treasury(env: Env) -> Result<Address, Error> {
        env.storage()
            .instance()
            .get(&DataKey::Treasury)
            .ok_or(Error::NotInitialized)
    }

    pub fn get_accumulated_balance(env: Env) -> u128 {
        env.storage()
            .instance()
            .get(&DataKey::AccumulatedBalance)
            .unwrap_or(0u128)
    }

    pub fn owner(env: Env) -> Result<Address, Error> {
        env.storage()
            .instance()
            .get(&DataKey::Owner)
            .ok_or(Error::NotInitialized)
    }

    pub fn set_owner(env: Env, caller: Address, new_owner: Address) -> Result<(), Error> {
        require_owner(&env, &caller)?;
        env.storage().instance().set(&DataKey::Owner, &new_owner);
        NewOwner { owner: new_owner }.publish(&env);
        Ok(())
    }

    pub fn upgrade_wasm(env: Env, caller: Address, new_wasm_hash: BytesN<32>) -> Result<(), Error> {
        require_owner(&env, &caller)?;
        env.deployer().update_current_contract_wasm(new_wasm_hash);
        Ok(())
    }
}

fn ensure_initialized(env: &Env) -> Result<(), Error> {
    if !env.storage().instance().has(&DataKey::Initialized) {
        return Err(Error::NotInitialized);
    }
    bump_ttl(env);
    Ok(())
}

fn require_owner(env: &Env, caller: &Address) -> Result<(), Error> {
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

fn bump_ttl(env: &Env) {
    if env.storage().instance().has(&DataKey::Initialized) {
        env.storage()
            .instance()
            .extend_ttl(TTL_THRESHOLD, TTL_EXTEND_TO);
    }
}

fn to_i128(amount: u128) -> i128 {
    if amount > i128::MAX as u128 {
        panic!("amount exceeds i128");
    }
    amount as i128
}
