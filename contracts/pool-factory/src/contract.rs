use soroban_sdk::{contract, contractimpl, token, Address, BytesN, Env, String, Vec};

use crate::constants::*;
use crate::errors::Error;
use crate::events::*;
use crate::helpers::*;
use crate::storage::*;

#[contract]
pub struct PoolFactory;

#[contractimpl]
impl PoolFactory {
    /// Bind the factory to its collaborators. Each address is probed for the
    /// expected interface before it is stored; a misconfigured address is a
    /// deployment fault and traps.
    pub fn initialize(
        env: Env,
        owner: Address,
        rate_model: Address,
        oracle: Address,
        fee_collector: Address,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Initialized) {
            return Err(Error::AlreadyInitialized);
        }
        owner.require_auth();

        let _: u32 = call_contract_or_panic(&env, &rate_model, "borrow_rate", (0u32,));
        let _: u32 = call_contract_or_panic(&env, &rate_model, "supply_rate", (0u32, 0u32));
        let _: u128 = call_contract_or_panic(&env, &fee_collector, "get_creation_fee", ());
        let _: u32 = call_contract_or_panic(&env, &oracle, "decimals", ());

        let instance = env.storage().instance();
        instance.set(&DataKey::Owner, &owner);
        instance.set(&DataKey::RateModel, &rate_model);
        instance.set(&DataKey::Oracle, &oracle);
        instance.set(&DataKey::FeeCollector, &fee_collector);
        instance.set(&DataKey::PoolCount, &0u64);
        instance.set(&DataKey::Initialized, &true);
        bump_instance_ttl(&env);
        Ok(())
    }

    /// Create the one pool for `asset`, charging the creation fee to the
    /// caller. The whole operation is a single transaction: if anything past
    /// the fee transfer fails, the host rolls the fee back as well.
    pub fn create_pool(
        env: Env,
        caller: Address,
        asset: Address,
        name: String,
        symbol: String,
        collateral_factor_bps: u32,
        reserve_factor_bps: u32,
        payment: u128,
    ) -> Result<u64, Error> {
        require_owner(&env, &caller)?;

        if env
            .storage()
            .persistent()
            .has(&DataKey::PoolByAsset(asset.clone()))
        {
            return Err(Error::PoolAlreadyExists);
        }
        probe_asset(&env, &asset)?;
        if collateral_factor_bps > MAX_COLLATERAL_FACTOR_BPS {
            return Err(Error::InvalidCollateralFactor);
        }
        if reserve_factor_bps >= BPS_SCALE {
            return Err(Error::InvalidReserveFactor);
        }

        let collector = config_address(&env, DataKey::FeeCollector)?;
        try_call_contract::<(), _>(
            &env,
            &collector,
            "collect_creation_fee",
            (env.current_contract_address(), caller.clone(), payment),
        )
        .map_err(|()| Error::InsufficientFee)?;

        let count: u64 = env
            .storage()
            .instance()
            .get(&DataKey::PoolCount)
            .unwrap_or(0u64);
        let pool_id = count + 1;
        let pool = initial_pool_state(
            &env,
            asset.clone(),
            name,
            symbol,
            collateral_factor_bps,
            reserve_factor_bps,
        );
        write_pool(&env, pool_id, &pool);
        env.storage()
            .persistent()
            .set(&DataKey::PoolByAsset(asset.clone()), &pool_id);
        let mut pools = all_pools(&env);
        pools.push_back(pool_id);
        env.storage().persistent().set(&DataKey::AllPools, &pools);
        env.storage().instance().set(&DataKey::PoolCount, &pool_id);

        PoolCreated {
            creator: caller,
            asset,
            timestamp: env.ledger().timestamp(),
            pool_id,
            fee_paid: payment,
        }
        .publish(&env);
        Ok(pool_id)
    }

    pub fn get_pool(env: Env, asset: Address) -> Option<u64> {
        env.storage().persistent().get(&DataKey::PoolByAsset(asset))
    }

    pub fn get_all_pools(env: Env) -> Vec<u64> {
        all_pools(&env)
    }

    pub fn owner(env: Env) -> Result<Address, Error> {
        env.storage()
            .instance()
            .get(&DataKey::Owner)
            .ok_or(Error::NotInitialized)
    }

    /// Supply underlying into the pool.
    pub fn deposit(env: Env, pool_id: u64, from: Address, amount: u128) -> Result<(), Error> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let mut pool = read_pool(&env, pool_id)?;
        from.require_auth();
        accrue_pool(&env, pool_id, &mut pool)?;
        let mut pos = read_position(&env, pool_id, &from, &pool);
        settle_position(&pool, &mut pos)?;

        if pool.supply_cap > 0 {
            let after = pool
                .total_supplied
                .checked_add(amount)
                .ok_or(Error::MathOverflow)?;
            if after > pool.supply_cap {
                return Err(Error::SupplyCapExceeded);
            }
        }

        token::Client::new(&env, &pool.asset).transfer(
            &from,
            &env.current_contract_address(),
            &to_i128(amount),
        );

        pos.supplied = pos.supplied.checked_add(amount).ok_or(Error::MathOverflow)?;
        pool.total_supplied = pool
            .total_supplied
            .checked_add(amount)
            .ok_or(Error::MathOverflow)?;
        write_position(&env, pool_id, &from, &pos);
        write_pool(&env, pool_id, &pool);

        Deposit {
            account: from,
            pool_id,
            amount,
            total_supplied: pool.total_supplied,
        }
        .publish(&env);
        Ok(())
    }

    /// Redeem supplied underlying. The pool must stay able to cover what is
    /// out on loan.
    pub fn withdraw(env: Env, pool_id: u64, from: Address, amount: u128) -> Result<(), Error> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let mut pool = read_pool(&env, pool_id)?;
        from.require_auth();
        accrue_pool(&env, pool_id, &mut pool)?;
        let mut pos = read_position(&env, pool_id, &from, &pool);
        settle_position(&pool, &mut pos)?;

        if amount > pos.supplied {
            return Err(Error::InsufficientSupply);
        }
        if pool.total_borrowed > pool.total_supplied - amount {
            return Err(Error::UtilizationExceeded);
        }

        pos.supplied -= amount;
        pool.total_supplied -= amount;
        write_position(&env, pool_id, &from, &pos);
        write_pool(&env, pool_id, &pool);

        token::Client::new(&env, &pool.asset).transfer(
            &env.current_contract_address(),
            &from,
            &to_i128(amount),
        );

        Withdraw {
            account: from,
            pool_id,
            amount,
            total_supplied: pool.total_supplied,
        }
        .publish(&env);
        Ok(())
    }

    pub fn deposit_collateral(
        env: Env,
        pool_id: u64,
        from: Address,
        amount: u128,
    ) -> Result<(), Error> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let mut pool = read_pool(&env, pool_id)?;
        from.require_auth();
        accrue_pool(&env, pool_id, &mut pool)?;
        let mut pos = read_position(&env, pool_id, &from, &pool);
        settle_position(&pool, &mut pos)?;

        token::Client::new(&env, &pool.asset).transfer(
            &from,
            &env.current_contract_address(),
            &to_i128(amount),
        );

        pos.collateral = pos
            .collateral
            .checked_add(amount)
            .ok_or(Error::MathOverflow)?;
        write_position(&env, pool_id, &from, &pos);
        write_pool(&env, pool_id, &pool);

        CollateralDeposited {
            account: from,
            pool_id,
            amount,
            collateral: pos.collateral,
        }
        .publish(&env);
        Ok(())
    }

    /// Release collateral. Rejected when the remainder would no longer cover
    /// the account's outstanding debt at the current oracle price.
    pub fn withdraw_collateral(
        env: Env,
        pool_id: u64,
        from: Address,
        amount: u128,
    ) -> Result<(), Error> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let mut pool = read_pool(&env, pool_id)?;
        from.require_auth();
        accrue_pool(&env, pool_id, &mut pool)?;
        let mut pos = read_position(&env, pool_id, &from, &pool);
        settle_position(&pool, &mut pos)?;

        if amount > pos.collateral {
            return Err(Error::CollateralLocked);
        }
        let remaining = pos.collateral - amount;
        if pos.borrowed > 0 && !collateral_covers(&env, &pool, pos.borrowed, remaining)? {
            return Err(Error::CollateralLocked);
        }

        pos.collateral = remaining;
        write_position(&env, pool_id, &from, &pos);
        write_pool(&env, pool_id, &pool);

        token::Client::new(&env, &pool.asset).transfer(
            &env.current_contract_address(),
            &from,
            &to_i128(amount),
        );

        CollateralWithdrawn {
            account: from,
            pool_id,
            amount,
            collateral: remaining,
        }
        .publish(&env);
        Ok(())
    }

    /// Borrow underlying against deposited collateral.
    pub fn borrow(env: Env, pool_id: u64, from: Address, amount: u128) -> Result<(), Error> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let mut pool = read_pool(&env, pool_id)?;
        from.require_auth();
        accrue_pool(&env, pool_id, &mut pool)?;
        let mut pos = read_position(&env, pool_id, &from, &pool);
        settle_position(&pool, &mut pos)?;

        let new_debt = pos.borrowed.checked_add(amount).ok_or(Error::MathOverflow)?;
        if !collateral_covers(&env, &pool, new_debt, pos.collateral)? {
            return Err(Error::CollateralInsufficient);
        }
        if amount > pool.total_supplied - pool.total_borrowed {
            return Err(Error::PoolLiquidityExceeded);
        }
        if pool.borrow_cap > 0 {
            let after = pool
                .total_borrowed
                .checked_add(amount)
                .ok_or(Error::MathOverflow)?;
            if after > pool.borrow_cap {
                return Err(Error::BorrowCapExceeded);
            }
        }

        pos.borrowed = new_debt;
        pool.total_borrowed = pool
            .total_borrowed
            .checked_add(amount)
            .ok_or(Error::MathOverflow)?;
        write_position(&env, pool_id, &from, &pos);
        write_pool(&env, pool_id, &pool);

        token::Client::new(&env, &pool.asset).transfer(
            &env.current_contract_address(),
            &from,
            &to_i128(amount),
        );

        Borrow {
            borrower: from,
            pool_id,
            borrow_amount: amount,
            account_borrows: new_debt,
            total_borrows: pool.total_borrowed,
        }
        .publish(&env);
        Ok(())
    }

    /// Pay down debt. Repayment is capped at the outstanding balance; only
    /// the effective amount is pulled from the payer.
    pub fn repay(env: Env, pool_id: u64, from: Address, amount: u128) -> Result<(), Error> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let mut pool = read_pool(&env, pool_id)?;
        from.require_auth();
        accrue_pool(&env, pool_id, &mut pool)?;
        let mut pos = read_position(&env, pool_id, &from, &pool);
        settle_position(&pool, &mut pos)?;

        if pos.borrowed == 0 {
            write_position(&env, pool_id, &from, &pos);
            write_pool(&env, pool_id, &pool);
            return Ok(());
        }
        let repay_amount = if amount > pos.borrowed {
            pos.borrowed
        } else {
            amount
        };

        token::Client::new(&env, &pool.asset).transfer(
            &from,
            &env.current_contract_address(),
            &to_i128(repay_amount),
        );

        pos.borrowed -= repay_amount;
        pool.total_borrowed -= repay_amount;
        write_position(&env, pool_id, &from, &pos);
        write_pool(&env, pool_id, &pool);

        RepayBorrow {
            payer: from,
            pool_id,
            repay_amount,
            account_borrows: pos.borrowed,
            total_borrows: pool.total_borrowed,
        }
        .publish(&env);
        Ok(())
    }

    /// Owner: withdraw protocol reserves. Reserves are part of the supplied
    /// total, so the same liquidity rule as supplier withdrawals applies.
    pub fn withdraw_reserves(
        env: Env,
        caller: Address,
        pool_id: u64,
        amount: u128,
    ) -> Result<(), Error> {
        require_owner(&env, &caller)?;
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let mut pool = read_pool(&env, pool_id)?;
        accrue_pool(&env, pool_id, &mut pool)?;

        if amount > pool.reserves {
            return Err(Error::InsufficientReserves);
        }
        if pool.total_borrowed > pool.total_supplied - amount {
            return Err(Error::UtilizationExceeded);
        }

        pool.reserves -= amount;
        pool.total_supplied -= amount;
        write_pool(&env, pool_id, &pool);

        token::Client::new(&env, &pool.asset).transfer(
            &env.current_contract_address(),
            &caller,
            &to_i128(amount),
        );

        ReservesWithdrawn {
            pool_id,
            amount,
            total_reserves: pool.reserves,
        }
        .publish(&env);
        Ok(())
    }

    /// Accrue a pool's interest up to the current ledger time. Safe to call
    /// at any instant; a second call in the same instant is a no-op.
    pub fn accrue_interest(env: Env, pool_id: u64) -> Result<(), Error> {
        let mut pool = read_pool(&env, pool_id)?;
        accrue_pool(&env, pool_id, &mut pool)?;
        write_pool(&env, pool_id, &pool);
        Ok(())
    }

    pub fn set_supply_cap(env: Env, caller: Address, pool_id: u64, cap: u128) -> Result<(), Error> {
        require_owner(&env, &caller)?;
        let mut pool = read_pool(&env, pool_id)?;
        pool.supply_cap = cap;
        write_pool(&env, pool_id, &pool);
        SupplyCapUpdated {
            pool_id,
            supply_cap: cap,
        }
        .publish(&env);
        Ok(())
    }

    pub fn set_borrow_cap(env: Env, caller: Address, pool_id: u64, cap: u128) -> Result<(), Error> {
        require_owner(&env, &caller)?;
        let mut pool = read_pool(&env, pool_id)?;
        pool.borrow_cap = cap;
        write_pool(&env, pool_id, &pool);
        BorrowCapUpdated {
            pool_id,
            borrow_cap: cap,
        }
        .publish(&env);
        Ok(())
    }

    pub fn total_supplied(env: Env, pool_id: u64) -> Result<u128, Error> {
        Ok(read_pool(&env, pool_id)?.total_supplied)
    }

    pub fn total_borrowed(env: Env, pool_id: u64) -> Result<u128, Error> {
        Ok(read_pool(&env, pool_id)?.total_borrowed)
    }

    pub fn reserves(env: Env, pool_id: u64) -> Result<u128, Error> {
        Ok(read_pool(&env, pool_id)?.reserves)
    }

    pub fn available_liquidity(env: Env, pool_id: u64) -> Result<u128, Error> {
        let pool = read_pool(&env, pool_id)?;
        Ok(pool.total_supplied - pool.total_borrowed)
    }

    pub fn utilization_bps(env: Env, pool_id: u64) -> Result<u32, Error> {
        let pool = read_pool(&env, pool_id)?;
        utilization_of(&pool)
    }

    pub fn collateral_factor_bps(env: Env, pool_id: u64) -> Result<u32, Error> {
        Ok(read_pool(&env, pool_id)?.collateral_factor_bps)
    }

    pub fn reserve_factor_bps(env: Env, pool_id: u64) -> Result<u32, Error> {
        Ok(read_pool(&env, pool_id)?.reserve_factor_bps)
    }

    /// Current annual supply rate for the pool, from the rate model.
    pub fn supply_rate_bps(env: Env, pool_id: u64) -> Result<u32, Error> {
        let pool = read_pool(&env, pool_id)?;
        let util = utilization_of(&pool)?;
        let model = config_address(&env, DataKey::RateModel)?;
        Ok(call_contract_or_panic(
            &env,
            &model,
            "supply_rate",
            (util, pool.reserve_factor_bps),
        ))
    }

    pub fn get_pool_state(env: Env, pool_id: u64) -> Result<PoolState, Error> {
        read_pool(&env, pool_id)
    }

    /// Supplied balance at the pool's last accrual.
    pub fn supplied_balance(env: Env, pool_id: u64, account: Address) -> Result<u128, Error> {
        let pool = read_pool(&env, pool_id)?;
        let pos = read_position(&env, pool_id, &account, &pool);
        if pos.supplied == 0 {
            return Ok(0);
        }
        mul_div(pos.supplied, pool.supply_index, pos.supply_snapshot)
    }

    /// Debt balance at the pool's last accrual.
    pub fn borrow_balance(env: Env, pool_id: u64, account: Address) -> Result<u128, Error> {
        let pool = read_pool(&env, pool_id)?;
        let pos = read_position(&env, pool_id, &account, &pool);
        if pos.borrowed == 0 {
            return Ok(0);
        }
        mul_div(pos.borrowed, pool.borrow_index, pos.borrow_snapshot)
    }

    pub fn collateral_balance(env: Env, pool_id: u64, account: Address) -> Result<u128, Error> {
        let pool = read_pool(&env, pool_id)?;
        Ok(read_position(&env, pool_id, &account, &pool).collateral)
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

/// Roll a pool's interest forward to the current ledger time. The caller is
/// responsible for writing the pool back (mutating entrypoints batch this
/// with their own state change).
fn accrue_pool(env: &Env, pool_id: u64, pool: &mut PoolState) -> Result<(), Error> {
    let now = env.ledger().timestamp();
    if now <= pool.last_accrual {
        return Ok(());
    }
    let elapsed = (now - pool.last_accrual) as u128;
    let util = utilization_of(pool)?;
    let model = config_address(env, DataKey::RateModel)?;
    let rate_bps: u32 = call_contract_or_panic(env, &model, "borrow_rate", (util,));
    let interest = checked_interest_product(pool.total_borrowed, rate_bps as u128, elapsed)?;

    if interest > 0 {
        let to_reserves = mul_div(interest, pool.reserve_factor_bps as u128, BPS_SCALE_U128)?;
        let to_suppliers = interest - to_reserves;

        // Borrow side: every debt grows by interest / total_borrowed.
        let delta = mul_div(pool.borrow_index, interest, pool.total_borrowed)?;
        pool.borrow_index = pool
            .borrow_index
            .checked_add(delta)
            .ok_or(Error::MathOverflow)?;

        // Supply side: the suppliers' share is spread over their claim,
        // which excludes protocol reserves.
        let supplier_claim = pool.total_supplied - pool.reserves;
        if to_suppliers > 0 && supplier_claim > 0 {
            let delta = mul_div(pool.supply_index, to_suppliers, supplier_claim)?;
            pool.supply_index = pool
                .supply_index
                .checked_add(delta)
                .ok_or(Error::MathOverflow)?;
        }

        // Both sides of the ledger grow by the full interest; the reserve
        // share is protocol-owned supply, so borrowed <= supplied survives
        // accrual at any utilization.
        pool.total_borrowed = pool
            .total_borrowed
            .checked_add(interest)
            .ok_or(Error::MathOverflow)?;
        pool.total_supplied = pool
            .total_supplied
            .checked_add(interest)
            .ok_or(Error::MathOverflow)?;
        pool.reserves = pool
            .reserves
            .checked_add(to_reserves)
            .ok_or(Error::MathOverflow)?;

        InterestAccrued {
            pool_id,
            interest_accumulated: interest,
            borrow_index: pool.borrow_index,
            total_borrows: pool.total_borrowed,
        }
        .publish(env);
    }
    pool.last_accrual = now;
    Ok(())
}

/// Bring a position's balances up to the pool's current indexes. With no
/// intervening accrual both factors are exactly one.
fn settle_position(pool: &PoolState, pos: &mut AccountPosition) -> Result<(), Error> {
    if pos.supply_snapshot != pool.supply_index {
        if pos.supplied > 0 {
            pos.supplied = mul_div(pos.supplied, pool.supply_index, pos.supply_snapshot)?;
        }
        pos.supply_snapshot = pool.supply_index;
    }
    if pos.borrow_snapshot != pool.borrow_index {
        if pos.borrowed > 0 {
            pos.borrowed = mul_div(pos.borrowed, pool.borrow_index, pos.borrow_snapshot)?;
        }
        pos.borrow_snapshot = pool.borrow_index;
    }
    Ok(())
}

/// Collateral sufficiency at the oracle price:
/// debt value must not exceed collateral value discounted by the pool's
/// collateral factor.
fn collateral_covers(
    env: &Env,
    pool: &PoolState,
    debt: u128,
    collateral: u128,
) -> Result<bool, Error> {
    if debt == 0 {
        return Ok(true);
    }
    let oracle = config_address(env, DataKey::Oracle)?;
    let (price, scale) = fetch_price(env, &oracle, &pool.asset)?;
    let debt_value = mul_div(debt, price, scale)?;
    let collateral_value = mul_div(collateral, price, scale)?;
    let capacity = mul_div(
        collateral_value,
        pool.collateral_factor_bps as u128,
        BPS_SCALE_U128,
    )?;
    Ok(debt_value <= capacity)
}
