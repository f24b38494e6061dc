#![cfg(test)]

use super::*;

use fee_collector::{FeeCollector, FeeCollectorClient};
use interest_rate_model::{InterestRateModel, InterestRateModelClient};
use mock_oracle::{MockOracle, MockOracleClient};
use soroban_sdk::{
    testutils::{Address as _, Ledger},
    token::{Client as TokenClient, StellarAssetClient},
    vec, Address, Env, String,
};

const T0: u64 = 1_700_000_000;
const YEAR: u64 = 365 * 24 * 60 * 60;
const PRICE_ONE: i128 = 10_000_000; // price 1.0 at 7 feed decimals
const CREATION_FEE: u128 = 100;

struct Harness<'a> {
    owner: Address,
    asset: Address,
    asset_admin: StellarAssetClient<'a>,
    asset_token: TokenClient<'a>,
    fee_token: TokenClient<'a>,
    model: InterestRateModelClient<'a>,
    oracle: MockOracleClient<'a>,
    collector: FeeCollectorClient<'a>,
    factory: PoolFactoryClient<'a>,
    pool_id: u64,
}

/// One pool over one stellar asset: curve 200/1000/2000 kink 8000, price
/// 1.0, collateral factor 7500, reserve factor 1000, creation fee 100.
fn setup(env: &Env) -> Harness<'_> {
    env.mock_all_auths();
    env.ledger().set_timestamp(T0);

    let owner = Address::generate(env);
    let treasury = Address::generate(env);

    let asset = env
        .register_stellar_asset_contract_v2(owner.clone())
        .address();
    let fee_asset = env
        .register_stellar_asset_contract_v2(owner.clone())
        .address();
    StellarAssetClient::new(env, &fee_asset).mint(&owner, &1_000_000i128);

    let model_id = env.register(InterestRateModel, ());
    let model = InterestRateModelClient::new(env, &model_id);
    model.initialize(&owner, &200u32, &1000u32, &2000u32, &8000u32);

    let oracle_id = env.register(MockOracle, ());
    let oracle = MockOracleClient::new(env, &oracle_id);
    oracle.initialize(&7u32, &300u32);
    oracle.set_price(&asset, &PRICE_ONE);

    let collector_id = env.register(FeeCollector, ());
    let collector = FeeCollectorClient::new(env, &collector_id);
    collector.initialize(&owner, &fee_asset, &CREATION_FEE, &1000u32, &treasury);

    let factory_id = env.register(PoolFactory, ());
    let factory = PoolFactoryClient::new(env, &factory_id);
    factory.initialize(&owner, &model_id, &oracle_id, &collector_id);
    collector.authorize_caller(&owner, &factory_id);

    let pool_id = factory.create_pool(
        &owner,
        &asset,
        &String::from_str(env, "Pool A"),
        &String::from_str(env, "PLA"),
        &7500u32,
        &1000u32,
        &CREATION_FEE,
    );

    Harness {
        owner,
        asset_admin: StellarAssetClient::new(env, &asset),
        asset_token: TokenClient::new(env, &asset),
        fee_token: TokenClient::new(env, &fee_asset),
        asset,
        model,
        oracle,
        collector,
        factory,
        pool_id,
    }
}

fn register_priced_asset(env: &Env, h: &Harness) -> Address {
    let asset = env
        .register_stellar_asset_contract_v2(h.owner.clone())
        .address();
    h.oracle.set_price(&asset, &PRICE_ONE);
    asset
}

#[test]
fn create_pool_registers_and_charges_fee() {
    let env = Env::default();
    let h = setup(&env);

    assert_eq!(h.pool_id, 1u64);
    assert_eq!(h.factory.get_pool(&h.asset), Some(1u64));
    assert_eq!(h.factory.get_all_pools(), vec![&env, 1u64]);
    assert_eq!(h.factory.owner(), h.owner);
    assert_eq!(h.collector.get_accumulated_balance(), CREATION_FEE);
    assert_eq!(h.fee_token.balance(&h.owner), (1_000_000 - 100) as i128);

    assert_eq!(h.factory.total_supplied(&1u64), 0u128);
    assert_eq!(h.factory.total_borrowed(&1u64), 0u128);
    assert_eq!(h.factory.utilization_bps(&1u64), 0u32);
    assert_eq!(h.factory.collateral_factor_bps(&1u64), 7500u32);
    assert_eq!(h.factory.reserve_factor_bps(&1u64), 1000u32);
}

#[test]
fn create_pool_short_fee_is_atomic() {
    let env = Env::default();
    let h = setup(&env);
    let asset_b = register_priced_asset(&env, &h);

    let before = h.fee_token.balance(&h.owner);
    assert_eq!(
        h.factory.try_create_pool(
            &h.owner,
            &asset_b,
            &String::from_str(&env, "Pool B"),
            &String::from_str(&env, "PLB"),
            &7500u32,
            &1000u32,
            &99u128,
        ),
        Err(Ok(Error::InsufficientFee))
    );
    // Nothing happened: no registration, no fee movement.
    assert_eq!(h.factory.get_pool(&asset_b), None);
    assert_eq!(h.factory.get_all_pools(), vec![&env, 1u64]);
    assert_eq!(h.collector.get_accumulated_balance(), CREATION_FEE);
    assert_eq!(h.fee_token.balance(&h.owner), before);
}

#[test]
fn create_pool_is_unique_per_asset() {
    let env = Env::default();
    let h = setup(&env);

    assert_eq!(
        h.factory.try_create_pool(
            &h.owner,
            &h.asset,
            &String::from_str(&env, "Pool A again"),
            &String::from_str(&env, "PLA2"),
            &5000u32,
            &0u32,
            &CREATION_FEE,
        ),
        Err(Ok(Error::PoolAlreadyExists))
    );
}

#[test]
fn create_pool_owner_only() {
    let env = Env::default();
    let h = setup(&env);
    let stranger = Address::generate(&env);
    let asset_b = register_priced_asset(&env, &h);

    assert_eq!(
        h.factory.try_create_pool(
            &stranger,
            &asset_b,
            &String::from_str(&env, "Pool B"),
            &String::from_str(&env, "PLB"),
            &7500u32,
            &1000u32,
            &CREATION_FEE,
        ),
        Err(Ok(Error::NotOwner))
    );
}

#[test]
fn create_pool_validates_factors() {
    let env = Env::default();
    let h = setup(&env);
    let asset_b = register_priced_asset(&env, &h);

    assert_eq!(
        h.factory.try_create_pool(
            &h.owner,
            &asset_b,
            &String::from_str(&env, "Pool B"),
            &String::from_str(&env, "PLB"),
            &9500u32,
            &1000u32,
            &CREATION_FEE,
        ),
        Err(Ok(Error::InvalidCollateralFactor))
    );
    assert_eq!(
        h.factory.try_create_pool(
            &h.owner,
            &asset_b,
            &String::from_str(&env, "Pool B"),
            &String::from_str(&env, "PLB"),
            &7500u32,
            &10_000u32,
            &CREATION_FEE,
        ),
        Err(Ok(Error::InvalidReserveFactor))
    );
}

#[test]
fn create_pool_probes_the_asset() {
    let env = Env::default();
    let h = setup(&env);

    // The oracle contract is not a token; the balance probe fails.
    assert_eq!(
        h.factory.try_create_pool(
            &h.owner,
            &h.oracle.address,
            &String::from_str(&env, "Bogus"),
            &String::from_str(&env, "BOG"),
            &7500u32,
            &1000u32,
            &CREATION_FEE,
        ),
        Err(Ok(Error::InvalidAsset))
    );
}

#[test]
fn initialize_only_once() {
    let env = Env::default();
    let h = setup(&env);
    assert_eq!(
        h.factory.try_initialize(
            &h.owner,
            &h.model.address,
            &h.oracle.address,
            &h.collector.address,
        ),
        Err(Ok(Error::AlreadyInitialized))
    );
}

#[test]
fn deposit_withdraw_round_trip() {
    let env = Env::default();
    let h = setup(&env);
    let user = Address::generate(&env);
    h.asset_admin.mint(&user, &1_000i128);

    h.factory.deposit(&1u64, &user, &250u128);
    assert_eq!(h.factory.total_supplied(&1u64), 250u128);
    assert_eq!(h.factory.supplied_balance(&1u64, &user), 250u128);
    assert_eq!(h.asset_token.balance(&user), 750i128);
    assert_eq!(h.asset_token.balance(&h.factory.address), 250i128);

    // Immediate withdrawal restores everything to the unit.
    h.factory.withdraw(&1u64, &user, &250u128);
    assert_eq!(h.factory.total_supplied(&1u64), 0u128);
    assert_eq!(h.factory.supplied_balance(&1u64, &user), 0u128);
    assert_eq!(h.asset_token.balance(&user), 1_000i128);
    assert_eq!(h.asset_token.balance(&h.factory.address), 0i128);
}

#[test]
fn zero_amounts_rejected() {
    let env = Env::default();
    let h = setup(&env);
    let user = Address::generate(&env);
    h.asset_admin.mint(&user, &1_000i128);

    assert_eq!(
        h.factory.try_deposit(&1u64, &user, &0u128),
        Err(Ok(Error::ZeroAmount))
    );
    assert_eq!(
        h.factory.try_withdraw(&1u64, &user, &0u128),
        Err(Ok(Error::ZeroAmount))
    );
    assert_eq!(
        h.factory.try_deposit_collateral(&1u64, &user, &0u128),
        Err(Ok(Error::ZeroAmount))
    );
    assert_eq!(
        h.factory.try_withdraw_collateral(&1u64, &user, &0u128),
        Err(Ok(Error::ZeroAmount))
    );
    assert_eq!(
        h.factory.try_borrow(&1u64, &user, &0u128),
        Err(Ok(Error::ZeroAmount))
    );
    assert_eq!(
        h.factory.try_repay(&1u64, &user, &0u128),
        Err(Ok(Error::ZeroAmount))
    );
    assert_eq!(
        h.factory.try_withdraw_reserves(&h.owner, &1u64, &0u128),
        Err(Ok(Error::ZeroAmount))
    );
}

#[test]
fn unknown_pool_is_rejected() {
    let env = Env::default();
    let h = setup(&env);
    let user = Address::generate(&env);
    assert_eq!(
        h.factory.try_deposit(&99u64, &user, &10u128),
        Err(Ok(Error::PoolNotFound))
    );
    assert_eq!(
        h.factory.try_total_supplied(&99u64),
        Err(Ok(Error::PoolNotFound))
    );
}

#[test]
fn withdraw_respects_balances_and_utilization() {
    let env = Env::default();
    let h = setup(&env);
    let supplier = Address::generate(&env);
    let borrower = Address::generate(&env);
    h.asset_admin.mint(&supplier, &1_000i128);
    h.asset_admin.mint(&borrower, &1_000i128);

    h.factory.deposit(&1u64, &supplier, &100u128);
    h.factory.deposit_collateral(&1u64, &borrower, &200u128);
    h.factory.borrow(&1u64, &borrower, &60u128);

    assert_eq!(
        h.factory.try_withdraw(&1u64, &supplier, &150u128),
        Err(Ok(Error::InsufficientSupply))
    );
    // 100 - 50 = 50 would leave less than the 60 out on loan.
    assert_eq!(
        h.factory.try_withdraw(&1u64, &supplier, &50u128),
        Err(Ok(Error::UtilizationExceeded))
    );
    // 100 - 40 = 60 exactly covers the loan.
    h.factory.withdraw(&1u64, &supplier, &40u128);
    assert_eq!(h.factory.total_supplied(&1u64), 60u128);
    assert_eq!(h.factory.utilization_bps(&1u64), 10_000u32);
}

#[test]
fn borrow_limits_follow_collateral_factor() {
    let env = Env::default();
    let h = setup(&env);
    let supplier = Address::generate(&env);
    let borrower = Address::generate(&env);
    h.asset_admin.mint(&supplier, &1_000i128);
    h.asset_admin.mint(&borrower, &1_000i128);

    h.factory.deposit(&1u64, &supplier, &100u128);
    h.factory.deposit_collateral(&1u64, &borrower, &100u128);
    assert_eq!(h.factory.collateral_balance(&1u64, &borrower), 100u128);

    // cf 7500 and price 1: capacity is 75.
    assert_eq!(
        h.factory.try_borrow(&1u64, &borrower, &76u128),
        Err(Ok(Error::CollateralInsufficient))
    );
    h.factory.borrow(&1u64, &borrower, &75u128);
    assert_eq!(h.factory.borrow_balance(&1u64, &borrower), 75u128);
    assert_eq!(h.factory.total_borrowed(&1u64), 75u128);

    // Fully borrowed against: not a single unit of collateral releases.
    assert_eq!(
        h.factory.try_withdraw_collateral(&1u64, &borrower, &1u128),
        Err(Ok(Error::CollateralLocked))
    );
    assert_eq!(
        h.factory.try_withdraw_collateral(&1u64, &borrower, &200u128),
        Err(Ok(Error::CollateralLocked))
    );

    // After full repayment the collateral is free again.
    h.factory.repay(&1u64, &borrower, &75u128);
    h.factory.withdraw_collateral(&1u64, &borrower, &100u128);
    assert_eq!(h.factory.collateral_balance(&1u64, &borrower), 0u128);
}

#[test]
fn borrow_cannot_exceed_pool_liquidity() {
    let env = Env::default();
    let h = setup(&env);
    let supplier = Address::generate(&env);
    let borrower = Address::generate(&env);
    h.asset_admin.mint(&supplier, &1_000i128);
    h.asset_admin.mint(&borrower, &1_000i128);

    h.factory.deposit(&1u64, &supplier, &100u128);
    h.factory.deposit_collateral(&1u64, &borrower, &1_000u128);

    assert_eq!(
        h.factory.try_borrow(&1u64, &borrower, &150u128),
        Err(Ok(Error::PoolLiquidityExceeded))
    );
    h.factory.borrow(&1u64, &borrower, &100u128);
    assert_eq!(h.factory.available_liquidity(&1u64), 0u128);
}

#[test]
fn repay_caps_at_outstanding_debt() {
    let env = Env::default();
    let h = setup(&env);
    let supplier = Address::generate(&env);
    let borrower = Address::generate(&env);
    h.asset_admin.mint(&supplier, &1_000i128);
    h.asset_admin.mint(&borrower, &1_000i128);

    h.factory.deposit(&1u64, &supplier, &100u128);
    h.factory.deposit_collateral(&1u64, &borrower, &100u128);
    h.factory.borrow(&1u64, &borrower, &75u128);

    let before = h.asset_token.balance(&borrower);
    h.factory.repay(&1u64, &borrower, &1_000u128);
    // Only the 75 outstanding moved.
    assert_eq!(h.asset_token.balance(&borrower), before - 75i128);
    assert_eq!(h.factory.borrow_balance(&1u64, &borrower), 0u128);
    assert_eq!(h.factory.total_borrowed(&1u64), 0u128);

    // Repaying with no debt is a no-op.
    let before = h.asset_token.balance(&borrower);
    h.factory.repay(&1u64, &borrower, &50u128);
    assert_eq!(h.asset_token.balance(&borrower), before);
}

#[test]
fn accrual_splits_interest_and_keeps_invariant() {
    let env = Env::default();
    let h = setup(&env);
    let supplier = Address::generate(&env);
    let borrower = Address::generate(&env);
    h.asset_admin.mint(&supplier, &100_000i128);
    h.asset_admin.mint(&borrower, &100_000i128);

    h.factory.deposit(&1u64, &supplier, &10_000u128);
    h.factory.deposit_collateral(&1u64, &borrower, &20_000u128);
    h.factory.borrow(&1u64, &borrower, &5_000u128);
    assert_eq!(h.factory.utilization_bps(&1u64), 5_000u32);
    // Curve at 50%: 200 + 5000 * 1000 / 10000 = 700 bps.
    // Supply side: 700 * 5000/10000 * 9000/10000 = 315 bps.
    assert_eq!(h.factory.supply_rate_bps(&1u64), 315u32);

    env.ledger().set_timestamp(T0 + YEAR);
    h.factory.accrue_interest(&1u64);

    // One year at 700 bps on 5000 borrowed: 350 interest, 10% to reserves.
    assert_eq!(h.factory.total_borrowed(&1u64), 5_350u128);
    assert_eq!(h.factory.total_supplied(&1u64), 10_350u128);
    assert_eq!(h.factory.reserves(&1u64), 35u128);
    assert_eq!(h.factory.borrow_balance(&1u64, &borrower), 5_350u128);
    assert_eq!(h.factory.supplied_balance(&1u64, &supplier), 10_315u128);

    let state = h.factory.get_pool_state(&1u64);
    assert!(state.total_borrowed <= state.total_supplied);

    // Accruing again at the same instant changes nothing.
    h.factory.accrue_interest(&1u64);
    assert_eq!(h.factory.total_borrowed(&1u64), 5_350u128);
    assert_eq!(h.factory.total_supplied(&1u64), 10_350u128);
    assert_eq!(h.factory.reserves(&1u64), 35u128);
}

#[test]
fn accrued_interest_is_realized_on_exit() {
    let env = Env::default();
    let h = setup(&env);
    let supplier = Address::generate(&env);
    let borrower = Address::generate(&env);
    h.asset_admin.mint(&supplier, &100_000i128);
    h.asset_admin.mint(&borrower, &100_000i128);

    h.factory.deposit(&1u64, &supplier, &10_000u128);
    h.factory.deposit_collateral(&1u64, &borrower, &20_000u128);
    h.factory.borrow(&1u64, &borrower, &5_000u128);

    env.ledger().set_timestamp(T0 + YEAR);

    // The borrower owes 5350 and pays it all back; the supplier can then
    // redeem principal plus their 315 share.
    h.factory.repay(&1u64, &borrower, &6_000u128);
    assert_eq!(h.factory.total_borrowed(&1u64), 0u128);
    h.factory.withdraw(&1u64, &supplier, &10_315u128);
    assert_eq!(h.asset_token.balance(&supplier), 100_315i128);
    // What remains of the pool is exactly the protocol's cut.
    assert_eq!(h.factory.total_supplied(&1u64), 35u128);
    assert_eq!(h.factory.reserves(&1u64), 35u128);
}

#[test]
fn reserves_withdrawal_is_owner_gated_and_bounded() {
    let env = Env::default();
    let h = setup(&env);
    let supplier = Address::generate(&env);
    let borrower = Address::generate(&env);
    h.asset_admin.mint(&supplier, &100_000i128);
    h.asset_admin.mint(&borrower, &100_000i128);

    h.factory.deposit(&1u64, &supplier, &10_000u128);
    h.factory.deposit_collateral(&1u64, &borrower, &20_000u128);
    h.factory.borrow(&1u64, &borrower, &5_000u128);
    env.ledger().set_timestamp(T0 + YEAR);
    h.factory.accrue_interest(&1u64);
    assert_eq!(h.factory.reserves(&1u64), 35u128);

    let stranger = Address::generate(&env);
    assert_eq!(
        h.factory.try_withdraw_reserves(&stranger, &1u64, &10u128),
        Err(Ok(Error::NotOwner))
    );
    assert_eq!(
        h.factory.try_withdraw_reserves(&h.owner, &1u64, &36u128),
        Err(Ok(Error::InsufficientReserves))
    );

    let before = h.asset_token.balance(&h.owner);
    h.factory.withdraw_reserves(&h.owner, &1u64, &35u128);
    assert_eq!(h.factory.reserves(&1u64), 0u128);
    assert_eq!(h.factory.total_supplied(&1u64), 10_315u128);
    assert_eq!(h.asset_token.balance(&h.owner), before + 35i128);
}

#[test]
fn oracle_outage_blocks_collateral_checks() {
    let env = Env::default();
    let h = setup(&env);
    let supplier = Address::generate(&env);
    let borrower = Address::generate(&env);
    h.asset_admin.mint(&supplier, &1_000i128);
    h.asset_admin.mint(&borrower, &1_000i128);

    h.factory.deposit(&1u64, &supplier, &100u128);
    h.factory.deposit_collateral(&1u64, &borrower, &100u128);

    h.oracle.remove_price(&h.asset);
    assert_eq!(
        h.factory.try_borrow(&1u64, &borrower, &10u128),
        Err(Ok(Error::OracleUnavailable))
    );
    // Debt-free collateral withdrawal needs no price.
    h.factory.withdraw_collateral(&1u64, &borrower, &40u128);

    // A quote older than twice the feed resolution is stale.
    h.oracle.set_price_at(&h.asset, &PRICE_ONE, &(T0 - 10_000));
    assert_eq!(
        h.factory.try_borrow(&1u64, &borrower, &10u128),
        Err(Ok(Error::OracleUnavailable))
    );

    h.oracle.set_price(&h.asset, &PRICE_ONE);
    h.factory.borrow(&1u64, &borrower, &10u128);
    // With debt outstanding, an outage also pins the collateral.
    h.oracle.remove_price(&h.asset);
    assert_eq!(
        h.factory.try_withdraw_collateral(&1u64, &borrower, &10u128),
        Err(Ok(Error::OracleUnavailable))
    );
}

#[test]
fn caps_bound_supply_and_borrows() {
    let env = Env::default();
    let h = setup(&env);
    let supplier = Address::generate(&env);
    let borrower = Address::generate(&env);
    h.asset_admin.mint(&supplier, &1_000i128);
    h.asset_admin.mint(&borrower, &1_000i128);

    let stranger = Address::generate(&env);
    assert_eq!(
        h.factory.try_set_supply_cap(&stranger, &1u64, &500u128),
        Err(Ok(Error::NotOwner))
    );

    h.factory.set_supply_cap(&h.owner, &1u64, &500u128);
    assert_eq!(
        h.factory.try_deposit(&1u64, &supplier, &600u128),
        Err(Ok(Error::SupplyCapExceeded))
    );
    h.factory.deposit(&1u64, &supplier, &400u128);

    h.factory.set_borrow_cap(&h.owner, &1u64, &50u128);
    h.factory.deposit_collateral(&1u64, &borrower, &100u128);
    assert_eq!(
        h.factory.try_borrow(&1u64, &borrower, &60u128),
        Err(Ok(Error::BorrowCapExceeded))
    );
    h.factory.borrow(&1u64, &borrower, &50u128);
}

#[test]
fn pools_do_not_interfere() {
    let env = Env::default();
    let h = setup(&env);
    let asset_b = register_priced_asset(&env, &h);
    let pool_b = h.factory.create_pool(
        &h.owner,
        &asset_b,
        &String::from_str(&env, "Pool B"),
        &String::from_str(&env, "PLB"),
        &5000u32,
        &2000u32,
        &CREATION_FEE,
    );
    assert_eq!(pool_b, 2u64);
    assert_eq!(h.factory.get_all_pools(), vec![&env, 1u64, 2u64]);
    assert_eq!(h.factory.get_pool(&asset_b), Some(2u64));

    let user = Address::generate(&env);
    h.asset_admin.mint(&user, &1_000i128);
    StellarAssetClient::new(&env, &asset_b).mint(&user, &1_000i128);

    h.factory.deposit(&1u64, &user, &300u128);
    h.factory.deposit(&2u64, &user, &40u128);

    assert_eq!(h.factory.total_supplied(&1u64), 300u128);
    assert_eq!(h.factory.total_supplied(&2u64), 40u128);
    assert_eq!(h.factory.collateral_factor_bps(&2u64), 5000u32);

    h.factory.withdraw(&2u64, &user, &40u128);
    assert_eq!(h.factory.total_supplied(&1u64), 300u128);
    assert_eq!(h.factory.total_supplied(&2u64), 0u128);
}

#[test]
fn collector_failures_do_not_leak_pools() {
    let env = Env::default();
    let h = setup(&env);
    let asset_b = register_priced_asset(&env, &h);

    // Revoking the factory makes collection fail; the factory reports the
    // fee step as the culprit and registers nothing.
    h.collector.revoke_caller(&h.owner, &h.factory.address);
    assert_eq!(
        h.factory.try_create_pool(
            &h.owner,
            &asset_b,
            &String::from_str(&env, "Pool B"),
            &String::from_str(&env, "PLB"),
            &7500u32,
            &1000u32,
            &CREATION_FEE,
        ),
        Err(Ok(Error::InsufficientFee))
    );
    assert_eq!(h.factory.get_pool(&asset_b), None);
    assert_eq!(h.collector.get_accumulated_balance(), CREATION_FEE);
}

#[test]
fn owner_handover() {
    let env = Env::default();
    let h = setup(&env);
    let new_owner = Address::generate(&env);
    h.factory.set_owner(&h.owner, &new_owner);
    assert_eq!(h.factory.owner(), new_owner);
    assert_eq!(
        h.factory.try_set_supply_cap(&h.owner, &1u64, &1u128),
        Err(Ok(Error::NotOwner))
    );
}
