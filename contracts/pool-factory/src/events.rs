use soroban_sdk::{contractevent, Address};

/// Audit record for pool creation: who, which asset, which pool, what fee.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolCreated {
    #[topic]
    pub creator: Address,
    #[topic]
    pub asset: Address,
    pub timestamp: u64,
    pub pool_id: u64,
    pub fee_paid: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Deposit {
    #[topic]
    pub account: Address,
    pub pool_id: u64,
    pub amount: u128,
    pub total_supplied: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Withdraw {
    #[topic]
    pub account: Address,
    pub pool_id: u64,
    pub amount: u128,
    pub total_supplied: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CollateralDeposited {
    #[topic]
    pub account: Address,
    pub pool_id: u64,
    pub amount: u128,
    pub collateral: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CollateralWithdrawn {
    #[topic]
    pub account: Address,
    pub pool_id: u64,
    pub amount: u128,
    pub collateral: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Borrow {
    #[topic]
    pub borrower: Address,
    pub pool_id: u64,
    pub borrow_amount: u128,
    pub account_borrows: u128,
    pub total_borrows: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RepayBorrow {
    #[topic]
    pub payer: Address,
    pub pool_id: u64,
    pub repay_amount: u128,
    pub account_borrows: u128,
    pub total_borrows: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InterestAccrued {
    pub pool_id: u64,
    pub interest_accumulated: u128,
    pub borrow_index: u128,
    pub total_borrows: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReservesWithdrawn {
    pub pool_id: u64,
    pub amount: u128,
    pub total_reserves: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SupplyCapUpdated {
    pub pool_id: u64,
    pub supply_cap: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BorrowCapUpdated {
    pub pool_id: u64,
    pub borrow_cap: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewOwner {
    #[topic]
    pub owner: Address,
}
