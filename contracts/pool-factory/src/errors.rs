use soroban_sdk::contracterror;

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    NotOwner = 3,
    PoolAlreadyExists = 4,
    PoolNotFound = 5,
    InvalidAsset = 6,
    InvalidCollateralFactor = 7,
    InvalidReserveFactor = 8,
    InsufficientFee = 9,
    ZeroAmount = 10,
    InsufficientSupply = 11,
    UtilizationExceeded = 12,
    CollateralInsufficient = 13,
    CollateralLocked = 14,
    PoolLiquidityExceeded = 15,
    SupplyCapExceeded = 16,
    BorrowCapExceeded = 17,
    InsufficientReserves = 18,
    OracleUnavailable = 19,
    MathOverflow = 20,
}
