/// Result alias with the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while configuring or running a backtest.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The initial cash is not positive. Simulation requires a positive balance.
    #[error("Initial cash must be positive and finite (got: {0})")]
    NegZeroCash(f64),

    /// The stop-loss fraction is not positive.
    #[error("Stop-loss fraction must be positive and finite (got: {0})")]
    NegZeroStopLoss(f64),

    /// The take-profit fraction is not positive.
    #[error("Take-profit fraction must be positive and finite (got: {0})")]
    NegZeroTakeProfit(f64),

    /// A fee rate is negative or not finite. Carries the name of the rate and its value.
    #[error("Fee rate `{0}` must be non-negative and finite (got: {1})")]
    NegFeeRate(&'static str, f64),

    /// The sizing parameter (share count or risk fraction) is not positive.
    #[error("Sizing value must be positive and finite (got: {0})")]
    NegZeroSizing(f64),

    /// A bar carries a price that is zero, negative or not finite.
    #[error("Bar price must be positive and finite (got: {0})")]
    InvalidPrice(f64),

    /// A bar carries a signal outside {-1, 0, 1}.
    #[error("Signal must be one of -1, 0 or 1 (got: {0})")]
    InvalidSignal(i64),

    /// A timestamp could not be parsed.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A bar builder was finalized without a required field.
    #[error("Missing bar field: {0}")]
    MissingField(&'static str),

    /// The position was not found.
    #[error("Position not found")]
    PositionNotFound,

    /// A position was opened while the opposite direction still holds exposure.
    #[error("Cannot open a position while {0:?} positions are open")]
    OppositeExposure(crate::engine::PositionSide),

    /// The split ratios are negative or do not add up to one.
    #[error("Split ratios must be non-negative and sum to 1 (got: {0}, {1}, {2})")]
    InvalidSplit(f64, f64, f64),

    /// An indicator could not be built (e.g. a zero period).
    #[error("Indicator error: {0}")]
    Indicator(String),

    /// Custom error message.
    #[error("{0}")]
    Msg(String),

    /// Chart rendering failed.
    #[cfg(feature = "draws")]
    #[error("Plotters error: {0}")]
    Plotters(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error occurred.
    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// CSV reading error occurred.
    #[cfg(feature = "serde")]
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

#[cfg(test)]
#[test]
fn fee_rate_error_names_the_rate() {
    let error = Error::NegFeeRate("short_fee_rate_addon", -0.5);
    assert_eq!(
        error.to_string(),
        "Fee rate `short_fee_rate_addon` must be non-negative and finite (got: -0.5)"
    );
}
