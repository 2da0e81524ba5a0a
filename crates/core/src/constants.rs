/// Attribution key reported on every output row
pub const PORTFOLIO_TOTAL_KEY: &str = "TOTAL";

/// Decimal places used when rounding the day-return correction
pub const CORRECTION_PRECISION: u32 = 6;

/// Decimal places used for flow amounts
pub const FLOW_PRECISION: u32 = 2;

/// Default tolerance (decimal places) for the pnl cross-check
pub const DEFAULT_PNL_PRECISION: u32 = 2;

/// Default number of trading days used to annualise volatility
pub const DEFAULT_TRADING_DAYS_PER_YEAR: u32 = 252;

/// Format version stamped on newly created blocks
pub const BLOCK_FORMAT_VERSION: &str = "0.0.1";
