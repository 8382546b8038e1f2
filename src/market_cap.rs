use crate::utils::is_positive_finite;

/// Market capitalization is reported in billions of the quote currency.
pub const MARKET_CAP_UNIT: f64 = 1e9;

pub struct MarketCapCalculator;

impl MarketCapCalculator {
    /// `price * shares / 1e9`, or `None` when either input is missing, zero or negative,
    /// or the product is not a finite number.
    pub fn compute(price: Option<f64>, shares: Option<f64>) -> Option<f64> {
        let price = price.filter(|p| is_positive_finite(*p))?;
        let shares = shares.filter(|s| is_positive_finite(*s))?;
        let market_cap = price * shares / MARKET_CAP_UNIT;
        market_cap.is_finite().then_some(market_cap)
    }
}
