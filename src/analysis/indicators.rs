use crate::domain::errors::{AnalysisError, AnalysisResult};
use rust_decimal::Decimal;

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }

    let mut sum = Decimal::ZERO;
    for value in values {
        sum = sum.checked_add(*value)?;
    }
    sum.checked_div(Decimal::from(values.len()))
}

/// Simple Moving Average (SMA) over the last `period` values
pub fn calculate_sma(prices: &[Decimal], period: usize) -> AnalysisResult<Decimal> {
    if period == 0 {
        return Err(AnalysisError::InvalidPeriod(
            "SMA period must be at least 1".to_string(),
        ));
    }

    if prices.len() < period {
        return Err(AnalysisError::InsufficientData(format!(
            "Not enough data for SMA calculation. Need at least {} points, got {}",
            period,
            prices.len()
        )));
    }

    mean(&prices[prices.len() - period..]).ok_or_else(|| {
        AnalysisError::InsufficientData(format!("SMA({}) overflowed the decimal range", period))
    })
}

/// Short SMA minus long SMA, both taken over the tail of `prices`
pub fn sma_spread(
    prices: &[Decimal],
    short_period: usize,
    long_period: usize,
) -> AnalysisResult<(Decimal, Decimal, Decimal)> {
    let short = calculate_sma(prices, short_period)?;
    let long = calculate_sma(prices, long_period)?;
    Ok((short, long, short - long))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[dec!(1), dec!(2), dec!(3), dec!(4)]), Some(dec!(2.5)));
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_sma_uses_tail_of_series() {
        let prices = vec![dec!(100), dec!(1), dec!(2), dec!(3)];
        assert_eq!(calculate_sma(&prices, 3).unwrap(), dec!(2));
        assert_eq!(calculate_sma(&prices, 4).unwrap(), dec!(26.5));
    }

    #[test]
    fn test_sma_rejects_short_series_and_zero_period() {
        let prices = vec![dec!(1), dec!(2)];
        assert!(matches!(
            calculate_sma(&prices, 3),
            Err(AnalysisError::InsufficientData(_))
        ));
        assert!(matches!(
            calculate_sma(&prices, 0),
            Err(AnalysisError::InvalidPeriod(_))
        ));
    }

    #[test]
    fn test_decimal_average_has_no_binary_rounding() {
        let prices = vec![dec!(0.1); 10];
        assert_eq!(calculate_sma(&prices, 10).unwrap(), dec!(0.1));
    }

    #[test]
    fn test_sma_spread() {
        let prices: Vec<Decimal> = (1..=20).map(Decimal::from).collect();
        let (short, long, spread) = sma_spread(&prices, 5, 20).unwrap();
        assert_eq!(short, dec!(18));
        assert_eq!(long, dec!(10.5));
        assert_eq!(spread, dec!(7.5));
    }
}
