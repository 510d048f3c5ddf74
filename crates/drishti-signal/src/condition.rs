//! Market-condition classification.
//!
//! Pure function of the feature vector. Ties resolve to the
//! higher-volatility bucket, so the rules are checked from EXTREME down.

use drishti_models::{idx, FeatureVector, MarketCondition};

/// ATR thresholds (index points) separating the volatility bands.
const ATR_QUIET_MAX: f64 = 13.0;
const ATR_HIGH_MIN: f64 = 22.0;
const ATR_EXTREME_MIN: f64 = 45.0;

/// Classify the prevailing condition from volatility and participation.
pub fn classify(fv: &FeatureVector) -> MarketCondition {
    let atr = fv.get(idx::ATR_14);
    let range_pctile = fv.get(idx::RANGE_PCTILE_78);
    let vov_z = fv.get(idx::VOL_OF_VOL_Z);
    let rsi = fv.get(idx::RSI_14);
    let vol_z = fv.get(idx::VOLUME_ZSCORE);

    if atr >= ATR_EXTREME_MIN || range_pctile >= 95.0 || vov_z >= 2.5 {
        return MarketCondition::Extreme;
    }

    let rsi_stretched = !(30.0..=70.0).contains(&rsi);
    if atr >= ATR_HIGH_MIN || (rsi_stretched && vol_z >= 1.5) {
        return MarketCondition::High;
    }

    if atr < ATR_QUIET_MAX && range_pctile <= 25.0 {
        return MarketCondition::Quiet;
    }

    // ATR in [13, 22), plus the low-ATR tape that is not quiet enough on
    // realized range (higher bucket wins the tie).
    MarketCondition::Normal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fv(atr: f64, range_pctile: f64) -> FeatureVector {
        let mut fv = FeatureVector::default();
        fv.set(idx::ATR_14, atr);
        fv.set(idx::RANGE_PCTILE_78, range_pctile);
        fv.set(idx::RSI_14, 50.0);
        fv
    }

    #[test]
    fn atr_boundaries() {
        assert_eq!(classify(&fv(13.0, 10.0)), MarketCondition::Normal);
        assert_eq!(classify(&fv(12.999, 10.0)), MarketCondition::Quiet);
        assert_eq!(classify(&fv(22.0, 10.0)), MarketCondition::High);
        assert_eq!(classify(&fv(45.0, 10.0)), MarketCondition::Extreme);
        assert_eq!(classify(&fv(17.0, 50.0)), MarketCondition::Normal);
    }

    #[test]
    fn extreme_on_realized_range_or_vol_of_vol() {
        assert_eq!(classify(&fv(17.0, 95.0)), MarketCondition::Extreme);

        let mut v = fv(17.0, 50.0);
        v.set(idx::VOL_OF_VOL_Z, 2.5);
        assert_eq!(classify(&v), MarketCondition::Extreme);
    }

    #[test]
    fn high_on_stretched_rsi_with_volume() {
        let mut v = fv(17.0, 50.0);
        v.set(idx::RSI_14, 78.0);
        v.set(idx::VOLUME_ZSCORE, 1.5);
        assert_eq!(classify(&v), MarketCondition::High);

        // Stretched RSI without volume confirmation stays NORMAL.
        let mut calm = fv(17.0, 50.0);
        calm.set(idx::RSI_14, 78.0);
        calm.set(idx::VOLUME_ZSCORE, 0.5);
        assert_eq!(classify(&calm), MarketCondition::Normal);
    }

    #[test]
    fn quiet_needs_both_low_atr_and_low_range() {
        assert_eq!(classify(&fv(10.0, 25.0)), MarketCondition::Quiet);
        assert_eq!(classify(&fv(10.0, 40.0)), MarketCondition::Normal);
    }

    #[test]
    fn classification_is_deterministic() {
        let v = fv(17.0, 50.0);
        let first = classify(&v);
        for _ in 0..10 {
            assert_eq!(classify(&v), first);
        }
    }
}
