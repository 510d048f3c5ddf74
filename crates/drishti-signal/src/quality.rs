//! Setup-quality scoring from the layer scores.

use drishti_models::{idx, FeatureVector, SetupQuality};

/// Layer weights: structure, options, technical, blocking, multi-timeframe.
const WEIGHTS: [f64; 5] = [0.25, 0.20, 0.20, 0.20, 0.15];

/// Weighted layer score Q in [0, 1].
pub fn weighted_score(fv: &FeatureVector) -> f64 {
    let layers = [
        fv.get(idx::L1_STRUCTURE),
        fv.get(idx::L2_OPTIONS),
        fv.get(idx::L3_TECHNICAL),
        fv.get(idx::L4_BLOCKING),
        fv.get(idx::L5_MTF),
    ];
    layers
        .iter()
        .zip(WEIGHTS.iter())
        .map(|(l, w)| l.clamp(0.0, 1.0) * w)
        .sum()
}

/// Bucket Q into the setup-quality grade.
pub fn score(fv: &FeatureVector) -> SetupQuality {
    bucket(weighted_score(fv))
}

pub fn bucket(q: f64) -> SetupQuality {
    if q >= 0.75 {
        SetupQuality::Excellent
    } else if q >= 0.55 {
        SetupQuality::Strong
    } else if q >= 0.35 {
        SetupQuality::Moderate
    } else {
        SetupQuality::Weak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fv(l: [f64; 5]) -> FeatureVector {
        let mut fv = FeatureVector::default();
        fv.set(idx::L1_STRUCTURE, l[0]);
        fv.set(idx::L2_OPTIONS, l[1]);
        fv.set(idx::L3_TECHNICAL, l[2]);
        fv.set(idx::L4_BLOCKING, l[3]);
        fv.set(idx::L5_MTF, l[4]);
        fv
    }

    #[test]
    fn bucket_boundaries() {
        assert_eq!(bucket(0.349), SetupQuality::Weak);
        assert_eq!(bucket(0.35), SetupQuality::Moderate);
        assert_eq!(bucket(0.549), SetupQuality::Moderate);
        assert_eq!(bucket(0.55), SetupQuality::Strong);
        assert_eq!(bucket(0.75), SetupQuality::Excellent);
    }

    #[test]
    fn uniform_layers_score_the_same() {
        let v = fv([0.61; 5]);
        assert!((weighted_score(&v) - 0.61).abs() < 1e-9);
        assert_eq!(score(&v), SetupQuality::Strong);
    }

    #[test]
    fn layers_clamped_before_weighting() {
        let v = fv([2.0, -1.0, 0.5, 0.5, 0.5]);
        let q = weighted_score(&v);
        assert!((0.0..=1.0).contains(&q));
    }
}
