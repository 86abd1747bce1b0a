//! Chart geometry derived from statistics and explanation payloads.

use std::f64::consts::PI;

use crate::models::{CourseStatistics, RiskLevel, ShapExplanation, ShapFactor};

/// Floor for the largest factor magnitude so an all-zero explanation scales cleanly.
pub const MIN_FACTOR_MAGNITUDE: f64 = 0.001;

/// Narrowest bar drawn for a factor, in percent of the track.
pub const MIN_VISIBLE_WIDTH: f64 = 2.0;

/// Radius of the donut ring in a 100x100 viewBox.
pub const DONUT_RADIUS: f64 = 35.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcSegment {
    pub level: RiskLevel,
    pub count: u32,
    pub percent: f64,
    /// Sum of the percentages of the segments drawn before this one.
    pub offset: f64,
}

impl ArcSegment {
    /// Stroke dash length and dash offset for this segment on a circle of `radius`.
    pub fn stroke(&self, radius: f64) -> (f64, f64) {
        let circumference = 2.0 * PI * radius;
        let dash = self.percent / 100.0 * circumference;
        let offset = -(self.offset / 100.0 * circumference);
        (dash, offset)
    }
}

/// Lays out high, medium and low counts end to end around a ring.
pub fn risk_arcs(high: u32, medium: u32, low: u32, total: u32) -> [ArcSegment; 3] {
    let percent = |count: u32| {
        if total == 0 {
            0.0
        } else {
            f64::from(count) / f64::from(total) * 100.0
        }
    };

    let counts = [high, medium, low];
    let mut offset = 0.0;
    let mut segments = [ArcSegment {
        level: RiskLevel::High,
        count: 0,
        percent: 0.0,
        offset: 0.0,
    }; 3];

    for (slot, (level, count)) in segments
        .iter_mut()
        .zip(RiskLevel::ALL.into_iter().zip(counts))
    {
        let pct = percent(count);
        *slot = ArcSegment {
            level,
            count,
            percent: pct,
            offset,
        };
        offset += pct;
    }

    segments
}

pub fn risk_arcs_for(stats: &CourseStatistics) -> [ArcSegment; 3] {
    risk_arcs(
        stats.high_risk_count,
        stats.medium_risk_count,
        stats.low_risk_count,
        stats.total_students,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorKind {
    Risk,
    Protective,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FactorBar<'a> {
    pub factor: &'a ShapFactor,
    pub kind: FactorKind,
    pub width: f64,
}

impl FactorBar<'_> {
    /// Signed magnitude as shown beside the bar, e.g. `+0.42` or `-0.10`.
    pub fn signed_label(&self) -> String {
        let magnitude = self.factor.shap_value.abs();
        match self.kind {
            FactorKind::Risk => format!("+{magnitude:.2}"),
            FactorKind::Protective => format!("-{magnitude:.2}"),
        }
    }
}

pub fn max_magnitude(risk: &[ShapFactor], protective: &[ShapFactor]) -> f64 {
    risk.iter()
        .chain(protective)
        .map(|factor| factor.shap_value.abs())
        .filter(|magnitude| magnitude.is_finite())
        .fold(MIN_FACTOR_MAGNITUDE, f64::max)
}

pub fn bar_width(contribution: f64, max_magnitude: f64) -> f64 {
    let raw = contribution.abs() / max_magnitude * 100.0;
    if raw.is_finite() {
        raw.clamp(MIN_VISIBLE_WIDTH, 100.0)
    } else {
        MIN_VISIBLE_WIDTH
    }
}

/// Bars for both factor groups, scaled against the largest magnitude across them.
///
/// The group a factor came from decides its kind; the sign of its value is not
/// re-examined.
pub fn factor_bars(explanation: &ShapExplanation) -> Vec<FactorBar<'_>> {
    let max = max_magnitude(&explanation.risk_factors, &explanation.protective_factors);
    let risk = explanation
        .risk_factors
        .iter()
        .map(|factor| (factor, FactorKind::Risk));
    let protective = explanation
        .protective_factors
        .iter()
        .map(|factor| (factor, FactorKind::Protective));

    risk.chain(protective)
        .map(|(factor, kind)| FactorBar {
            factor,
            kind,
            width: bar_width(factor.shap_value, max),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factor(name: &str, value: f64) -> ShapFactor {
        ShapFactor {
            feature: name.to_string(),
            label: name.to_string(),
            shap_value: value,
            feature_value: None,
        }
    }

    #[test]
    fn arcs_for_three_four_three() {
        let arcs = risk_arcs(3, 4, 3, 10);
        let percents: Vec<f64> = arcs.iter().map(|a| a.percent).collect();
        let offsets: Vec<f64> = arcs.iter().map(|a| a.offset).collect();
        assert_eq!(percents, vec![30.0, 40.0, 30.0]);
        assert_eq!(offsets, vec![0.0, 30.0, 70.0]);
        assert_eq!(arcs[0].level, RiskLevel::High);
        assert_eq!(arcs[2].level, RiskLevel::Low);
    }

    #[test]
    fn zero_total_renders_empty_ring() {
        let arcs = risk_arcs(0, 0, 0, 0);
        assert!(arcs.iter().all(|a| a.percent == 0.0 && a.offset == 0.0));

        let inconsistent = risk_arcs(2, 1, 0, 0);
        assert!(inconsistent.iter().all(|a| a.percent == 0.0));
    }

    #[test]
    fn percentages_sum_to_hundred_and_offsets_grow() {
        for (h, m, l) in [(1, 1, 1), (7, 0, 2), (0, 0, 13), (333, 334, 333)] {
            let arcs = risk_arcs(h, m, l, h + m + l);
            let sum: f64 = arcs.iter().map(|a| a.percent).sum();
            assert!((sum - 100.0).abs() < 1e-9, "sum was {sum}");
            assert!(arcs.windows(2).all(|w| w[0].offset <= w[1].offset));
        }
    }

    #[test]
    fn stroke_geometry_matches_circumference() {
        let arcs = risk_arcs(1, 1, 2, 4);
        let circumference = 2.0 * PI * DONUT_RADIUS;
        let (dash, offset) = arcs[2].stroke(DONUT_RADIUS);
        assert!((dash - circumference / 2.0).abs() < 1e-9);
        assert!((offset + circumference / 2.0).abs() < 1e-9);
    }

    #[test]
    fn largest_factor_gets_full_width() {
        let explanation = ShapExplanation {
            base_value: 0.3,
            fail_risk_score: 64.0,
            risk_factors: vec![factor("inactive", 0.4), factor("grade", 0.1)],
            protective_factors: vec![factor("videos", -0.8)],
        };
        let bars = factor_bars(&explanation);
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[2].kind, FactorKind::Protective);
        assert_eq!(bars[2].width, 100.0);
        assert_eq!(bars[0].width, 50.0);
        assert_eq!(bars[1].width, 12.5);
        assert_eq!(bars[2].signed_label(), "-0.80");
        assert_eq!(bars[0].signed_label(), "+0.40");
    }

    #[test]
    fn tiny_and_zero_factors_stay_visible() {
        let explanation = ShapExplanation {
            base_value: 0.0,
            fail_risk_score: 0.0,
            risk_factors: vec![factor("a", 0.0), factor("b", 0.0)],
            protective_factors: vec![],
        };
        assert_eq!(max_magnitude(&explanation.risk_factors, &[]), MIN_FACTOR_MAGNITUDE);
        for bar in factor_bars(&explanation) {
            assert_eq!(bar.width, MIN_VISIBLE_WIDTH);
        }

        let skewed = ShapExplanation {
            base_value: 0.0,
            fail_risk_score: 0.0,
            risk_factors: vec![factor("big", 5.0), factor("small", 0.001)],
            protective_factors: vec![],
        };
        let bars = factor_bars(&skewed);
        assert!(bars.iter().all(|b| (MIN_VISIBLE_WIDTH..=100.0).contains(&b.width)));
        assert_eq!(bars[1].width, MIN_VISIBLE_WIDTH);
    }

    #[test]
    fn statistics_feed_the_layout() {
        let stats = CourseStatistics {
            total_students: 10,
            high_risk_count: 3,
            medium_risk_count: 4,
            low_risk_count: 3,
            ..Default::default()
        };
        assert_eq!(risk_arcs_for(&stats), risk_arcs(3, 4, 3, 10));
    }
}
