//! Mapping of the scores to color intensities.
//!
//! The RGB part of a color tells who leads a group, the alpha part how strong
//! the chosen metric is. Vote totals are heavily right-skewed (a few polling
//! places gather most of the votes), which makes a linear scale render almost
//! everything invisible; the percentile buckets spread the alpha along the
//! empirical distribution of the batch instead.

use log::debug;

use crate::config::*;

#[derive(PartialEq, Debug, Clone)]
pub enum ColorPolicy {
    /// `alpha = base_alpha + (value / max) ^ exponent * (255 - base_alpha)`
    Linear { exponent: f64, base_alpha: u8 },
    /// Positive values go to the alpha of their percentile bracket.
    /// `ladder` has one more entry than `breakpoints`.
    PercentileBucket { breakpoints: Vec<f64>, ladder: Vec<u8> },
}

/// A validated color policy.
#[derive(PartialEq, Debug, Clone)]
pub struct ColorScale {
    policy: ColorPolicy,
}

impl ColorScale {
    pub const DEFAULT_EXPONENT: f64 = 0.75;
    pub const DEFAULT_BASE_ALPHA: u8 = 50;
    pub const DEFAULT_BREAKPOINTS: [f64; 6] = [25.0, 50.0, 75.0, 90.0, 95.0, 99.0];
    pub const DEFAULT_LADDER: [u8; 7] = [10, 25, 50, 100, 160, 200, 255];

    pub fn linear(exponent: f64, base_alpha: u8) -> Result<ColorScale, SynergyError> {
        if !(exponent.is_finite() && exponent > 0.0) {
            return Err(SynergyError::InvalidColorScale(format!(
                "exponent must be positive, got {}",
                exponent
            )));
        }
        Ok(ColorScale {
            policy: ColorPolicy::Linear {
                exponent,
                base_alpha,
            },
        })
    }

    pub fn percentile(breakpoints: &[f64], ladder: &[u8]) -> Result<ColorScale, SynergyError> {
        if ladder.len() != breakpoints.len() + 1 {
            return Err(SynergyError::InvalidColorScale(format!(
                "{} breakpoints need {} alpha values, got {}",
                breakpoints.len(),
                breakpoints.len() + 1,
                ladder.len()
            )));
        }
        if breakpoints.iter().any(|p| !(0.0..=100.0).contains(p))
            || breakpoints.windows(2).any(|w| w[0] >= w[1])
        {
            return Err(SynergyError::InvalidColorScale(format!(
                "breakpoints must be strictly ascending percentiles: {:?}",
                breakpoints
            )));
        }
        if ladder.windows(2).any(|w| w[0] > w[1]) {
            return Err(SynergyError::InvalidColorScale(format!(
                "alpha ladder must be ascending: {:?}",
                ladder
            )));
        }
        Ok(ColorScale {
            policy: ColorPolicy::PercentileBucket {
                breakpoints: breakpoints.to_vec(),
                ladder: ladder.to_vec(),
            },
        })
    }

    pub fn default_linear() -> ColorScale {
        ColorScale {
            policy: ColorPolicy::Linear {
                exponent: ColorScale::DEFAULT_EXPONENT,
                base_alpha: ColorScale::DEFAULT_BASE_ALPHA,
            },
        }
    }

    pub fn default_percentile() -> ColorScale {
        ColorScale {
            policy: ColorPolicy::PercentileBucket {
                breakpoints: ColorScale::DEFAULT_BREAKPOINTS.to_vec(),
                ladder: ColorScale::DEFAULT_LADDER.to_vec(),
            },
        }
    }

    pub fn policy(&self) -> &ColorPolicy {
        &self.policy
    }

    /// The alpha used for empty groups and degenerate batches.
    pub fn minimal_alpha(&self) -> u8 {
        match &self.policy {
            ColorPolicy::Linear { base_alpha, .. } => *base_alpha,
            ColorPolicy::PercentileBucket { ladder, .. } => ladder.first().cloned().unwrap_or(0),
        }
    }

    /// The alpha of every value of a batch.
    ///
    /// Batches with at most one distinct value, or with nothing above zero,
    /// get the minimal alpha everywhere.
    pub fn alphas(&self, values: &[f64]) -> Vec<u8> {
        let minimal = self.minimal_alpha();
        if is_degenerate(values) {
            debug!("alphas: degenerate batch of {} values", values.len());
            return vec![minimal; values.len()];
        }
        match &self.policy {
            ColorPolicy::Linear {
                exponent,
                base_alpha,
            } => {
                let max = values.iter().cloned().fold(0.0, f64::max);
                let span = (255 - *base_alpha) as f64;
                values
                    .iter()
                    .map(|v| {
                        let n = (v / max).clamp(0.0, 1.0).powf(*exponent);
                        (*base_alpha as f64 + n * span).round() as u8
                    })
                    .collect()
            }
            ColorPolicy::PercentileBucket {
                breakpoints,
                ladder,
            } => {
                let mut positives: Vec<f64> = values.iter().cloned().filter(|v| *v > 0.0).collect();
                positives.sort_by(|a, b| a.total_cmp(b));
                let thresholds: Vec<f64> = breakpoints
                    .iter()
                    .map(|p| percentile(&positives, *p))
                    .collect();
                debug!("alphas: percentile thresholds {:?}", thresholds);
                values
                    .iter()
                    .map(|v| {
                        if *v > 0.0 {
                            let bracket = thresholds.iter().filter(|t| *v > **t).count();
                            ladder[bracket]
                        } else {
                            minimal
                        }
                    })
                    .collect()
            }
        }
    }
}

fn is_degenerate(values: &[f64]) -> bool {
    let max = values.iter().cloned().fold(0.0, f64::max);
    if !(max > 0.0) {
        return true;
    }
    let first = values[0];
    values.iter().all(|v| *v == first)
}

/// Percentile `p` (0 to 100) of sorted values, interpolating linearly between
/// the closest ranks.
pub fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    match sorted_values.len() {
        0 => 0.0,
        1 => sorted_values[0],
        n => {
            let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted_values[lo] + (sorted_values[hi] - sorted_values[lo]) * frac
        }
    }
}

pub fn leader(row: &AggregatedRow) -> Leader {
    match row.margin {
        m if m > 0 => Leader::A,
        m if m < 0 => Leader::B,
        _ => Leader::Neither,
    }
}

pub fn leader_rgb(leader: Leader, pair: &CandidatePair) -> [u8; 3] {
    match leader {
        Leader::A => pair.a.color,
        Leader::B => pair.b.color,
        Leader::Neither => Rgba::NEUTRAL,
    }
}

/// The value of the metric for every row of a table.
pub fn metric_values(rows: &[AggregatedRow], metric: MetricKind) -> Vec<f64> {
    let max_abs_margin = rows.iter().map(|r| r.abs_margin).max().unwrap_or(0);
    rows.iter()
        .map(|r| match metric {
            MetricKind::Synergy => r.synergy,
            MetricKind::AbsoluteSynergy if r.total == 0 || max_abs_margin == 0 => 0.0,
            MetricKind::AbsoluteSynergy => 1.0 - r.abs_margin as f64 / max_abs_margin as f64,
            MetricKind::VictoryMagnitude => r.abs_margin as f64,
            MetricKind::CombinedStrength => r.combined_strength,
            MetricKind::TotalVotes => r.total as f64,
            MetricKind::SynergyWeight => r.synergy_weight,
        })
        .collect()
}

/// Colors every row of a table.
///
/// Rows without votes take no part in the normalization and get the neutral
/// gray at the minimal alpha. Voted rows whose value is exactly zero are also
/// drawn in the neutral gray.
pub fn color_rows(
    rows: &[AggregatedRow],
    metric: MetricKind,
    scale: &ColorScale,
    pair: &CandidatePair,
) -> Vec<Rgba> {
    let values = metric_values(rows, metric);
    let voted: Vec<f64> = rows
        .iter()
        .zip(values.iter())
        .filter(|(r, _)| r.total > 0)
        .map(|(_, v)| *v)
        .collect();
    let mut alphas = scale.alphas(&voted).into_iter();
    rows.iter()
        .zip(values.iter())
        .map(|(r, v)| {
            if r.total == 0 {
                Rgba::from_rgb(Rgba::NEUTRAL, scale.minimal_alpha())
            } else {
                let alpha = alphas.next().unwrap_or_else(|| scale.minimal_alpha());
                // An exact zero carries no leader information.
                let rgb = if *v == 0.0 {
                    Rgba::NEUTRAL
                } else {
                    leader_rgb(leader(r), pair)
                };
                Rgba::from_rgb(rgb, alpha)
            }
        })
        .collect()
}

/// Radius of a point feature, in meters.
pub fn point_radius(total: u64, max_total: u64) -> f64 {
    if max_total == 0 {
        100.0
    } else {
        100.0 + total as f64 / max_total as f64 * 400.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::score_table;

    fn table(pairs: &[(u64, u64)]) -> AggregatedTable {
        score_table(
            AggregationKey::PollingPlace,
            pairs
                .iter()
                .enumerate()
                .map(|(i, (a, b))| GroupSums {
                    group: GroupValue::Named(format!("{:03}", i)),
                    votes_a: *a,
                    votes_b: *b,
                    record_count: 1,
                    position: None,
                })
                .collect(),
        )
    }

    #[test]
    fn percentile_interpolates() {
        let values: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        assert!((percentile(&values, 25.0) - 25.75).abs() < 1e-9);
        assert!((percentile(&values, 50.0) - 50.5).abs() < 1e-9);
        assert!((percentile(&values, 99.0) - 99.01).abs() < 1e-9);
        assert_eq!(percentile(&values, 100.0), 100.0);
        assert_eq!(percentile(&[3.0], 75.0), 3.0);
        assert_eq!(percentile(&[], 75.0), 0.0);
    }

    #[test]
    fn high_percentiles_are_more_opaque() {
        let values: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        let alphas = ColorScale::default_percentile().alphas(&values);
        // 99th-percentile member vs 25th-percentile member
        assert!(alphas[99] > alphas[24]);
        assert_eq!(alphas[99], 255);
        assert_eq!(alphas[24], 10);
        assert!(alphas.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn percentile_ignores_zeros_in_the_distribution() {
        let mut values = vec![0.0; 50];
        values.extend((1..=100).map(|x| x as f64));
        let alphas = ColorScale::default_percentile().alphas(&values);
        assert!(alphas[..50].iter().all(|a| *a == 10));
        assert_eq!(alphas[50 + 99], 255);
    }

    #[test]
    fn skewed_distribution_stays_visible() {
        let mut values: Vec<f64> = (1..=99).map(|x| x as f64).collect();
        values.push(100_000.0);
        let linear = ColorScale::linear(1.0, 0).unwrap().alphas(&values);
        let buckets = ColorScale::default_percentile().alphas(&values);
        assert_eq!(linear[50], 0);
        assert!(buckets[50] >= 50);
    }

    #[test]
    fn linear_scale() {
        let scale = ColorScale::linear(1.0, 50).unwrap();
        assert_eq!(scale.alphas(&[0.0, 0.5, 1.0]), vec![50, 153, 255]);
        let scale = ColorScale::linear(0.5, 101).unwrap();
        assert_eq!(scale.alphas(&[0.25, 1.0]), vec![178, 255]);
    }

    #[test]
    fn degenerate_batches() {
        let scale = ColorScale::default_linear();
        assert_eq!(scale.alphas(&[0.0, 0.0, 0.0]), vec![50, 50, 50]);
        assert_eq!(scale.alphas(&[0.7, 0.7]), vec![50, 50]);
        assert!(scale.alphas(&[]).is_empty());
        let scale = ColorScale::default_percentile();
        assert_eq!(scale.alphas(&[4.0, 4.0, 4.0]), vec![10, 10, 10]);
        assert_eq!(scale.alphas(&[0.0]), vec![10]);
    }

    #[test]
    fn all_zero_batch_is_neutral() {
        let t = table(&[(0, 0), (0, 0), (0, 0)]);
        let pair = CandidatePair::new("ALICE", "BOB");
        for scale in [ColorScale::default_linear(), ColorScale::default_percentile()] {
            for metric in [
                MetricKind::Synergy,
                MetricKind::AbsoluteSynergy,
                MetricKind::VictoryMagnitude,
                MetricKind::CombinedStrength,
                MetricKind::TotalVotes,
                MetricKind::SynergyWeight,
            ] {
                let colors = color_rows(&t.rows, metric, &scale, &pair);
                assert_eq!(colors.len(), 3);
                for c in colors {
                    assert_eq!(c, Rgba::from_rgb(Rgba::NEUTRAL, scale.minimal_alpha()));
                }
            }
        }
    }

    #[test]
    fn leader_colors() {
        let t = table(&[(120, 80), (10, 30), (5, 5), (0, 0)]);
        let pair = CandidatePair::new("ALICE", "BOB");
        let colors = color_rows(&t.rows, MetricKind::Synergy, &ColorScale::default_linear(), &pair);
        assert_eq!([colors[0].r, colors[0].g, colors[0].b], pair.a.color);
        assert_eq!([colors[1].r, colors[1].g, colors[1].b], pair.b.color);
        assert_eq!([colors[2].r, colors[2].g, colors[2].b], Rgba::NEUTRAL);
        // The tie is the closest contest
        assert_eq!(colors[2].a, 255);
        assert_eq!(colors[3], Rgba::from_rgb(Rgba::NEUTRAL, 50));
    }

    #[test]
    fn landslides_do_not_drive_the_synergy_colors() {
        let t = table(&[(10, 0), (100, 0), (1000, 0)]);
        let pair = CandidatePair::new("ALICE", "BOB");
        for scale in [ColorScale::default_linear(), ColorScale::default_percentile()] {
            let colors = color_rows(&t.rows, MetricKind::Synergy, &scale, &pair);
            for c in colors {
                assert_eq!(c, Rgba::from_rgb(Rgba::NEUTRAL, scale.minimal_alpha()));
            }
        }
        // Unanimous rows stay out of the percentile distribution
        let t = table(&[(10, 0), (60, 40), (50, 50)]);
        let colors = color_rows(
            &t.rows,
            MetricKind::Synergy,
            &ColorScale::default_percentile(),
            &pair,
        );
        assert_eq!(colors[0], Rgba::from_rgb(Rgba::NEUTRAL, 10));
        assert_eq!(colors[2].a, 255);
        // Vote counts still order the landslides
        let t = table(&[(10, 0), (100, 0), (1000, 0)]);
        let colors = color_rows(
            &t.rows,
            MetricKind::TotalVotes,
            &ColorScale::default_linear(),
            &pair,
        );
        assert!(colors[0].a < colors[1].a && colors[1].a < colors[2].a);
        assert_eq!([colors[2].r, colors[2].g, colors[2].b], pair.a.color);
    }

    #[test]
    fn exact_zero_is_neutral() {
        let t = table(&[(120, 80), (10, 30), (5, 5)]);
        let pair = CandidatePair::new("ALICE", "BOB");
        let colors = color_rows(
            &t.rows,
            MetricKind::AbsoluteSynergy,
            &ColorScale::default_linear(),
            &pair,
        );
        // The largest margin has an absolute synergy of 0
        assert_eq!(colors[0], Rgba::from_rgb(Rgba::NEUTRAL, 50));
        assert_eq!([colors[1].r, colors[1].g, colors[1].b], pair.b.color);
    }

    #[test]
    fn absolute_synergy() {
        let t = table(&[(120, 80), (10, 30), (5, 5)]);
        let v = metric_values(&t.rows, MetricKind::AbsoluteSynergy);
        assert!((v[0] - 0.0).abs() < 1e-9);
        assert!((v[1] - 0.5).abs() < 1e-9);
        assert!((v[2] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_scales() {
        assert!(ColorScale::linear(0.0, 50).is_err());
        assert!(ColorScale::linear(f64::NAN, 50).is_err());
        assert!(ColorScale::percentile(&[25.0, 50.0], &[10, 20]).is_err());
        assert!(ColorScale::percentile(&[50.0, 25.0], &[10, 20, 30]).is_err());
        assert!(ColorScale::percentile(&[25.0, 50.0], &[30, 20, 10]).is_err());
        assert!(ColorScale::percentile(&[25.0, 150.0], &[10, 20, 30]).is_err());
        assert!(ColorScale::percentile(&[25.0, 50.0], &[10, 20, 30]).is_ok());
    }

    #[test]
    fn radius() {
        assert_eq!(point_radius(0, 0), 100.0);
        assert_eq!(point_radius(50, 100), 300.0);
        assert_eq!(point_radius(100, 100), 500.0);
    }
}
