use crate::schema::{AnalyticsConfig, DealSource, NormalizedDeal};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RankMetric {
    #[default]
    Gross,
    Net,
}

impl RankMetric {
    pub fn value_of(&self, deal: &NormalizedDeal) -> f64 {
        match self {
            RankMetric::Gross => deal.gross_value,
            RankMetric::Net => deal.net_value,
        }
    }
}

/// `part` as a percentage of `base`, clamped to 0..=100. A zero base gives 0.
pub fn share_percentage(part: f64, base: f64) -> f64 {
    if base == 0.0 || !base.is_finite() || !part.is_finite() {
        return 0.0;
    }
    (part * 100.0 / base).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedShare {
    /// Σ value × confidence / 100 over the open rows of the top slice.
    pub top_weighted_sum: f64,
    /// Same sum over every open row of the base.
    pub base_weighted_sum: f64,
    pub percentage_of_base: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopNSummary {
    pub metric: RankMetric,
    pub top: Vec<NormalizedDeal>,
    pub top_sum: f64,
    pub base_sum: f64,
    pub base_count: usize,
    pub percentage_of_base: f64,
    /// Present only when the base holds open pipeline rows.
    pub weighted: Option<WeightedShare>,
}

fn open_weighted_sum<'a>(deals: impl Iterator<Item = &'a NormalizedDeal>, metric: RankMetric) -> f64 {
    deals
        .filter(|d| d.source == DealSource::Open)
        .map(|d| metric.value_of(d) * d.confidence / 100.0)
        .sum()
}

pub struct TopNSelector {
    n: usize,
}

impl TopNSelector {
    pub fn new(n: usize) -> Self {
        Self { n }
    }

    pub fn from_config(config: &AnalyticsConfig) -> Self {
        Self::new(config.top_n)
    }

    /// Ranks `rows` by `metric` (descending, ties keep input order) and
    /// reports how much of the base the top slice accounts for.
    pub fn select(&self, rows: &[NormalizedDeal], metric: RankMetric) -> TopNSummary {
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by(|&a, &b| metric.value_of(&rows[b]).total_cmp(&metric.value_of(&rows[a])));
        order.truncate(self.n);

        let top: Vec<NormalizedDeal> = order.iter().map(|&idx| rows[idx].clone()).collect();
        let whole_base = top.len() == rows.len();

        let top_sum: f64 = top.iter().map(|d| metric.value_of(d)).sum();
        let base_sum: f64 = rows.iter().map(|d| metric.value_of(d)).sum();
        let percentage_of_base = if whole_base && base_sum != 0.0 {
            100.0
        } else {
            share_percentage(top_sum, base_sum)
        };

        let weighted = rows
            .iter()
            .any(|d| d.source == DealSource::Open)
            .then(|| {
                let top_weighted_sum = open_weighted_sum(top.iter(), metric);
                let base_weighted_sum = open_weighted_sum(rows.iter(), metric);
                let percentage_of_base = if whole_base && base_weighted_sum != 0.0 {
                    100.0
                } else {
                    share_percentage(top_weighted_sum, base_weighted_sum)
                };
                WeightedShare {
                    top_weighted_sum,
                    base_weighted_sum,
                    percentage_of_base,
                }
            });

        debug!(
            "Top {} of {} rows by {:?}: {:.1}% of base",
            top.len(),
            rows.len(),
            metric,
            percentage_of_base
        );

        TopNSummary {
            metric,
            top,
            top_sum,
            base_sum,
            base_count: rows.len(),
            percentage_of_base,
            weighted,
        }
    }
}
