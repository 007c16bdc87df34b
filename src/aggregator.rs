use crate::schema::{AnalyticsConfig, ForecastCategory, ForecastMode, NormalizedDeal};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateBucket {
    pub gross_sum: f64,
    pub net_sum: f64,
    pub count: usize,
}

impl AggregateBucket {
    /// Combines two finished buckets. Commutative.
    pub fn merge(&self, other: &AggregateBucket) -> AggregateBucket {
        AggregateBucket {
            gross_sum: self.gross_sum + other.gross_sum,
            net_sum: self.net_sum + other.net_sum,
            count: self.count + other.count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregates {
    pub by_quarter: BTreeMap<String, AggregateBucket>,
    pub by_seller: BTreeMap<String, AggregateBucket>,
    pub by_forecast_category: BTreeMap<ForecastCategory, AggregateBucket>,
    pub total: AggregateBucket,
}

impl Aggregates {
    pub fn merge(&self, other: &Aggregates) -> Aggregates {
        Aggregates {
            by_quarter: merge_maps(&self.by_quarter, &other.by_quarter),
            by_seller: merge_maps(&self.by_seller, &other.by_seller),
            by_forecast_category: merge_maps(
                &self.by_forecast_category,
                &other.by_forecast_category,
            ),
            total: self.total.merge(&other.total),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total.count == 0
    }
}

fn merge_maps<K: Ord + Clone>(
    left: &BTreeMap<K, AggregateBucket>,
    right: &BTreeMap<K, AggregateBucket>,
) -> BTreeMap<K, AggregateBucket> {
    let mut merged = left.clone();
    for (key, bucket) in right {
        merged
            .entry(key.clone())
            .and_modify(|existing| *existing = existing.merge(bucket))
            .or_insert(*bucket);
    }
    merged
}

// Values are kept until finish() so the sum can be taken in a canonical
// order; floating point addition is not associative.
#[derive(Default)]
struct BucketAccumulator {
    gross: Vec<f64>,
    net: Vec<f64>,
}

impl BucketAccumulator {
    fn push(&mut self, deal: &NormalizedDeal) {
        self.gross.push(deal.gross_value);
        self.net.push(deal.net_value);
    }

    fn finish(self) -> AggregateBucket {
        let count = self.gross.len();
        AggregateBucket {
            gross_sum: canonical_sum(self.gross),
            net_sum: canonical_sum(self.net),
            count,
        }
    }
}

fn canonical_sum(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    values.iter().sum()
}

fn finish_map<K: Ord>(map: BTreeMap<K, BucketAccumulator>) -> BTreeMap<K, AggregateBucket> {
    map.into_iter().map(|(k, acc)| (k, acc.finish())).collect()
}

pub struct Aggregator<'a> {
    forecast: &'a ForecastMode,
}

impl<'a> Aggregator<'a> {
    pub fn new(forecast: &'a ForecastMode) -> Self {
        Self { forecast }
    }

    pub fn from_config(config: &'a AnalyticsConfig) -> Self {
        Self::new(&config.forecast)
    }

    pub fn categorize(&self, deal: &NormalizedDeal) -> ForecastCategory {
        self.forecast.categorize(deal)
    }

    /// Folds deals into quarter, seller and forecast-category buckets in one
    /// pass. The result does not depend on the order of `deals`.
    pub fn aggregate<'d, I>(&self, deals: I) -> Aggregates
    where
        I: IntoIterator<Item = &'d NormalizedDeal>,
    {
        let mut by_quarter: BTreeMap<String, BucketAccumulator> = BTreeMap::new();
        let mut by_seller: BTreeMap<String, BucketAccumulator> = BTreeMap::new();
        let mut by_category: BTreeMap<ForecastCategory, BucketAccumulator> = BTreeMap::new();
        let mut total = BucketAccumulator::default();

        for deal in deals {
            by_quarter
                .entry(deal.fiscal_quarter.clone())
                .or_default()
                .push(deal);
            by_seller.entry(deal.owner.clone()).or_default().push(deal);
            by_category
                .entry(self.categorize(deal))
                .or_default()
                .push(deal);
            total.push(deal);
        }

        let aggregates = Aggregates {
            by_quarter: finish_map(by_quarter),
            by_seller: finish_map(by_seller),
            by_forecast_category: finish_map(by_category),
            total: total.finish(),
        };

        debug!(
            "Aggregated {} deals into {} quarters, {} sellers, {} forecast categories",
            aggregates.total.count,
            aggregates.by_quarter.len(),
            aggregates.by_seller.len(),
            aggregates.by_forecast_category.len()
        );

        aggregates
    }
}

pub fn aggregate_deals(deals: &[NormalizedDeal], config: &AnalyticsConfig) -> Aggregates {
    Aggregator::from_config(config).aggregate(deals)
}
