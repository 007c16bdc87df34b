//! # Deal Pipeline Analytics
//!
//! A library for turning raw sales-deal exports into the data behind a
//! pipeline dashboard.
//!
//! ## Core Concepts
//!
//! - **Raw deals**: loosely typed JSON records from four sources (open
//!   pipeline, won, lost, specialist-curated), each with its own field names
//! - **Normalized deals**: one canonical shape with safe defaults, a fiscal
//!   quarter label and a 0-100 confidence
//! - **Aggregates**: order-independent sums per quarter, seller and forecast
//!   category (COMMIT / UPSIDE / PIPELINE)
//! - **Word clouds**: frequency-ranked labels from categorical fields and
//!   keywords found in free text
//! - **Drill-down**: a stateful, filterable and sortable view that keeps row
//!   identity across re-filtering
//! - **Top-N**: ranked highlight rows and their share of the base
//!
//! ## Example
//!
//! ```rust,ignore
//! use deal_pipeline_analytics::*;
//!
//! let input = DashboardInput::from_json(r#"{
//!     "openDeals": [{ "Oportunidade": "ERP", "Gross": 1200, "Confianca": 0.8,
//!                     "Data_Prevista": "2024-08-20", "Vendedor": "Ana" }],
//!     "wonDeals": [{ "Gross": 500, "Fatores_Sucesso": "Base instalada forte" }]
//! }"#)?;
//!
//! let summary = process_dashboard(&AnalyticsConfig::default(), &input)?;
//! let pipeline = &summary.aggregates[&DealSource::Open];
//! assert_eq!(pipeline.by_quarter["FY24-Q3"].gross_sum, 1200.0);
//!
//! let mut drilldown = DrilldownEngine::new();
//! drilldown.open(summary.drilldown_rows(&DealSource::ALL), None);
//! drilldown.apply_filters("erp", SourceFilter::All, SortKey::ValueDesc, None);
//! ```

pub mod aggregator;
pub mod coercion;
pub mod drilldown;
pub mod error;
pub mod ingestion;
pub mod ranking;
pub mod schema;
pub mod scoreboard;
pub mod utils;
pub mod wordcloud;

pub use aggregator::{aggregate_deals, AggregateBucket, Aggregates, Aggregator};
pub use coercion::{normalize_confidence, normalize_confidence_value};
pub use drilldown::{
    DrilldownAction, DrilldownEngine, DrilldownRow, DrilldownState, SortKey, SourceFilter,
};
pub use error::{PipelineAnalyticsError, Result};
pub use ingestion::*;
pub use ranking::{share_percentage, RankMetric, TopNSelector, TopNSummary, WeightedShare};
pub use schema::*;
pub use scoreboard::{SellerScore, SellerScoreboard};
pub use utils::{fiscal_quarter_label, fiscal_quarter_label_with_year_end, QUARTER_NOT_AVAILABLE};
pub use wordcloud::{WordCloudBuilder, WordCloudEntry, WordClouds};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Normalized deals of every source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDeals {
    pub open: Vec<NormalizedDeal>,
    pub won: Vec<NormalizedDeal>,
    pub lost: Vec<NormalizedDeal>,
    pub specialist: Vec<NormalizedDeal>,
}

impl SourceDeals {
    pub fn get(&self, source: DealSource) -> &[NormalizedDeal] {
        match source {
            DealSource::Open => &self.open,
            DealSource::Won => &self.won,
            DealSource::Lost => &self.lost,
            DealSource::Specialist => &self.specialist,
        }
    }

    pub fn len(&self) -> usize {
        DealSource::ALL.iter().map(|s| self.get(*s).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the rendering layer reads. Built once per refresh, never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub deals: SourceDeals,
    pub aggregates: BTreeMap<DealSource, Aggregates>,
    pub word_clouds: WordClouds,
    pub scoreboard: SellerScoreboard,
    pub top_pipeline_gross: TopNSummary,
    pub top_pipeline_net: TopNSummary,
}

impl DashboardSummary {
    /// Copies of the deals of the given sources, ready to be moved into a
    /// [`DrilldownEngine`].
    pub fn drilldown_rows(&self, sources: &[DealSource]) -> Vec<NormalizedDeal> {
        sources
            .iter()
            .flat_map(|source| self.deals.get(*source).iter().cloned())
            .collect()
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

pub struct DashboardProcessor;

impl DashboardProcessor {
    pub fn process(config: &AnalyticsConfig, input: &DashboardInput) -> Result<DashboardSummary> {
        config.validate()?;

        info!(
            "Processing dashboard input: {} open, {} won, {} lost, {} specialist deals",
            input.open.len(),
            input.won.len(),
            input.lost.len(),
            input.specialist.len()
        );

        let deals = SourceDeals {
            open: normalize_all(&input.open, DealSource::Open, config),
            won: normalize_all(&input.won, DealSource::Won, config),
            lost: normalize_all(&input.lost, DealSource::Lost, config),
            specialist: normalize_all(&input.specialist, DealSource::Specialist, config),
        };

        let aggregator = Aggregator::from_config(config);
        let aggregates: BTreeMap<DealSource, Aggregates> = DealSource::ALL
            .iter()
            .map(|source| (*source, aggregator.aggregate(deals.get(*source))))
            .collect();

        let builder = WordCloudBuilder::new(&config.keywords);
        let word_clouds = WordClouds::build(&builder, &deals.open, &deals.won, &deals.lost);
        debug!(
            "Built word clouds: {} win types, {} win labels, {} loss types, {} loss labels",
            word_clouds.win_types.len(),
            word_clouds.win_labels.len(),
            word_clouds.loss_types.len(),
            word_clouds.loss_labels.len()
        );

        let scoreboard = SellerScoreboard::from_deals(&deals.open, &deals.won, &deals.lost);

        let selector = TopNSelector::from_config(config);
        let top_pipeline_gross = selector.select(&deals.open, RankMetric::Gross);
        let top_pipeline_net = selector.select(&deals.open, RankMetric::Net);

        Ok(DashboardSummary {
            deals,
            aggregates,
            word_clouds,
            scoreboard,
            top_pipeline_gross,
            top_pipeline_net,
        })
    }
}

pub fn process_dashboard(config: &AnalyticsConfig, input: &DashboardInput) -> Result<DashboardSummary> {
    DashboardProcessor::process(config, input)
}
