use crate::error::{PipelineAnalyticsError, Result};
use crate::wordcloud::DEFAULT_VOCABULARY;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Where a deal record came from. Every normalized deal carries exactly one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum DealSource {
    #[schemars(description = "Open pipeline opportunity that has not closed yet")]
    Open,

    #[schemars(description = "Closed-won deal")]
    Won,

    #[schemars(description = "Closed-lost deal")]
    Lost,

    #[schemars(description = "Deal from the curated specialist list")]
    Specialist,
}

impl DealSource {
    pub const ALL: [DealSource; 4] = [
        DealSource::Open,
        DealSource::Won,
        DealSource::Lost,
        DealSource::Specialist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DealSource::Open => "open",
            DealSource::Won => "won",
            DealSource::Lost => "lost",
            DealSource::Specialist => "specialist",
        }
    }
}

impl fmt::Display for DealSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DealSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" | "pipeline" => Ok(DealSource::Open),
            "won" => Ok(DealSource::Won),
            "lost" => Ok(DealSource::Lost),
            "specialist" => Ok(DealSource::Specialist),
            other => Err(format!("Unknown deal source: {}", other)),
        }
    }
}

/// Identity handed to a row the first time a drill-down view sees it.
///
/// Keys are drawn from a process-wide counter, so two rows with identical
/// content still get distinct keys, and keys stay unique across engines.
/// Keys that arrive from outside (deserialized rows) must be passed to
/// [`RowKey::reserve`] before new keys are drawn.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct RowKey(u64);

static NEXT_ROW_KEY: AtomicU64 = AtomicU64::new(1);

impl RowKey {
    pub fn next() -> Self {
        Self(NEXT_ROW_KEY.fetch_add(1, Ordering::Relaxed))
    }

    /// Moves the counter past `self` so [`RowKey::next`] never hands it out.
    pub fn reserve(&self) {
        NEXT_ROW_KEY.fetch_max(self.0.saturating_add(1), Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row-{}", self.0)
    }
}

/// Canonical deal shape consumed by every downstream component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedDeal {
    pub name: String,
    pub account: String,
    pub owner: String,

    /// Pre-deduction value. Negative values are kept as-is.
    pub gross_value: f64,
    /// Post-deduction value. A negative net is meaningful and preserved.
    pub net_value: f64,

    pub source: DealSource,
    pub stage: String,
    pub result_type: String,
    pub reason: String,

    /// Percentage in 0..=100, see [`crate::coercion::normalize_confidence`].
    pub confidence: f64,
    pub meddic_score: Option<f64>,
    pub bant_score: Option<f64>,

    /// Raw closing/creation date as received, format not enforced.
    pub close_date: String,
    pub cycle_days: Option<f64>,
    pub idle_days: Option<f64>,

    pub fiscal_quarter: String,
    pub activities: Option<i64>,

    /// Forecast category assigned upstream (e.g. by a scoring model), if any.
    pub forecast_label: Option<String>,
    #[serde(default)]
    pub risk_flags: Vec<String>,
    pub next_action: Option<String>,

    #[serde(
        rename = "__rowKey",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub row_key: Option<RowKey>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForecastCategory {
    Commit,
    Upside,
    Pipeline,
}

impl ForecastCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastCategory::Commit => "COMMIT",
            ForecastCategory::Upside => "UPSIDE",
            ForecastCategory::Pipeline => "PIPELINE",
        }
    }

    /// Reads an externally assigned category label. Returns `None` for blank
    /// or unrecognized labels.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_uppercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "COMMIT" | "COMMITTED" => Some(ForecastCategory::Commit),
            "UPSIDE" | "BEST CASE" | "BESTCASE" => Some(ForecastCategory::Upside),
            "PIPELINE" | "PIPE" | "OMITTED" => Some(ForecastCategory::Pipeline),
            _ => None,
        }
    }
}

impl fmt::Display for ForecastCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence cut points for the computed forecast path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForecastThresholds {
    #[schemars(description = "Minimum confidence (0-100) for a deal to be counted as COMMIT")]
    pub commit: f64,

    #[schemars(description = "Minimum confidence (0-100) for a deal to be counted as UPSIDE. Must not exceed commit.")]
    pub upside: f64,
}

impl ForecastThresholds {
    /// Canonical cut points: COMMIT at 70, UPSIDE at 50.
    pub const STANDARD: ForecastThresholds = ForecastThresholds {
        commit: 70.0,
        upside: 50.0,
    };

    /// Stricter commit bar used by some pipeline reviews: COMMIT at 90, UPSIDE at 50.
    pub const STRICT: ForecastThresholds = ForecastThresholds {
        commit: 90.0,
        upside: 50.0,
    };

    pub fn categorize(&self, confidence: f64) -> ForecastCategory {
        if confidence >= self.commit {
            ForecastCategory::Commit
        } else if confidence >= self.upside {
            ForecastCategory::Upside
        } else {
            ForecastCategory::Pipeline
        }
    }

    pub fn validate(&self) -> Result<()> {
        let in_range = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);
        if !in_range(self.commit) || !in_range(self.upside) || self.upside > self.commit {
            return Err(PipelineAnalyticsError::InvalidThresholds {
                commit: self.commit,
                upside: self.upside,
            });
        }
        Ok(())
    }
}

impl Default for ForecastThresholds {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// How a deal is placed into COMMIT / UPSIDE / PIPELINE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ForecastMode {
    #[schemars(description = "Compute the category from the deal confidence using the given cut points")]
    Thresholds(ForecastThresholds),

    #[schemars(
        description = "Trust the category label supplied with the deal. Deals without a recognizable label are categorized with the fallback cut points."
    )]
    ExternalLabel { fallback: ForecastThresholds },
}

impl ForecastMode {
    pub fn categorize(&self, deal: &NormalizedDeal) -> ForecastCategory {
        match self {
            ForecastMode::Thresholds(thresholds) => thresholds.categorize(deal.confidence),
            ForecastMode::ExternalLabel { fallback } => deal
                .forecast_label
                .as_deref()
                .and_then(ForecastCategory::from_label)
                .unwrap_or_else(|| fallback.categorize(deal.confidence)),
        }
    }

    pub fn thresholds(&self) -> &ForecastThresholds {
        match self {
            ForecastMode::Thresholds(thresholds) => thresholds,
            ForecastMode::ExternalLabel { fallback } => fallback,
        }
    }
}

impl Default for ForecastMode {
    fn default() -> Self {
        ForecastMode::Thresholds(ForecastThresholds::STANDARD)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KeywordConfig {
    #[serde(default = "default_vocabulary")]
    #[schemars(
        description = "Phrases searched (case-insensitive substring) in free-text deal fields. Earlier phrases win when a record matches more phrases than the cap allows."
    )]
    pub vocabulary: Vec<String>,

    #[serde(default = "default_max_keywords_per_record")]
    #[schemars(description = "Maximum number of distinct phrases credited for a single text field")]
    pub max_keywords_per_record: usize,

    #[serde(default)]
    #[schemars(description = "Maximum number of entries kept in each word cloud. Keeps every entry when absent.")]
    pub limit: Option<usize>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            vocabulary: default_vocabulary(),
            max_keywords_per_record: default_max_keywords_per_record(),
            limit: None,
        }
    }
}

fn default_vocabulary() -> Vec<String> {
    DEFAULT_VOCABULARY.iter().map(|s| s.to_string()).collect()
}

fn default_max_keywords_per_record() -> usize {
    3
}

fn default_fiscal_year_end_month() -> u32 {
    12
}

fn default_top_n() -> usize {
    5
}

/// Explicit application settings handed to every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalyticsConfig {
    #[serde(default = "default_fiscal_year_end_month")]
    #[schemars(
        description = "The month when the fiscal year ends (1 = January, 12 = December). Use 12 for calendar-year quarters."
    )]
    pub fiscal_year_end_month: u32,

    #[serde(default)]
    #[schemars(description = "How deals are placed into forecast categories")]
    pub forecast: ForecastMode,

    #[serde(default = "default_top_n")]
    #[schemars(description = "Number of deals shown in ranked highlight cards")]
    pub top_n: usize,

    #[serde(default)]
    pub keywords: KeywordConfig,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            fiscal_year_end_month: default_fiscal_year_end_month(),
            forecast: ForecastMode::default(),
            top_n: default_top_n(),
            keywords: KeywordConfig::default(),
        }
    }
}

impl AnalyticsConfig {
    pub fn validate(&self) -> Result<()> {
        crate::utils::validate_fiscal_year_end_month(self.fiscal_year_end_month)?;
        self.forecast.thresholds().validate()?;

        if self.top_n == 0 {
            return Err(PipelineAnalyticsError::InvalidTopN(self.top_n));
        }
        if self.keywords.max_keywords_per_record == 0 {
            return Err(PipelineAnalyticsError::InvalidKeywordCap(
                self.keywords.max_keywords_per_record,
            ));
        }
        if let Some(idx) = self
            .keywords
            .vocabulary
            .iter()
            .position(|phrase| phrase.trim().is_empty())
        {
            return Err(PipelineAnalyticsError::BlankKeyword(idx));
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalyticsConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
