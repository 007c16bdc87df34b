use crate::ingestion::DEFAULT_RESULT_TYPE;
use crate::schema::{KeywordConfig, NormalizedDeal};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sales phrases looked up in free-text win/loss explanations. Grouped by
/// theme: qualification, budget and pricing, competition, relationship and
/// delivery.
pub const DEFAULT_VOCABULARY: &[&str] = &[
    // qualification
    "meddic",
    "bant",
    "champion",
    "decisor",
    "economic buyer",
    "critério de decisão",
    "processo de compra",
    // budget and pricing
    "preço",
    "orçamento",
    "budget",
    "desconto",
    "custo",
    "licitação",
    // competition
    "concorrência",
    "concorrente",
    "aws",
    "azure",
    "microsoft",
    "oracle",
    // relationship and delivery
    "base instalada",
    "relacionamento",
    "parceiro",
    "prazo",
    "timing",
    "prova de conceito",
    "integração",
    "migração",
    "suporte",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordCloudEntry {
    pub text: String,
    pub value: usize,
}

/// Counts labels while remembering the order in which each first appeared.
#[derive(Default)]
struct OrderedTally {
    positions: HashMap<String, usize>,
    entries: Vec<WordCloudEntry>,
}

impl OrderedTally {
    fn credit(&mut self, text: &str) {
        match self.positions.get(text) {
            Some(&idx) => self.entries[idx].value += 1,
            None => {
                self.positions.insert(text.to_string(), self.entries.len());
                self.entries.push(WordCloudEntry {
                    text: text.to_string(),
                    value: 1,
                });
            }
        }
    }

    /// Descending by count. `sort_by` is stable, so ties keep first-seen order.
    fn into_ranked(self) -> Vec<WordCloudEntry> {
        let mut entries = self.entries;
        entries.sort_by(|a, b| b.value.cmp(&a.value));
        entries
    }
}

struct VocabularyPhrase {
    display: String,
    needle: String,
}

pub struct WordCloudBuilder {
    vocabulary: Vec<VocabularyPhrase>,
    max_keywords_per_record: usize,
    limit: Option<usize>,
}

impl WordCloudBuilder {
    pub fn new(config: &KeywordConfig) -> Self {
        let mut seen = std::collections::HashSet::new();
        let vocabulary = config
            .vocabulary
            .iter()
            .map(|phrase| phrase.trim())
            .filter(|phrase| !phrase.is_empty())
            .filter(|phrase| seen.insert(phrase.to_lowercase()))
            .map(|phrase| VocabularyPhrase {
                display: phrase.to_string(),
                needle: phrase.to_lowercase(),
            })
            .collect();

        Self {
            vocabulary,
            max_keywords_per_record: config.max_keywords_per_record,
            limit: config.limit,
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Exact-value tally of a categorical field. Blank values and the
    /// "not informed" placeholder are not counted.
    pub fn tally_categories<'a, I>(values: I) -> Vec<WordCloudEntry>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut tally = OrderedTally::default();
        for value in values {
            let value = value.trim();
            if value.is_empty() || value == DEFAULT_RESULT_TYPE {
                continue;
            }
            tally.credit(value);
        }
        tally.into_ranked()
    }

    /// Vocabulary phrases found in `text`, ordered by where they first occur
    /// in it, at most `max_keywords_per_record` of them. Phrases starting at
    /// the same position keep vocabulary order.
    pub fn keywords_in(&self, text: &str) -> Vec<&str> {
        let haystack = text.to_lowercase();
        let mut hits: Vec<(usize, &str)> = self
            .vocabulary
            .iter()
            .filter_map(|phrase| {
                haystack
                    .find(&phrase.needle)
                    .map(|position| (position, phrase.display.as_str()))
            })
            .collect();
        hits.sort_by_key(|(position, _)| *position);
        hits.into_iter()
            .take(self.max_keywords_per_record)
            .map(|(_, display)| display)
            .collect()
    }

    /// Tallies vocabulary hits across free-text fields, one credit per phrase
    /// per text at most.
    pub fn extract_keywords<'a, I>(&self, texts: I) -> Vec<WordCloudEntry>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut tally = OrderedTally::default();
        for text in texts {
            for keyword in self.keywords_in(text) {
                tally.credit(keyword);
            }
        }
        tally.into_ranked()
    }
}

pub fn truncate_entries(mut entries: Vec<WordCloudEntry>, limit: Option<usize>) -> Vec<WordCloudEntry> {
    if let Some(limit) = limit {
        entries.truncate(limit);
    }
    entries
}

/// The ranked label sets shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordClouds {
    pub win_types: Vec<WordCloudEntry>,
    pub win_labels: Vec<WordCloudEntry>,
    pub loss_types: Vec<WordCloudEntry>,
    pub loss_labels: Vec<WordCloudEntry>,
    pub risk_flags: Vec<WordCloudEntry>,
    pub action_labels: Vec<WordCloudEntry>,
}

impl WordClouds {
    pub fn build(
        builder: &WordCloudBuilder,
        open: &[NormalizedDeal],
        won: &[NormalizedDeal],
        lost: &[NormalizedDeal],
    ) -> Self {
        let limit = builder.limit();

        Self {
            win_types: truncate_entries(
                WordCloudBuilder::tally_categories(won.iter().map(|d| d.result_type.as_str())),
                limit,
            ),
            win_labels: truncate_entries(
                builder.extract_keywords(won.iter().map(|d| d.reason.as_str())),
                limit,
            ),
            loss_types: truncate_entries(
                WordCloudBuilder::tally_categories(lost.iter().map(|d| d.result_type.as_str())),
                limit,
            ),
            loss_labels: truncate_entries(
                builder.extract_keywords(lost.iter().map(|d| d.reason.as_str())),
                limit,
            ),
            risk_flags: truncate_entries(
                WordCloudBuilder::tally_categories(
                    open.iter().flat_map(|d| d.risk_flags.iter().map(String::as_str)),
                ),
                limit,
            ),
            action_labels: truncate_entries(
                WordCloudBuilder::tally_categories(open.iter().filter_map(|d| d.next_action.as_deref())),
                limit,
            ),
        }
    }
}
