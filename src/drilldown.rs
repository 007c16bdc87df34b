//! Interactive drill-down over a row set: source filter, free-text search,
//! sorting, a top-N limit, selection and a single expanded row.
//!
//! The engine owns its rows. Every row gets a [`RowKey`] the first time it is
//! opened; keys already present are never replaced, so rows handed back by
//! [`DrilldownEngine::close`] can be reopened without losing identity.
//! Keys carried in by rows are reserved first, so a freshly drawn key never
//! repeats one of them.

use crate::schema::{DealSource, NormalizedDeal, RowKey};
use log::debug;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// What the engine needs to know about a row.
pub trait DrilldownRow {
    fn row_key(&self) -> Option<RowKey>;

    fn assign_row_key(&mut self, key: RowKey);

    fn source(&self) -> DealSource;

    /// Text fields matched by the free-text search.
    fn search_fields(&self) -> Vec<&str>;

    fn sort_value(&self) -> f64;

    fn sort_name(&self) -> &str;
}

impl DrilldownRow for NormalizedDeal {
    fn row_key(&self) -> Option<RowKey> {
        self.row_key
    }

    fn assign_row_key(&mut self, key: RowKey) {
        self.row_key = Some(key);
    }

    fn source(&self) -> DealSource {
        self.source
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.name.as_str(),
            self.account.as_str(),
            self.owner.as_str(),
            self.fiscal_quarter.as_str(),
            self.stage.as_str(),
            self.result_type.as_str(),
            self.reason.as_str(),
        ]
    }

    fn sort_value(&self) -> f64 {
        self.gross_value
    }

    fn sort_name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFilter {
    #[default]
    All,
    Open,
    Won,
    Lost,
    Specialist,
}

impl SourceFilter {
    pub fn matches(&self, source: DealSource) -> bool {
        match self {
            SourceFilter::All => true,
            SourceFilter::Open => source == DealSource::Open,
            SourceFilter::Won => source == DealSource::Won,
            SourceFilter::Lost => source == DealSource::Lost,
            SourceFilter::Specialist => source == DealSource::Specialist,
        }
    }
}

impl From<DealSource> for SourceFilter {
    fn from(source: DealSource) -> Self {
        match source {
            DealSource::Open => SourceFilter::Open,
            DealSource::Won => SourceFilter::Won,
            DealSource::Lost => SourceFilter::Lost,
            DealSource::Specialist => SourceFilter::Specialist,
        }
    }
}

impl FromStr for SourceFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Ok(SourceFilter::All);
        }
        trimmed.parse::<DealSource>().map(SourceFilter::from)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    ValueDesc,
    ValueAsc,
    Name,
}

impl SortKey {
    fn compare<R: DrilldownRow>(&self, a: &R, b: &R) -> Ordering {
        match self {
            SortKey::ValueDesc => b.sort_value().total_cmp(&a.sort_value()),
            SortKey::ValueAsc => a.sort_value().total_cmp(&b.sort_value()),
            SortKey::Name => a
                .sort_name()
                .to_lowercase()
                .cmp(&b.sort_name().to_lowercase()),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortKey::ValueDesc => "value_desc",
            SortKey::ValueAsc => "value_asc",
            SortKey::Name => "name",
        })
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "value_desc" | "value" => Ok(SortKey::ValueDesc),
            "value_asc" => Ok(SortKey::ValueAsc),
            "name" => Ok(SortKey::Name),
            other => Err(format!("Unknown sort key: {}", other)),
        }
    }
}

/// UI events that can be replayed against an open engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DrilldownAction {
    ApplyFilters {
        #[serde(default)]
        search_text: String,
        #[serde(default)]
        source_filter: SourceFilter,
        #[serde(default)]
        sort_key: SortKey,
        #[serde(default)]
        limit: Option<usize>,
    },
    ToggleExpand {
        row_key: RowKey,
    },
    Select {
        row_key: RowKey,
    },
    Close,
}

#[derive(Debug, Clone)]
pub struct DrilldownState<R> {
    rows: Vec<R>,
    // indices into `rows`, in display order
    filtered: Vec<usize>,
    active_source_filter: SourceFilter,
    search_text: String,
    sort_key: SortKey,
    limit: Option<usize>,
    selected_row_key: Option<RowKey>,
    expanded_row_key: Option<RowKey>,
}

impl<R: DrilldownRow> DrilldownState<R> {
    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn filtered_rows(&self) -> Vec<&R> {
        self.filtered.iter().map(|&idx| &self.rows[idx]).collect()
    }

    pub fn filtered_keys(&self) -> Vec<RowKey> {
        self.filtered
            .iter()
            .filter_map(|&idx| self.rows[idx].row_key())
            .collect()
    }

    pub fn active_source_filter(&self) -> SourceFilter {
        self.active_source_filter
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    /// Sort applied by the last [`DrilldownEngine::apply_filters`]. Until the
    /// first call, rows stay in the order they were opened with.
    pub fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn selected_row_key(&self) -> Option<RowKey> {
        self.selected_row_key
    }

    pub fn expanded_row_key(&self) -> Option<RowKey> {
        self.expanded_row_key
    }

    pub fn selected_row(&self) -> Option<&R> {
        self.selected_row_key.and_then(|key| self.find_filtered(key))
    }

    pub fn expanded_row(&self) -> Option<&R> {
        self.expanded_row_key.and_then(|key| self.find_filtered(key))
    }

    fn find_filtered(&self, key: RowKey) -> Option<&R> {
        self.filtered
            .iter()
            .map(|&idx| &self.rows[idx])
            .find(|row| row.row_key() == Some(key))
    }

    fn is_visible(&self, key: RowKey) -> bool {
        self.find_filtered(key).is_some()
    }

    fn first_visible_key(&self) -> Option<RowKey> {
        self.filtered
            .first()
            .and_then(|&idx| self.rows[idx].row_key())
    }

    fn matches_search(row: &R, needle: &str) -> bool {
        needle.is_empty()
            || row
                .search_fields()
                .iter()
                .any(|field| field.to_lowercase().contains(needle))
    }

    fn refilter(&mut self) {
        let needle = self.search_text.trim().to_lowercase();
        let source_filter = self.active_source_filter;

        let mut filtered: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| source_filter.matches(row.source()))
            .filter(|(_, row)| Self::matches_search(row, &needle))
            .map(|(idx, _)| idx)
            .collect();

        let sort_key = self.sort_key;
        let rows = &self.rows;
        filtered.sort_by(|&a, &b| sort_key.compare(&rows[a], &rows[b]));
        if let Some(limit) = self.limit {
            filtered.truncate(limit);
        }
        self.filtered = filtered;

        self.reconcile_selection();
    }

    /// Selection falls back to the first visible row; a hidden expansion collapses.
    fn reconcile_selection(&mut self) {
        let selected_visible = self
            .selected_row_key
            .is_some_and(|key| self.is_visible(key));
        if !selected_visible {
            self.selected_row_key = self.first_visible_key();
        }

        if let Some(key) = self.expanded_row_key {
            if !self.is_visible(key) {
                debug!("Collapsing row {} hidden by the current filters", key);
                self.expanded_row_key = None;
            }
        }
    }
}

pub struct DrilldownEngine<R> {
    state: Option<DrilldownState<R>>,
}

impl<R: DrilldownRow> Default for DrilldownEngine<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: DrilldownRow> DrilldownEngine<R> {
    pub fn new() -> Self {
        Self { state: None }
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<&DrilldownState<R>> {
        self.state.as_ref()
    }

    /// Opens (or reopens) the view over `rows` with default filters. The
    /// visible rows keep their input order until filters are applied.
    pub fn open(&mut self, mut rows: Vec<R>, initial_selection: Option<RowKey>) {
        for key in rows.iter().filter_map(|row| row.row_key()) {
            key.reserve();
        }
        for row in rows.iter_mut() {
            if row.row_key().is_none() {
                row.assign_row_key(RowKey::next());
            }
        }

        let mut state = DrilldownState {
            filtered: (0..rows.len()).collect(),
            rows,
            active_source_filter: SourceFilter::All,
            search_text: String::new(),
            sort_key: SortKey::ValueDesc,
            limit: None,
            selected_row_key: None,
            expanded_row_key: None,
        };

        state.selected_row_key = match initial_selection {
            Some(key) if state.is_visible(key) => Some(key),
            Some(key) => {
                debug!("Initial selection {} is not among the opened rows", key);
                state.first_visible_key()
            }
            None => state.first_visible_key(),
        };

        debug!("Opened drill-down over {} rows", state.rows.len());
        self.state = Some(state);
    }

    /// Filters, sorts and keeps at most `limit` rows (all when `None`), then
    /// re-resolves selection and expansion against what is left.
    pub fn apply_filters(
        &mut self,
        search_text: &str,
        source_filter: SourceFilter,
        sort_key: SortKey,
        limit: Option<usize>,
    ) {
        let Some(state) = self.state.as_mut() else {
            debug!("Ignoring apply_filters on a closed drill-down");
            return;
        };

        state.search_text = search_text.to_string();
        state.active_source_filter = source_filter;
        state.sort_key = sort_key;
        state.limit = limit;
        state.refilter();

        debug!(
            "Drill-down filters (source: {:?}, search: {:?}, sort: {}, limit: {:?}) kept {} of {} rows",
            source_filter,
            search_text,
            sort_key,
            limit,
            state.filtered.len(),
            state.rows.len()
        );
    }

    /// Collapses `row_key` if it is expanded, otherwise expands and selects it.
    pub fn toggle_expand(&mut self, row_key: RowKey) {
        let Some(state) = self.state.as_mut() else {
            debug!("Ignoring toggle_expand({}) on a closed drill-down", row_key);
            return;
        };

        if !state.is_visible(row_key) {
            debug!("Ignoring toggle_expand for stale row {}", row_key);
            return;
        }

        if state.expanded_row_key == Some(row_key) {
            state.expanded_row_key = None;
        } else {
            state.expanded_row_key = Some(row_key);
            state.selected_row_key = Some(row_key);
        }
    }

    pub fn select(&mut self, row_key: RowKey) {
        let Some(state) = self.state.as_mut() else {
            debug!("Ignoring select({}) on a closed drill-down", row_key);
            return;
        };

        if !state.is_visible(row_key) {
            debug!("Ignoring select for stale row {}", row_key);
            return;
        }
        state.selected_row_key = Some(row_key);
    }

    /// Discards the view state and hands the rows back, keys included.
    pub fn close(&mut self) -> Option<Vec<R>> {
        self.state.take().map(|state| state.rows)
    }

    pub fn apply(&mut self, action: DrilldownAction) {
        match action {
            DrilldownAction::ApplyFilters {
                search_text,
                source_filter,
                sort_key,
                limit,
            } => self.apply_filters(&search_text, source_filter, sort_key, limit),
            DrilldownAction::ToggleExpand { row_key } => self.toggle_expand(row_key),
            DrilldownAction::Select { row_key } => self.select(row_key),
            DrilldownAction::Close => {
                self.close();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        key: Option<RowKey>,
        name: &'static str,
        value: f64,
        source: DealSource,
        owner: &'static str,
    }

    impl DrilldownRow for Row {
        fn row_key(&self) -> Option<RowKey> {
            self.key
        }

        fn assign_row_key(&mut self, key: RowKey) {
            self.key = Some(key);
        }

        fn source(&self) -> DealSource {
            self.source
        }

        fn search_fields(&self) -> Vec<&str> {
            vec![self.name, self.owner]
        }

        fn sort_value(&self) -> f64 {
            self.value
        }

        fn sort_name(&self) -> &str {
            self.name
        }
    }

    fn row(name: &'static str, value: f64, source: DealSource) -> Row {
        Row {
            key: None,
            name,
            value,
            source,
            owner: "Ana",
        }
    }

    fn names(engine: &DrilldownEngine<Row>) -> Vec<&'static str> {
        engine
            .state()
            .unwrap()
            .filtered_rows()
            .iter()
            .map(|r| r.name)
            .collect()
    }

    fn key_of(engine: &DrilldownEngine<Row>, name: &str) -> RowKey {
        engine
            .state()
            .unwrap()
            .rows()
            .iter()
            .find(|r| r.name == name)
            .and_then(|r| r.key)
            .unwrap()
    }

    fn open_sample() -> DrilldownEngine<Row> {
        let mut engine = DrilldownEngine::new();
        engine.open(
            vec![
                row("A", 100.0, DealSource::Open),
                row("B", 50.0, DealSource::Won),
                row("c", 75.0, DealSource::Open),
                row("D", 75.0, DealSource::Lost),
            ],
            None,
        );
        engine
    }

    #[test]
    fn test_source_filter_keeps_matching_rows() {
        let mut engine = DrilldownEngine::new();
        engine.open(
            vec![row("A", 100.0, DealSource::Open), row("B", 50.0, DealSource::Won)],
            None,
        );

        engine.apply_filters("", SourceFilter::Won, SortKey::ValueDesc, None);
        assert_eq!(names(&engine), vec!["B"]);
        assert_eq!(
            engine.state().unwrap().selected_row_key(),
            Some(key_of(&engine, "B"))
        );
    }

    #[test]
    fn test_open_assigns_keys_and_defaults() {
        let engine = open_sample();
        let state = engine.state().unwrap();

        assert!(state.rows().iter().all(|r| r.key.is_some()));
        assert_eq!(names(&engine), vec!["A", "B", "c", "D"]);
        assert_eq!(state.active_source_filter(), SourceFilter::All);
        assert_eq!(state.limit(), None);
        assert_eq!(state.search_text(), "");
        assert_eq!(state.sort_key(), SortKey::ValueDesc);
        assert_eq!(state.selected_row_key(), Some(key_of(&engine, "A")));
        assert_eq!(state.expanded_row_key(), None);
    }

    #[test]
    fn test_identical_rows_get_distinct_keys_and_existing_keys_survive() {
        let existing = RowKey::next();
        let mut kept = row("Same", 1.0, DealSource::Open);
        kept.key = Some(existing);

        let mut engine = DrilldownEngine::new();
        engine.open(
            vec![
                row("Same", 1.0, DealSource::Open),
                row("Same", 1.0, DealSource::Open),
                kept,
            ],
            Some(existing),
        );

        let keys = engine.state().unwrap().filtered_keys();
        assert_ne!(keys[0], keys[1]);
        assert_eq!(keys[2], existing);
        assert_eq!(engine.state().unwrap().selected_row_key(), Some(existing));

        let rows = engine.close().unwrap();
        let mut reopened = DrilldownEngine::new();
        reopened.open(rows, None);
        assert_eq!(reopened.state().unwrap().filtered_keys(), keys);
    }

    #[test]
    fn test_imported_keys_are_never_handed_out_again() {
        let imported: RowKey =
            serde_json::from_value(serde_json::json!(RowKey::next().value() + 1)).unwrap();
        let mut carried = row("Imported", 10.0, DealSource::Open);
        carried.key = Some(imported);

        let mut engine = DrilldownEngine::new();
        engine.open(vec![carried, row("Fresh", 20.0, DealSource::Open)], None);

        let fresh = key_of(&engine, "Fresh");
        assert_ne!(fresh, imported);
        assert_eq!(key_of(&engine, "Imported"), imported);
        assert!(RowKey::next() > imported);

        engine.toggle_expand(fresh);
        assert_eq!(
            engine.state().unwrap().expanded_row().map(|r| r.name),
            Some("Fresh")
        );
    }

    #[test]
    fn test_limit_keeps_top_rows_and_recovers_selection() {
        let mut engine = open_sample();
        let b = key_of(&engine, "B");
        engine.toggle_expand(b);
        assert_eq!(engine.state().unwrap().selected_row_key(), Some(b));

        engine.apply_filters("", SourceFilter::All, SortKey::ValueDesc, Some(2));
        let state = engine.state().unwrap();
        assert_eq!(names(&engine), vec!["A", "c"]);
        assert_eq!(state.limit(), Some(2));
        assert_eq!(state.selected_row_key(), Some(key_of(&engine, "A")));
        assert_eq!(state.expanded_row_key(), None);

        // cut-off rows cannot be targeted
        engine.select(b);
        assert_eq!(
            engine.state().unwrap().selected_row_key(),
            Some(key_of(&engine, "A"))
        );

        engine.apply_filters("", SourceFilter::All, SortKey::ValueDesc, Some(10));
        assert_eq!(names(&engine), vec!["A", "c", "D", "B"]);

        engine.apply_filters("", SourceFilter::All, SortKey::ValueDesc, None);
        assert_eq!(engine.state().unwrap().filtered_rows().len(), 4);
    }

    #[test]
    fn test_sorting_is_stable() {
        let mut engine = open_sample();

        engine.apply_filters("", SourceFilter::All, SortKey::ValueDesc, None);
        assert_eq!(names(&engine), vec!["A", "c", "D", "B"]);

        engine.apply_filters("", SourceFilter::All, SortKey::ValueAsc, None);
        assert_eq!(names(&engine), vec!["B", "c", "D", "A"]);

        engine.apply_filters("", SourceFilter::All, SortKey::Name, None);
        assert_eq!(names(&engine), vec!["A", "B", "c", "D"]);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let mut engine = open_sample();
        engine.apply_filters("  C ", SourceFilter::All, SortKey::ValueDesc, None);
        assert_eq!(names(&engine), vec!["c"]);

        engine.apply_filters("ANA", SourceFilter::Open, SortKey::ValueDesc, None);
        assert_eq!(names(&engine), vec!["A", "c"]);
    }

    #[test]
    fn test_selection_recovery_and_expansion_collapse() {
        let mut engine = open_sample();
        let d = key_of(&engine, "D");
        engine.toggle_expand(d);
        assert_eq!(engine.state().unwrap().expanded_row_key(), Some(d));
        assert_eq!(engine.state().unwrap().selected_row_key(), Some(d));

        // D stays visible: selection and expansion survive re-sorting
        engine.apply_filters("", SourceFilter::All, SortKey::Name, None);
        assert_eq!(engine.state().unwrap().expanded_row_key(), Some(d));

        engine.apply_filters("", SourceFilter::Open, SortKey::ValueAsc, None);
        let state = engine.state().unwrap();
        assert_eq!(state.selected_row_key(), Some(key_of(&engine, "c")));
        assert_eq!(state.expanded_row_key(), None);

        engine.apply_filters("zzz", SourceFilter::All, SortKey::ValueDesc, None);
        let state = engine.state().unwrap();
        assert!(state.filtered_rows().is_empty());
        assert_eq!(state.selected_row_key(), None);
        assert!(state.selected_row().is_none());
    }

    #[test]
    fn test_toggle_expand_collapses_and_single_expansion() {
        let mut engine = open_sample();
        let a = key_of(&engine, "A");
        let b = key_of(&engine, "B");

        engine.toggle_expand(a);
        engine.toggle_expand(b);
        assert_eq!(engine.state().unwrap().expanded_row_key(), Some(b));

        engine.toggle_expand(b);
        let state = engine.state().unwrap();
        assert_eq!(state.expanded_row_key(), None);
        assert_eq!(state.selected_row_key(), Some(b));
    }

    #[test]
    fn test_stale_keys_are_ignored() {
        let mut engine = open_sample();
        let b = key_of(&engine, "B");
        engine.apply_filters("", SourceFilter::Open, SortKey::ValueDesc, None);
        let before = engine.state().unwrap().selected_row_key();

        engine.toggle_expand(b);
        engine.select(b);
        engine.toggle_expand(RowKey::next());

        let state = engine.state().unwrap();
        assert_eq!(state.expanded_row_key(), None);
        assert_eq!(state.selected_row_key(), before);
    }

    #[test]
    fn test_operations_on_closed_engine_are_noops() {
        let mut engine: DrilldownEngine<Row> = DrilldownEngine::new();
        engine.apply_filters("a", SourceFilter::All, SortKey::Name, None);
        engine.toggle_expand(RowKey::next());
        assert!(!engine.is_open());
        assert!(engine.close().is_none());

        let mut engine = open_sample();
        engine.apply(DrilldownAction::Close);
        assert!(engine.state().is_none());
    }

    #[test]
    fn test_filtered_rows_always_subset_of_rows() {
        let mut engine = open_sample();
        let filters = [
            ("", SourceFilter::All, SortKey::Name),
            ("a", SourceFilter::Open, SortKey::ValueAsc),
            ("", SourceFilter::Lost, SortKey::ValueDesc),
            ("x", SourceFilter::Specialist, SortKey::Name),
            ("d", SourceFilter::All, SortKey::ValueDesc),
        ];

        for (search, source, sort) in filters {
            engine.apply_filters(search, source, sort, None);
            let state = engine.state().unwrap();
            let all_keys: Vec<RowKey> = state.rows().iter().filter_map(|r| r.key).collect();
            for key in state.filtered_keys() {
                assert!(all_keys.contains(&key));
            }
            if let Some(selected) = state.selected_row_key() {
                assert!(state.filtered_keys().contains(&selected));
            }
            if let Some(expanded) = state.expanded_row_key() {
                assert!(state.filtered_keys().contains(&expanded));
            }
        }
    }

    #[test]
    fn test_actions_deserialize_and_apply() {
        let mut engine = open_sample();
        let action: DrilldownAction = serde_json::from_str(
            r#"{ "action": "apply_filters", "source_filter": "open", "sort_key": "name", "limit": 1 }"#,
        )
        .unwrap();
        engine.apply(action);
        assert_eq!(names(&engine), vec!["A"]);

        let action: DrilldownAction = serde_json::from_str(
            r#"{ "action": "apply_filters", "source_filter": "won", "sort_key": "name" }"#,
        )
        .unwrap();
        engine.apply(action);
        assert_eq!(names(&engine), vec!["B"]);

        let b = key_of(&engine, "B");
        let action: DrilldownAction =
            serde_json::from_value(serde_json::json!({ "action": "toggle_expand", "row_key": b }))
                .unwrap();
        engine.apply(action);
        assert_eq!(engine.state().unwrap().expanded_row_key(), Some(b));
    }

    #[test]
    fn test_filter_and_sort_parsing() {
        assert_eq!("all".parse::<SourceFilter>().unwrap(), SourceFilter::All);
        assert_eq!("Won".parse::<SourceFilter>().unwrap(), SourceFilter::Won);
        assert!("closed".parse::<SourceFilter>().is_err());
        assert_eq!("value_asc".parse::<SortKey>().unwrap(), SortKey::ValueAsc);
        assert_eq!("".parse::<SortKey>().unwrap(), SortKey::ValueDesc);
        assert!("date".parse::<SortKey>().is_err());
    }
}
