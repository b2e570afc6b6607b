use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::contacts;
use crate::records::{is_temporal_field, FieldCatalog, Record};
use crate::view::{PageMeta, PageSize, PageView};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("unknown field '{field}'")]
    UnknownField { field: String },

    #[error("field '{field}' is a date field, use a range instead of values")]
    NotCategorical { field: String },

    #[error("field '{field}' is not a date field, select values instead of a range")]
    NotTemporal { field: String },

    #[error("value '{value}' does not occur in field '{field}'")]
    UnknownValue { field: String, value: String },

    #[error("single-value mode accepts one value, got {count}")]
    SingleValueOnly { count: usize },
}

/// Single mirrors a one-choice dropdown, Multi a checkbox list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelectionStyle {
    Single,
    #[default]
    Multi,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    All,
    Values(BTreeSet<String>),
}

/// Inclusive bounds; an absent side is unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        if let Some(from) = self.from.as_ref() {
            if ts < from {
                return false;
            }
        }
        if let Some(to) = self.to.as_ref() {
            if ts > to {
                return false;
            }
        }
        true
    }
}

/// Parse a timestamp the way record values and range inputs arrive: RFC 3339,
/// a zone-less date-time (taken as UTC), or a bare date (UTC midnight).
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterMode {
    Categorical {
        options: Vec<String>,
        selection: Selection,
    },
    Range(DateRange),
}

/// Holds the fetched records and the active filter. Every filter change
/// recomputes the matching set from the full record list and sends the page
/// back to 1.
#[derive(Clone, Debug)]
pub struct FilterEngine {
    records: Vec<Record>,
    catalog: FieldCatalog,
    style: SelectionStyle,
    field: String,
    mode: FilterMode,
    filtered: Vec<usize>,
    view: PageView,
}

impl FilterEngine {
    pub fn new(records: Vec<Record>, catalog: FieldCatalog, style: SelectionStyle) -> Self {
        let field = catalog.first().to_string();
        let mut engine = Self {
            records,
            catalog,
            style,
            mode: FilterMode::Range(DateRange::default()),
            field: String::new(),
            filtered: Vec::new(),
            view: PageView::default(),
        };
        engine.switch_field(field);
        engine
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    pub fn style(&self) -> SelectionStyle {
        self.style
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn mode(&self) -> &FilterMode {
        &self.mode
    }

    pub fn total(&self) -> usize {
        self.records.len()
    }

    pub fn filtered_len(&self) -> usize {
        self.filtered.len()
    }

    pub fn filtered(&self) -> impl Iterator<Item = &Record> + '_ {
        self.filtered.iter().map(move |&i| &self.records[i])
    }

    /// Distinct values offered for the categorical field, sorted; empty in
    /// range mode.
    pub fn options(&self) -> &[String] {
        match &self.mode {
            FilterMode::Categorical { options, .. } => options.as_slice(),
            FilterMode::Range(_) => &[],
        }
    }

    pub fn select_field(&mut self, field: &str) -> Result<(), FilterError> {
        if !self.catalog.contains(field) {
            return Err(FilterError::UnknownField {
                field: field.to_string(),
            });
        }
        self.switch_field(field.to_string());
        Ok(())
    }

    fn switch_field(&mut self, field: String) {
        self.mode = if is_temporal_field(&field) {
            FilterMode::Range(DateRange::default())
        } else {
            FilterMode::Categorical {
                options: distinct_values(&self.records, &field),
                selection: Selection::All,
            }
        };
        self.field = field;
        self.apply();
    }

    pub fn select_all(&mut self) -> Result<(), FilterError> {
        self.set_selection(Selection::All)
    }

    /// Uncheck everything, which matches no records.
    pub fn select_none(&mut self) -> Result<(), FilterError> {
        self.set_selection(Selection::Values(BTreeSet::new()))
    }

    pub fn select_values<I, S>(&mut self, values: I) -> Result<(), FilterError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if self.style == SelectionStyle::Single && values.len() > 1 {
            return Err(FilterError::SingleValueOnly {
                count: values.len(),
            });
        }
        for value in values.iter() {
            self.check_option(value)?;
        }
        if self.style == SelectionStyle::Multi
            && !values.is_empty()
            && values.len() == self.options().len()
        {
            return self.set_selection(Selection::All);
        }
        self.set_selection(Selection::Values(values))
    }

    /// Flip one value. In multi style this behaves like a checkbox list whose
    /// "all" box is checked exactly when every value is; in single style the
    /// value simply becomes the selection.
    pub fn toggle_value(&mut self, value: &str) -> Result<(), FilterError> {
        self.check_option(value)?;
        let FilterMode::Categorical { options, selection } = &self.mode else {
            return Err(FilterError::NotCategorical {
                field: self.field.clone(),
            });
        };
        let next = match (self.style, selection) {
            (SelectionStyle::Single, _) => Selection::Values(BTreeSet::from([value.to_string()])),
            (SelectionStyle::Multi, Selection::All) => Selection::Values(
                options
                    .iter()
                    .filter(|o| o.as_str() != value)
                    .cloned()
                    .collect(),
            ),
            (SelectionStyle::Multi, Selection::Values(current)) => {
                let mut current = current.clone();
                if !current.remove(value) {
                    current.insert(value.to_string());
                }
                if !options.is_empty() && current.len() == options.len() {
                    Selection::All
                } else {
                    Selection::Values(current)
                }
            }
        };
        self.set_selection(next)
    }

    pub fn set_range(
        &mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<(), FilterError> {
        match &mut self.mode {
            FilterMode::Range(range) => {
                *range = DateRange { from, to };
            }
            FilterMode::Categorical { .. } => {
                return Err(FilterError::NotTemporal {
                    field: self.field.clone(),
                })
            }
        }
        self.apply();
        Ok(())
    }

    /// Back to the first catalog field with nothing filtered out.
    pub fn reset(&mut self) {
        let first = self.catalog.first().to_string();
        self.switch_field(first);
    }

    fn check_option(&self, value: &str) -> Result<(), FilterError> {
        match &self.mode {
            FilterMode::Categorical { options, .. } => {
                if options.iter().any(|o| o == value) {
                    Ok(())
                } else {
                    Err(FilterError::UnknownValue {
                        field: self.field.clone(),
                        value: value.to_string(),
                    })
                }
            }
            FilterMode::Range(_) => Err(FilterError::NotCategorical {
                field: self.field.clone(),
            }),
        }
    }

    fn set_selection(&mut self, next: Selection) -> Result<(), FilterError> {
        match &mut self.mode {
            FilterMode::Categorical { selection, .. } => *selection = next,
            FilterMode::Range(_) => {
                return Err(FilterError::NotCategorical {
                    field: self.field.clone(),
                })
            }
        }
        self.apply();
        Ok(())
    }

    fn apply(&mut self) {
        let field = self.field.as_str();
        self.filtered = match &self.mode {
            FilterMode::Categorical {
                selection: Selection::All,
                ..
            } => (0..self.records.len()).collect(),
            FilterMode::Categorical {
                selection: Selection::Values(values),
                ..
            } => self
                .records
                .iter()
                .enumerate()
                .filter(|(_, r)| values.contains(&r.field_value(field)))
                .map(|(i, _)| i)
                .collect(),
            FilterMode::Range(range) => self
                .records
                .iter()
                .enumerate()
                .filter(|(_, r)| {
                    parse_instant(&r.field_value(field))
                        .map(|ts| range.contains(&ts))
                        .unwrap_or(false)
                })
                .map(|(i, _)| i)
                .collect(),
        };
        self.view.reset();
        debug!(
            field,
            matched = self.filtered.len(),
            total = self.records.len(),
            "filter applied"
        );
    }

    /// Text for the value picker: `All`, `None`, the lone value, or `N selected`.
    pub fn selection_label(&self) -> String {
        match &self.mode {
            FilterMode::Categorical {
                selection: Selection::All,
                ..
            } => "All".to_string(),
            FilterMode::Categorical {
                selection: Selection::Values(values),
                ..
            } => match values.len() {
                0 => "None".to_string(),
                1 => values.iter().next().cloned().unwrap_or_default(),
                n => format!("{n} selected"),
            },
            FilterMode::Range(range) => {
                let side = |ts: Option<DateTime<Utc>>| {
                    ts.map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "any".to_string())
                };
                format!("{} .. {}", side(range.from), side(range.to))
            }
        }
    }

    pub fn status_message(&self) -> String {
        let total = self.records.len();
        format!(
            "Showing {} of {} record{}.",
            self.filtered.len(),
            total,
            if total == 1 { "" } else { "s" }
        )
    }

    pub fn page(&self) -> usize {
        self.view.page()
    }

    pub fn page_size(&self) -> PageSize {
        self.view.page_size()
    }

    pub fn set_page_size(&mut self, page_size: PageSize) {
        self.view.set_page_size(page_size);
    }

    pub fn goto_page(&mut self, page: usize) -> usize {
        self.view.goto(page, self.filtered.len())
    }

    pub fn next_page(&mut self) -> bool {
        self.view.next(self.filtered.len())
    }

    pub fn prev_page(&mut self) -> bool {
        self.view.prev()
    }

    /// Records on the current page plus its header data.
    pub fn current_page(&mut self) -> (Vec<&Record>, PageMeta) {
        let (indices, meta) = self.view.slice(&self.filtered);
        let rows = indices.iter().map(|&i| &self.records[i]).collect();
        (rows, meta)
    }

    pub fn can_export(&self) -> bool {
        !self.filtered.is_empty()
    }

    pub fn profile_ids(&self) -> Vec<String> {
        contacts::distinct_user_profile_ids(self.filtered())
    }
}

fn distinct_values(records: &[Record], field: &str) -> Vec<String> {
    let values: BTreeSet<String> = records
        .iter()
        .map(|r| r.field_value(field))
        .filter(|v| !v.is_empty())
        .collect();
    values.into_iter().collect()
}
