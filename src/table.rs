use crate::models::{BracketScheme, RawResponse, ITEM_COUNT};

/// Rectangular in-memory view over a set of responses: one row per
/// response, the six fixed item columns, and an optional demographic
/// column. Missing values stay `None`; exclusion happens per computation,
/// not here.
#[derive(Debug, Clone)]
pub struct ResponseTable {
    rows: Vec<[Option<f64>; ITEM_COUNT]>,
    categories: Option<Vec<Option<String>>>,
}

impl ResponseTable {
    pub fn from_responses(responses: &[RawResponse]) -> Self {
        let rows: Vec<[Option<f64>; ITEM_COUNT]> =
            responses.iter().map(|r| r.items()).collect();
        let categories = if responses.iter().any(|r| r.age_group.is_some()) {
            Some(responses.iter().map(|r| r.age_group.clone()).collect())
        } else {
            None
        };
        Self { rows, categories }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True when at least one response carried the demographic field.
    pub fn has_demographics(&self) -> bool {
        self.categories.is_some()
    }

    pub fn item(&self, row: usize, col: usize) -> Option<f64> {
        self.rows[row][col]
    }

    /// All six item values for a row, or `None` if any is missing.
    pub fn complete_items(&self, row: usize) -> Option<[f64; ITEM_COUNT]> {
        let mut out = [0.0; ITEM_COUNT];
        for (col, slot) in out.iter_mut().enumerate() {
            *slot = self.rows[row][col]?;
        }
        Some(out)
    }

    pub fn category(&self, row: usize) -> Option<&str> {
        self.categories.as_ref()?[row].as_deref()
    }
}

/// Reference-category indicator encoding of the demographic column: one
/// column per non-reference bracket, in scheme order. A row whose category
/// is outside the scheme gets all zeros (attributed to the reference, a
/// documented simplification); a row without the field has no encoding at
/// all and is excluded from indicator-using models.
#[derive(Debug, Clone)]
pub struct IndicatorEncoding {
    labels: Vec<String>,
    rows: Vec<Option<Vec<f64>>>,
}

impl IndicatorEncoding {
    pub fn encode(table: &ResponseTable, scheme: &BracketScheme) -> Self {
        if !table.has_demographics() {
            return Self {
                labels: Vec::new(),
                rows: vec![Some(Vec::new()); table.len()],
            };
        }

        let labels: Vec<String> = scheme
            .non_reference()
            .iter()
            .map(|b| b.label.clone())
            .collect();
        let width = labels.len();

        let rows = (0..table.len())
            .map(|row| {
                let code = table.category(row)?;
                let mut indicators = vec![0.0; width];
                if let Some(pos) = scheme.position(code) {
                    if pos > 0 {
                        indicators[pos - 1] = 1.0;
                    }
                }
                Some(indicators)
            })
            .collect();

        Self { labels, rows }
    }

    /// Number of indicator columns (scheme size minus one, or zero when the
    /// demographic field is absent).
    pub fn width(&self) -> usize {
        self.labels.len()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Indicator values for a row; `None` when the row has no category.
    pub fn row(&self, row: usize) -> Option<&[f64]> {
        self.rows[row].as_deref()
    }

    /// Indicator values with a missing category coerced to the reference
    /// (all zeros), matching how the summary statistics treat absent rows.
    pub fn row_or_reference(&self, row: usize) -> Vec<f64> {
        match &self.rows[row] {
            Some(values) => values.clone(),
            None => vec![0.0; self.width()],
        }
    }
}
