//! Tabular rows as handed over by the row source.

use std::fmt;

use crate::error::PipelineError;

/// Which input collection a row or error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    /// Polygon boundaries with a label (neighborhoods)
    Polygons,
    /// Point-located records (crimes)
    Points,
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dataset::Polygons => write!(f, "polygon dataset"),
            Dataset::Points => write!(f, "point dataset"),
        }
    }
}

/// A raw value counts as missing when it is empty or whitespace only.
pub fn is_missing(raw: &str) -> bool {
    raw.trim().is_empty()
}

/// Ordered mapping of field name to raw value.
///
/// Source column order is kept so output properties come out in the
/// same order the input declared them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    fields: Vec<(String, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Raw value of a field, if the field exists (the value may still be blank)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Value of a field, treating blank values as absent
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !is_missing(v))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A header plus its rows, for one dataset.
#[derive(Debug, Clone)]
pub struct Table {
    pub dataset: Dataset,
    headers: Vec<String>,
    rows: Vec<Attributes>,
}

impl Table {
    pub fn new(dataset: Dataset, headers: Vec<String>) -> Self {
        Self {
            dataset,
            headers,
            rows: Vec::new(),
        }
    }

    /// Append a row given as values in header order.
    ///
    /// Short rows are padded with blanks, extra values are dropped.
    pub fn push_values<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut values = values.into_iter();
        let mut row = Attributes::with_capacity(self.headers.len());
        for header in &self.headers {
            let value = values.next().map(Into::into).unwrap_or_default();
            row.push(header.clone(), value);
        }
        self.rows.push(row);
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Attributes] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Attributes> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fail with a schema error unless every named field is in the header.
    pub fn require(&self, fields: &[&str]) -> Result<(), PipelineError> {
        for field in fields {
            if !self.headers.iter().any(|h| h == field) {
                return Err(PipelineError::Schema {
                    dataset: self.dataset,
                    field: field.to_string(),
                    available: self.headers.clone(),
                });
            }
        }
        Ok(())
    }
}
