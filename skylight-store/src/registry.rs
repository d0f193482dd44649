//! Dataset registry: the mapping from dataset ids to warehouse queries.
//!
//! Each dashboard dataset is registered once at startup with the SQL that
//! derives it. Parameterized datasets use positional `{0}`, `{1}`, ...
//! placeholders; parameters are injected as escaped string literals.

use skylight_core::{DataError, DatasetKey};
use std::collections::HashMap;

/// One registered dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSpec {
    id: String,
    sql: String,
}

impl DatasetSpec {
    pub fn new(id: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sql: sql.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Render the SQL with positional parameters substituted.
    ///
    /// Parameters land in the query as single-quoted literals with embedded
    /// quotes doubled, so a parameter can never terminate its own literal.
    pub fn render_sql(&self, params: &[String]) -> String {
        let mut sql = self.sql.clone();
        for (i, param) in params.iter().enumerate() {
            let literal = format!("'{}'", param.replace('\'', "''"));
            sql = sql.replace(&format!("{{{}}}", i), &literal);
        }
        sql
    }
}

/// Registry of every dataset the cache can serve.
#[derive(Debug, Clone, Default)]
pub struct DatasetRegistry {
    specs: HashMap<String, DatasetSpec>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataset, replacing any previous spec with the same id.
    pub fn register(&mut self, spec: DatasetSpec) -> &mut Self {
        self.specs.insert(spec.id.clone(), spec);
        self
    }

    /// Look up a dataset spec, or fail with `UnknownDataset`.
    pub fn get(&self, dataset: &str) -> Result<&DatasetSpec, DataError> {
        self.specs.get(dataset).ok_or_else(|| DataError::UnknownDataset {
            dataset: dataset.to_string(),
        })
    }

    pub fn contains(&self, dataset: &str) -> bool {
        self.specs.contains_key(dataset)
    }

    /// Ids of every registered dataset.
    pub fn ids(&self) -> Vec<&str> {
        self.specs.keys().map(String::as_str).collect()
    }

    /// The cache key for a dataset id and parameter combination.
    pub fn key_for(&self, dataset: &str, params: &[String]) -> Result<DatasetKey, DataError> {
        self.get(dataset)?;
        Ok(if params.is_empty() {
            DatasetKey::new(dataset)
        } else {
            DatasetKey::with_params(dataset, params)
        })
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
