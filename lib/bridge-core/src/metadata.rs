//! Process-wide metadata injected into forwarded gateway stats

use std::collections::HashMap;

pub trait MetadataProvider: Send + Sync {
    fn get(&self) -> HashMap<String, String>;
}

impl<F> MetadataProvider for F
where
    F: Fn() -> HashMap<String, String> + Send + Sync,
{
    fn get(&self) -> HashMap<String, String> {
        self()
    }
}

/// Metadata taken verbatim from configuration
#[derive(Clone, Debug, Default)]
pub struct StaticMetadata {
    values: HashMap<String, String>,
}

impl StaticMetadata {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl MetadataProvider for StaticMetadata {
    fn get(&self) -> HashMap<String, String> {
        self.values.clone()
    }
}
