//! Stage catalog
//!
//! The fixed, ordered set of stage names the pipeline emits. The catalog is
//! also the dispatch table: each stage maps to the handling it receives when
//! an event with that name arrives.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stages emitted by the pipeline backend, in order
pub const PIPELINE_STAGES: [&str; 8] = [
    "status", "family", "datasets", "registry", "head1", "head2", "head3", "done",
];

/// Name of the terminal stage in the built-in catalog
pub const DONE_STAGE: &str = "done";

/// Name of a pipeline stage
///
/// Kept as a string so that names outside the catalog (e.g. a stage added
/// by a newer backend) can still be recorded and displayed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageName(String);

impl StageName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StageName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for StageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for StageName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StageName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// What a session does with an event of a given stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageHandling {
    /// Decode, append to the result log and move the cursor
    Append,
    /// Same as `Append`, then close the session as completed
    Terminal,
}

/// Errors building a custom catalog
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("duplicate stage name: {0}")]
    Duplicate(String),
    #[error("stage name must not be blank")]
    BlankName,
}

/// Ordered catalog of pipeline stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCatalog {
    stages: Vec<StageName>,
    terminal: usize,
}

impl StageCatalog {
    /// Built-in catalog for the analysis pipeline
    pub fn pipeline() -> Self {
        Self {
            stages: PIPELINE_STAGES.iter().map(|s| StageName::from(*s)).collect(),
            terminal: PIPELINE_STAGES.len() - 1,
        }
    }

    /// Build a catalog from an ordered list of names.
    ///
    /// The terminal stage is appended at the end when the list does not
    /// already contain it.
    pub fn new<I, S>(names: I, terminal: &str) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut stages: Vec<StageName> = Vec::new();
        for name in names {
            let name = name.into().trim().to_string();
            if name.is_empty() {
                return Err(CatalogError::BlankName);
            }
            if stages.iter().any(|s| s == &name.as_str()) {
                return Err(CatalogError::Duplicate(name));
            }
            stages.push(StageName::new(name));
        }

        let terminal = terminal.trim();
        if terminal.is_empty() {
            return Err(CatalogError::BlankName);
        }
        let terminal = match stages.iter().position(|s| s == &terminal) {
            Some(idx) => idx,
            None => {
                stages.push(StageName::from(terminal));
                stages.len() - 1
            }
        };

        Ok(Self { stages, terminal })
    }

    /// Catalog position of `stage`, or `None` when the name is not recognized
    pub fn index_of(&self, stage: &str) -> Option<usize> {
        self.stages.iter().position(|s| s == &stage)
    }

    pub fn contains(&self, stage: &str) -> bool {
        self.index_of(stage).is_some()
    }

    /// Handling for an incoming event name. Unknown names are appended.
    pub fn handling(&self, stage: &str) -> StageHandling {
        match self.index_of(stage) {
            Some(idx) if idx == self.terminal => StageHandling::Terminal,
            _ => StageHandling::Append,
        }
    }

    pub fn terminal(&self) -> &StageName {
        &self.stages[self.terminal]
    }

    pub fn stages(&self) -> &[StageName] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Default for StageCatalog {
    fn default() -> Self {
        Self::pipeline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_order() {
        let catalog = StageCatalog::pipeline();
        let names: Vec<&str> = catalog.stages().iter().map(|s| s.as_str()).collect();
        assert_eq!(names, PIPELINE_STAGES);
        assert_eq!(catalog.index_of("status"), Some(0));
        assert_eq!(catalog.index_of("registry"), Some(3));
        assert_eq!(catalog.index_of("done"), Some(7));
        assert_eq!(catalog.terminal(), &"done");
    }

    #[test]
    fn test_unknown_stage() {
        let catalog = StageCatalog::pipeline();
        assert_eq!(catalog.index_of("head4"), None);
        assert!(!catalog.contains("head4"));
        assert_eq!(catalog.handling("head4"), StageHandling::Append);
    }

    #[test]
    fn test_handling_table() {
        let catalog = StageCatalog::pipeline();
        assert_eq!(catalog.handling("done"), StageHandling::Terminal);
        for stage in &PIPELINE_STAGES[..7] {
            assert_eq!(catalog.handling(stage), StageHandling::Append);
        }
    }

    #[test]
    fn test_custom_catalog_appends_terminal() {
        let catalog = StageCatalog::new(["fetch", "rank"], "finished").unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.index_of("finished"), Some(2));
        assert_eq!(catalog.handling("finished"), StageHandling::Terminal);

        // Terminal already listed keeps its position
        let catalog = StageCatalog::new(["a", "end", "b"], "end").unwrap();
        assert_eq!(catalog.index_of("end"), Some(1));
        assert_eq!(catalog.handling("b"), StageHandling::Append);
    }

    #[test]
    fn test_custom_catalog_rejects_bad_names() {
        assert_eq!(
            StageCatalog::new(["a", "a"], "done"),
            Err(CatalogError::Duplicate("a".to_string()))
        );
        assert_eq!(
            StageCatalog::new(["a", "  "], "done"),
            Err(CatalogError::BlankName)
        );
        assert_eq!(
            StageCatalog::new(Vec::<String>::new(), ""),
            Err(CatalogError::BlankName)
        );
    }
}
