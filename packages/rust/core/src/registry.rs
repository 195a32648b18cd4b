//! Step registry: the declared steps plus their dependency graph.

use std::sync::Arc;

use salespipe_shared::{Result, SourcesConfig};

use crate::graph::StepGraph;
use crate::steps::{CsvLoad, Step, joined_data};

/// Holds registered steps and the graph built from their declared dependencies.
pub struct Definitions {
    steps: Vec<Arc<dyn Step>>,
    graph: StepGraph,
}

impl Definitions {
    /// Register `steps`, validating their dependency graph.
    pub fn new(steps: Vec<Arc<dyn Step>>) -> Result<Self> {
        let graph = StepGraph::new(steps.iter().map(|s| (s.name(), s.deps())))?;
        Ok(Self { steps, graph })
    }

    /// The dependency graph.
    pub fn graph(&self) -> &StepGraph {
        &self.graph
    }

    /// Look up a step by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Step>> {
        self.steps.iter().find(|s| s.name() == name)
    }

    /// Steps in execution order.
    pub fn steps(&self) -> Vec<&Arc<dyn Step>> {
        self.graph
            .order()
            .into_iter()
            .filter_map(|name| self.get(name))
            .collect()
    }
}

/// The sales pipeline: three CSV loads feeding the `joined_data` view.
pub fn sales_pipeline(sources: &SourcesConfig) -> Result<Definitions> {
    Definitions::new(vec![
        Arc::new(CsvLoad::new("products", &sources.products)),
        Arc::new(CsvLoad::new("sales_reps", &sources.sales_reps)),
        Arc::new(CsvLoad::new("sales_data", &sources.sales_data)),
        Arc::new(joined_data()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::ViewStep;

    #[test]
    fn sales_pipeline_shape() {
        let defs = sales_pipeline(&SourcesConfig::default()).expect("definitions");
        let steps = defs.steps();
        let names: Vec<&str> = steps.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["products", "sales_reps", "sales_data", "joined_data"]);

        let join = defs.get("joined_data").expect("join step");
        assert_eq!(join.kind(), "view");
        assert_eq!(join.deps().len(), 3);
        assert_eq!(defs.get("products").map(|s| s.group()), Some("ingestion"));
        assert!(defs.get("orders").is_none());
    }

    #[test]
    fn undeclared_dependency_is_rejected() {
        let result = Definitions::new(vec![Arc::new(ViewStep::new(
            "summary",
            ["joined_data"],
            "SELECT * FROM joined_data",
        ))]);
        assert_eq!(result.err().map(|e| e.kind()), Some("graph"));
    }
}
