//! Step dependency graph.
//!
//! Nodes are step names, edges point from a step to the steps it depends on.
//! The topological order is computed once at construction and is stable:
//! among steps that are ready at the same time, declaration order wins.

use std::collections::{BTreeSet, HashMap};

use salespipe_shared::{PipelineError, Result};

/// A validated, acyclic step graph.
#[derive(Debug, Clone)]
pub struct StepGraph {
    names: Vec<String>,
    index: HashMap<String, usize>,
    deps: Vec<Vec<usize>>,
    order: Vec<usize>,
}

impl StepGraph {
    /// Build a graph from `(step, deps)` pairs in declaration order.
    ///
    /// Fails on duplicate steps, dependencies on undeclared steps, and cycles.
    pub fn new<'a>(nodes: impl IntoIterator<Item = (&'a str, &'a [String])>) -> Result<Self> {
        let nodes: Vec<(&str, &[String])> = nodes.into_iter().collect();

        let mut names = Vec::with_capacity(nodes.len());
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, (name, _)) in nodes.iter().enumerate() {
            if index.insert(name.to_string(), i).is_some() {
                return Err(PipelineError::graph(format!("duplicate step `{name}`")));
            }
            names.push(name.to_string());
        }

        let mut deps = Vec::with_capacity(nodes.len());
        for (name, step_deps) in &nodes {
            let mut resolved = Vec::with_capacity(step_deps.len());
            for dep in step_deps.iter() {
                let idx = *index.get(dep.as_str()).ok_or_else(|| {
                    PipelineError::graph(format!("step `{name}` depends on unknown step `{dep}`"))
                })?;
                resolved.push(idx);
            }
            deps.push(resolved);
        }

        let order = topological_order(&names, &deps)?;
        Ok(Self {
            names,
            index,
            deps,
            order,
        })
    }

    /// All steps in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.names[i].as_str()).collect()
    }

    /// Transitive dependencies of `name`, excluding itself.
    pub fn upstream(&self, name: &str) -> Result<BTreeSet<&str>> {
        let start = self.lookup(name)?;
        let mut seen = BTreeSet::new();
        let mut stack = self.deps[start].clone();
        while let Some(i) = stack.pop() {
            if seen.insert(i) {
                stack.extend(self.deps[i].iter().copied());
            }
        }
        Ok(seen.into_iter().map(|i| self.names[i].as_str()).collect())
    }

    /// Ordered subset of steps for a run.
    ///
    /// An empty selection plans every step. With `with_upstream`, each selected
    /// step brings its transitive dependencies along.
    pub fn plan(&self, selection: &[String], with_upstream: bool) -> Result<Vec<&str>> {
        if selection.is_empty() {
            return Ok(self.order());
        }

        let mut wanted = BTreeSet::new();
        for name in selection {
            let idx = self.lookup(name)?;
            wanted.insert(idx);
            if with_upstream {
                for dep in self.upstream(name)? {
                    wanted.insert(self.index[dep]);
                }
            }
        }

        Ok(self
            .order
            .iter()
            .filter(|i| wanted.contains(*i))
            .map(|&i| self.names[i].as_str())
            .collect())
    }

    fn lookup(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| PipelineError::graph(format!("unknown step `{name}`")))
    }
}

/// Kahn's algorithm, always taking the lowest-index ready node.
fn topological_order(names: &[String], deps: &[Vec<usize>]) -> Result<Vec<usize>> {
    let n = names.len();
    let mut pending: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (node, node_deps) in deps.iter().enumerate() {
        for &dep in node_deps {
            dependents[dep].push(node);
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &child in &dependents[next] {
            pending[child] -= 1;
            if pending[child] == 0 {
                ready.insert(child);
            }
        }
    }

    if order.len() < n {
        let stuck: Vec<&str> = (0..n)
            .filter(|&i| pending[i] > 0)
            .map(|i| names[i].as_str())
            .collect();
        return Err(PipelineError::graph(format!(
            "dependency cycle among: {}",
            stuck.join(", ")
        )));
    }
    Ok(order)
}
