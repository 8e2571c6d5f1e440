use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::{cte::CteDefinition, scanner::tokenize};

/// Marker rendered for a CTE that depends on no other CTE.
pub const NO_DEPENDENCIES: &str = "None";

/// `from_cte` textually references `to_cte` in its body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DependencyEdge {
    pub from_cte: String,
    pub to_cte: String,
}

/// Builds an edge `A -> B` for every pair of distinct CTEs where the name of
/// `B` appears as an identifier in the body of `A`. Matching is
/// case-insensitive and ignores string literals. Edges follow definition
/// order of `A`, then of `B`.
pub fn build_dependency_edges(ctes: &IndexMap<String, CteDefinition>) -> Vec<DependencyEdge> {
    let mut edges = vec![];
    for (name, cte) in ctes {
        let referenced: HashSet<String> = tokenize(&cte.body)
            .iter()
            .filter_map(|tok| tok.ident_name())
            .map(|ident| ident.to_lowercase())
            .collect();
        for other in ctes.keys() {
            if other != name && referenced.contains(other) {
                edges.push(DependencyEdge {
                    from_cte: name.clone(),
                    to_cte: other.clone(),
                });
            }
        }
    }
    edges
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("CTE dependency cycle: {}", .cycle.join(" -> "))]
pub struct CycleError {
    /// CTEs on the cycle, starting and ending with the same name.
    pub cycle: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Adjacency view over the CTE dependency relation.
///
/// The relation is not required to be acyclic; [`CteGraph::cycles`] and
/// [`CteGraph::topological_order`] report cycles instead of assuming a DAG.
#[derive(Debug, Clone, Default)]
pub struct CteGraph {
    dependencies: IndexMap<String, Vec<String>>,
}

impl CteGraph {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a String>, edges: &[DependencyEdge]) -> Self {
        let mut dependencies: IndexMap<String, Vec<String>> = names
            .into_iter()
            .map(|name| (name.clone(), vec![]))
            .collect();
        for edge in edges {
            dependencies
                .entry(edge.from_cte.clone())
                .or_default()
                .push(edge.to_cte.clone());
            dependencies.entry(edge.to_cte.clone()).or_default();
        }
        Self { dependencies }
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.dependencies.keys()
    }

    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.dependencies
            .get(name)
            .map(|deps| deps.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.dependencies
            .iter()
            .filter(|(_, deps)| deps.iter().any(|dep| dep == name))
            .map(|(cte, _)| cte.as_str())
            .collect()
    }

    /// `"<cte> -> dep1, dep2"`, or `"<cte> -> None"` without dependencies.
    pub fn dependency_line(&self, name: &str) -> String {
        let deps = self.dependencies_of(name);
        if deps.is_empty() {
            format!("{} -> {}", name, NO_DEPENDENCIES)
        } else {
            format!("{} -> {}", name, deps.join(", "))
        }
    }

    /// Cycles closed by a back edge of a depth-first walk in definition order.
    /// Each cycle is listed once, starting at the CTE where the walk entered it.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut marks: IndexMap<&str, Mark> = self
            .dependencies
            .keys()
            .map(|name| (name.as_str(), Mark::Unvisited))
            .collect();
        let mut seen: IndexSet<Vec<String>> = IndexSet::new();
        let mut cycles = vec![];

        for name in self.dependencies.keys() {
            if marks[name.as_str()] == Mark::Unvisited {
                let mut path = vec![];
                self.visit(name, &mut marks, &mut path, &mut |cycle: &[String]| {
                    let mut key = cycle.to_vec();
                    key.sort();
                    if seen.insert(key) {
                        cycles.push(cycle.to_vec());
                    }
                });
            }
        }
        cycles
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        marks: &mut IndexMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
        on_cycle: &mut dyn FnMut(&[String]),
    ) {
        marks.insert(name, Mark::InProgress);
        path.push(name);
        for dep in self.dependencies_of(name) {
            match marks.get(dep.as_str()).copied().unwrap_or(Mark::Done) {
                Mark::Unvisited => self.visit(dep, marks, path, on_cycle),
                Mark::InProgress => {
                    let start = path.iter().position(|p| *p == dep.as_str()).unwrap_or(0);
                    let cycle: Vec<String> = path[start..].iter().map(|p| p.to_string()).collect();
                    on_cycle(&cycle);
                }
                Mark::Done => {}
            }
        }
        path.pop();
        marks.insert(name, Mark::Done);
    }

    /// Orders CTEs so that every CTE comes after the CTEs it depends on.
    pub fn topological_order(&self) -> Result<Vec<String>, CycleError> {
        if let Some(cycle) = self.cycles().into_iter().next() {
            let mut closed = cycle.clone();
            closed.push(cycle[0].clone());
            return Err(CycleError { cycle: closed });
        }

        let mut ordered: IndexSet<&str> = IndexSet::new();
        let mut stack: Vec<(&str, usize)> = vec![];
        for root in self.dependencies.keys() {
            if ordered.contains(root.as_str()) {
                continue;
            }
            stack.push((root.as_str(), 0));
            while let Some((name, next_dep)) = stack.pop() {
                let deps = self.dependencies_of(name);
                match deps.get(next_dep) {
                    Some(dep) => {
                        stack.push((name, next_dep + 1));
                        if !ordered.contains(dep.as_str()) {
                            stack.push((dep.as_str(), 0));
                        }
                    }
                    None => {
                        ordered.insert(name);
                    }
                }
            }
        }
        Ok(ordered.into_iter().map(str::to_owned).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctes(defs: &[(&str, &str)]) -> IndexMap<String, CteDefinition> {
        defs.iter()
            .map(|(name, body)| {
                (
                    name.to_string(),
                    CteDefinition {
                        name: name.to_string(),
                        body: body.to_string(),
                    },
                )
            })
            .collect()
    }

    fn edge(from: &str, to: &str) -> DependencyEdge {
        DependencyEdge {
            from_cte: from.to_owned(),
            to_cte: to.to_owned(),
        }
    }

    #[test]
    fn test_edges_whole_word_case_insensitive() {
        let defs = ctes(&[
            ("a", "select 1"),
            ("b", "select * from A"),
            ("ab", "select b.x, 'a' from b join a_old on true"),
        ]);
        assert_eq!(
            build_dependency_edges(&defs),
            vec![edge("b", "a"), edge("ab", "b")]
        );
    }

    #[test]
    fn test_no_self_edges() {
        let defs = ctes(&[("r", "select 1 union all select n + 1 from r")]);
        assert!(build_dependency_edges(&defs).is_empty());
    }

    #[test]
    fn test_dependency_lines() {
        let defs = ctes(&[("a", "select 1"), ("b", "select * from a"), ("c", "select * from a, b")]);
        let graph = CteGraph::new(defs.keys(), &build_dependency_edges(&defs));
        assert_eq!(graph.dependency_line("a"), "a -> None");
        assert_eq!(graph.dependency_line("c"), "c -> a, b");
        assert_eq!(graph.dependents_of("a"), vec!["b", "c"]);
    }

    #[test]
    fn test_topological_order() {
        let names = vec!["c".to_owned(), "b".to_owned(), "a".to_owned()];
        let graph = CteGraph::new(&names, &[edge("c", "b"), edge("b", "a"), edge("c", "a")]);
        assert_eq!(graph.topological_order().unwrap(), vec!["a", "b", "c"]);
        assert!(graph.cycles().is_empty());
    }

    #[test]
    fn test_cycles_are_reported() {
        let names = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
        let graph = CteGraph::new(&names, &[edge("a", "b"), edge("b", "a"), edge("b", "c")]);
        assert_eq!(graph.cycles(), vec![vec!["a".to_owned(), "b".to_owned()]]);
        let err = graph.topological_order().unwrap_err();
        assert_eq!(err.cycle, vec!["a", "b", "a"]);
        assert_eq!(err.to_string(), "CTE dependency cycle: a -> b -> a");
    }
}
