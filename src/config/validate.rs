// src/config/validate.rs

use anyhow::{bail, Result};
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::ConfigFile;

impl ConfigFile {
    /// Semantic validation of a loaded plan file.
    ///
    /// Checks:
    /// - at least one `[unit.<name>]` section
    /// - `max_forks >= 1`
    /// - system and unit names fit the breadcrumb/result-file grammar
    /// - every `after` reference names another existing unit
    /// - the unit graph has no cycles (reported with full membership)
    pub fn validate(&self) -> Result<()> {
        if self.unit.is_empty() {
            bail!("plan file must contain at least one [unit.<name>] section");
        }
        if self.build.max_forks == 0 {
            bail!("[build].max_forks must be >= 1 (got 0)");
        }

        check_name("system", &self.build.system)?;
        for name in self.unit.keys() {
            check_name("unit", name)?;
        }

        let graph = self.dependency_graph()?;
        reject_cycles(&graph)
    }

    /// Adjacency over unit names, with reference errors caught as the
    /// edges are added. Edge direction: dep -> unit.
    fn dependency_graph(&self) -> Result<DiGraphMap<&str, ()>> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.unit.keys() {
            graph.add_node(name.as_str());
        }
        for (name, unit) in self.unit.iter() {
            for dep in unit.after.iter() {
                if dep == name {
                    bail!("unit '{name}' lists itself in `after`");
                }
                if !self.unit.contains_key(dep) {
                    bail!("unit '{name}' lists unknown unit '{dep}' in `after`");
                }
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }
        Ok(graph)
    }
}

/// Names end up as whitespace-separated words in breadcrumb records and as
/// file-name stems for result files, so restrict them accordingly.
fn check_name(what: &str, name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !ok {
        bail!("invalid {what} name '{name}': use ASCII letters, digits, '_', '-', '.'");
    }
    Ok(())
}

/// A strongly connected component with more than one member is a dependency
/// cycle; name every unit on it. (Self-loops were already rejected while
/// the graph was built.)
fn reject_cycles(graph: &DiGraphMap<&str, ()>) -> Result<()> {
    for component in tarjan_scc(graph) {
        if component.len() > 1 {
            let mut members: Vec<&str> = component;
            members.sort_unstable();
            bail!(
                "units depend on each other in a cycle: {}",
                members.join(" -> ")
            );
        }
    }
    Ok(())
}
