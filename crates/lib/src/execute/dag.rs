//! The stage DAG.
//!
//! Stages of a project and their dependencies, with parallel execution
//! waves computed by Kahn levels.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::link::OutputRef;
use crate::project::{CheckKind, Project};

use super::types::{SourceSet, Stage, StageError};

/// A DAG of the stages needed for a project.
pub struct StageDag {
  graph: DiGraph<Stage, ()>,
  nodes: HashMap<Stage, NodeIndex>,
}

/// The stage producing an output reference.
pub fn producer(output: &OutputRef) -> Stage {
  match output {
    OutputRef::Target(name) => Stage::Target(name.clone()),
    OutputRef::Book => Stage::Book,
    OutputRef::BuildSource => Stage::Source(SourceSet::Build),
    OutputRef::DocsSource => Stage::Source(SourceSet::Docs),
    OutputRef::SourceDiff => Stage::SourceDiff,
  }
}

impl StageDag {
  /// Every stage of the project, hygiene checks included.
  pub fn from_project(project: &Project) -> Result<Self, StageError> {
    let mut edges: Vec<(Stage, Stage)> = Vec::new();
    let build_src = Stage::Source(SourceSet::Build);

    if project.needs_toolchain() {
      edges.push((build_src.clone(), Stage::Deps));
      edges.push((Stage::Toolchain, Stage::Deps));
    }

    for name in &project.targets {
      let target = Stage::Target(name.clone());
      edges.push((Stage::Deps, target.clone()));
      edges.push((build_src.clone(), target.clone()));
      edges.push((Stage::Toolchain, target));
    }

    if project.has_docs() {
      edges.push((Stage::Source(SourceSet::Docs), Stage::Book));
    }

    for kind in &project.checks {
      let check = Stage::Check(*kind);
      if *kind == CheckKind::Selection {
        edges.push((Stage::SourceDiff, check));
      } else {
        edges.push((Stage::Deps, check.clone()));
        edges.push((build_src.clone(), check.clone()));
        edges.push((Stage::Toolchain, check));
      }
    }

    for output in project.outputs.values() {
      edges.push((producer(output), Stage::Link));
    }

    let mut dag = Self {
      graph: DiGraph::new(),
      nodes: HashMap::new(),
    };
    // The link stage exists even with no outputs: it still produces an (empty) result tree.
    dag.add_node(Stage::Link);
    for (dep, dependent) in edges {
      let from = dag.add_node(dep);
      let to = dag.add_node(dependent);
      dag.graph.update_edge(from, to, ());
    }

    dag.verify_acyclic()?;
    Ok(dag)
  }

  fn add_node(&mut self, stage: Stage) -> NodeIndex {
    if let Some(&idx) = self.nodes.get(&stage) {
      return idx;
    }
    let idx = self.graph.add_node(stage.clone());
    self.nodes.insert(stage, idx);
    idx
  }

  fn verify_acyclic(&self) -> Result<(), StageError> {
    toposort(&self.graph, None).map_err(|_| StageError::CycleDetected)?;
    Ok(())
  }

  /// Keep only `stage` and everything it transitively depends on.
  pub fn restrict_to(&self, stage: &Stage) -> Self {
    let mut keep: HashSet<NodeIndex> = HashSet::new();
    if let Some(&start) = self.nodes.get(stage) {
      let mut stack = vec![start];
      while let Some(idx) = stack.pop() {
        if keep.insert(idx) {
          stack.extend(self.graph.neighbors_directed(idx, Direction::Incoming));
        }
      }
    }

    let graph = self.graph.filter_map(
      |idx, stage| keep.contains(&idx).then(|| stage.clone()),
      |_, edge| Some(*edge),
    );
    let nodes = graph.node_indices().map(|idx| (graph[idx].clone(), idx)).collect();
    Self { graph, nodes }
  }

  pub fn contains(&self, stage: &Stage) -> bool {
    self.nodes.contains_key(stage)
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  /// Stages organized into parallel execution waves.
  ///
  /// Each wave only depends on earlier waves. Stages within a wave are
  /// sorted so runs and listings are deterministic.
  pub fn waves(&self) -> Result<Vec<Vec<Stage>>, StageError> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();
    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let ready: Vec<NodeIndex> = remaining.iter().filter(|&&idx| in_degree[&idx] == 0).copied().collect();
      if ready.is_empty() {
        return Err(StageError::CycleDetected);
      }

      for &idx in &ready {
        remaining.remove(&idx);
        for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&neighbor) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      let mut wave: Vec<Stage> = ready.into_iter().map(|idx| self.graph[idx].clone()).collect();
      wave.sort();
      waves.push(wave);
    }

    Ok(waves)
  }

  /// Direct dependencies of a stage, sorted.
  pub fn dependencies(&self, stage: &Stage) -> Vec<Stage> {
    let Some(&idx) = self.nodes.get(stage) else {
      return Vec::new();
    };
    let deps: BTreeSet<Stage> = self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dep| self.graph[dep].clone())
      .collect();
    deps.into_iter().collect()
  }

  /// Every stage with its direct dependencies.
  pub fn edges(&self) -> BTreeMap<Stage, Vec<Stage>> {
    self.nodes.keys().map(|stage| (stage.clone(), self.dependencies(stage))).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::project::ProjectDecl;
  use std::collections::BTreeMap as Map;
  use std::path::Path;

  fn project(targets: &[&str], docs: bool, checks: Option<&[&str]>) -> Project {
    let decl = ProjectDecl {
      targets: targets.iter().map(|t| t.to_string()).collect(),
      checks: checks.map(|c| c.iter().map(|s| s.to_string()).collect()),
      sources: crate::project::SourcesDecl {
        docs: if docs { vec!["book".to_string()] } else { Vec::new() },
        ..Default::default()
      },
      ..Default::default()
    };
    decl.validate(Path::new("/ws/build.lua")).unwrap()
  }

  fn position(waves: &[Vec<Stage>], stage: &Stage) -> usize {
    waves.iter().position(|w| w.contains(stage)).unwrap()
  }

  #[test]
  fn waves_order_dependencies_first() {
    let dag = StageDag::from_project(&project(&["zebrad"], true, None)).unwrap();
    let waves = dag.waves().unwrap();

    let deps = position(&waves, &Stage::Deps);
    assert!(position(&waves, &Stage::Source(SourceSet::Build)) < deps);
    assert!(position(&waves, &Stage::Toolchain) < deps);
    assert!(deps < position(&waves, &Stage::Target("zebrad".into())));
    assert!(deps < position(&waves, &Stage::Check(CheckKind::Clippy)));
    assert!(position(&waves, &Stage::Book) < position(&waves, &Stage::Link));
  }

  #[test]
  fn checks_never_depend_on_targets() {
    let dag = StageDag::from_project(&project(&["zebrad"], false, None)).unwrap();
    for kind in CheckKind::ALL {
      let deps = dag.dependencies(&Stage::Check(kind));
      assert!(!deps.iter().any(|d| matches!(d, Stage::Target(_))), "{kind} depends on a target");
    }
  }

  #[test]
  fn restriction_keeps_only_what_outputs_need() {
    let dag = StageDag::from_project(&project(&["zebrad"], true, None)).unwrap();
    let build = dag.restrict_to(&Stage::Link);

    assert!(build.contains(&Stage::Target("zebrad".into())));
    assert!(build.contains(&Stage::Book));
    assert!(build.contains(&Stage::Deps));
    assert!(!build.contains(&Stage::Check(CheckKind::Fmt)));
    assert!(!build.contains(&Stage::Check(CheckKind::Selection)));
    assert!(build.waves().unwrap().iter().flatten().all(|s| build.contains(s)));
  }

  #[test]
  fn no_book_stage_without_docs() {
    let dag = StageDag::from_project(&project(&[], false, Some(&["selection"]))).unwrap();
    assert!(!dag.contains(&Stage::Book));
    assert!(!dag.contains(&Stage::Source(SourceSet::Docs)));
    assert!(dag.contains(&Stage::SourceDiff));
  }

  #[test]
  fn deps_only_exist_when_something_consumes_them() {
    let dag = StageDag::from_project(&project(&[], false, Some(&["selection"]))).unwrap();
    assert!(!dag.contains(&Stage::Deps));
    assert!(!dag.contains(&Stage::Toolchain));
  }

  #[test]
  fn independent_targets_share_a_wave() {
    let dag = StageDag::from_project(&project(&["zebrad", "zallet"], false, Some(&[]))).unwrap();
    let waves = dag.waves().unwrap();
    assert_eq!(
      position(&waves, &Stage::Target("zebrad".into())),
      position(&waves, &Stage::Target("zallet".into()))
    );
  }

  #[test]
  fn edges_lists_every_stage() {
    let dag = StageDag::from_project(&project(&["zebrad"], false, Some(&[]))).unwrap();
    let edges: Map<Stage, Vec<Stage>> = dag.edges();
    assert_eq!(edges.len(), dag.len());
    assert_eq!(
      edges[&Stage::Deps],
      vec![Stage::Source(SourceSet::Build), Stage::Toolchain]
    );
  }
}
