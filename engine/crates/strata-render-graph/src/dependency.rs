//! Pass 依赖图
//!
//! 根据 pass 的资源访问构建 RAW / WAR / WAW 依赖边。执行顺序始终是声明顺序，
//! 这里的 DAG 只用于诊断和导出。

use std::collections::HashMap;
use std::fmt;

use itertools::Itertools;
use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, EdgeReference, NodeIndex};

use crate::resource::RgResourceIndex;
use crate::resource_state::RgAccessKind;

/// 依赖的类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgHazard {
    ReadAfterWrite,
    WriteAfterRead,
    WriteAfterWrite,
}

impl fmt::Display for RgHazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReadAfterWrite => "RAW",
            Self::WriteAfterRead => "WAR",
            Self::WriteAfterWrite => "WAW",
        })
    }
}

/// 依赖边：producer 必须先于 consumer 执行
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RgDependencyEdge {
    pub hazards: Vec<(RgHazard, RgResourceIndex)>,
}

impl fmt::Display for RgDependencyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.hazards.iter().map(|(hazard, resource)| format!("{hazard} {resource}")).join(", ");
        f.write_str(&text)
    }
}

/// pass 之间的依赖图
#[derive(Default)]
pub struct RgDependencyGraph {
    graph: DiGraph<String, RgDependencyEdge>,
    nodes: Vec<NodeIndex>,
}

// new & init
impl RgDependencyGraph {
    /// 按执行顺序构建依赖图
    ///
    /// `accesses[i]` 是第 i 个 pass 合并之后的访问列表
    pub fn build(labels: &[&str], accesses: &[Vec<(RgResourceIndex, RgAccessKind)>]) -> Self {
        let _span = tracy_client::span!("RgDependencyGraph::build");

        let mut graph = DiGraph::new();
        let nodes = labels.iter().map(|label| graph.add_node(label.to_string())).collect();
        let mut dependency = Self { graph, nodes };

        let mut last_writer: HashMap<RgResourceIndex, usize> = HashMap::new();
        let mut readers_since_write: HashMap<RgResourceIndex, Vec<usize>> = HashMap::new();

        for (pass, pass_accesses) in accesses.iter().enumerate() {
            for &(resource, kind) in pass_accesses {
                match kind {
                    RgAccessKind::Read => {
                        if let Some(&writer) = last_writer.get(&resource) {
                            dependency.add_dependency(writer, pass, RgHazard::ReadAfterWrite, resource);
                        }
                        let readers = readers_since_write.entry(resource).or_default();
                        if !readers.contains(&pass) {
                            readers.push(pass);
                        }
                    }
                    RgAccessKind::Write => {
                        for reader in readers_since_write.remove(&resource).unwrap_or_default() {
                            dependency.add_dependency(reader, pass, RgHazard::WriteAfterRead, resource);
                        }
                        if let Some(writer) = last_writer.insert(resource, pass) {
                            dependency.add_dependency(writer, pass, RgHazard::WriteAfterWrite, resource);
                        }
                    }
                }
            }
        }

        dependency
    }

    fn add_dependency(&mut self, producer: usize, consumer: usize, hazard: RgHazard, resource: RgResourceIndex) {
        if producer == consumer {
            return;
        }
        let (from, to) = (self.nodes[producer], self.nodes[consumer]);
        let edge = match self.graph.find_edge(from, to) {
            Some(edge) => edge,
            None => self.graph.add_edge(from, to, RgDependencyEdge::default()),
        };
        let weight = &mut self.graph[edge];
        if !weight.hazards.contains(&(hazard, resource)) {
            weight.hazards.push((hazard, resource));
        }
    }
}

// getters
impl RgDependencyGraph {
    #[inline]
    pub fn pass_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// producer -> consumer 之间的依赖
    pub fn edge(&self, producer: usize, consumer: usize) -> Option<&RgDependencyEdge> {
        let from = *self.nodes.get(producer)?;
        let to = *self.nodes.get(consumer)?;
        self.graph.find_edge(from, to).map(|edge| &self.graph[edge])
    }

    /// 直接依赖（前驱），按 pass 索引排序
    pub fn predecessors(&self, pass: usize) -> Vec<usize> {
        self.neighbors(pass, Direction::Incoming)
    }

    /// 直接后继，按 pass 索引排序
    pub fn successors(&self, pass: usize) -> Vec<usize> {
        self.neighbors(pass, Direction::Outgoing)
    }

    fn neighbors(&self, pass: usize, direction: Direction) -> Vec<usize> {
        let Some(&node) = self.nodes.get(pass) else {
            return Vec::new();
        };
        self.graph.neighbors_directed(node, direction).map(|n| n.index()).sorted().collect()
    }

    /// 一个满足所有依赖的顺序；依赖边总是从前往后，所以一定存在
    pub fn topological_order(&self) -> Option<Vec<usize>> {
        toposort(&self.graph, None).ok().map(|order| order.into_iter().map(|n| n.index()).collect())
    }

    /// 导出 Graphviz DOT 格式
    pub fn to_dot(&self) -> String {
        let edge_attr = |_: &DiGraph<String, RgDependencyEdge>, edge: EdgeReference<'_, RgDependencyEdge>| {
            format!("label = \"{}\"", edge.weight())
        };
        let node_attr =
            |_: &DiGraph<String, RgDependencyEdge>, (_, label): (NodeIndex, &String)| format!("label = \"{label}\"");
        format!(
            "{:?}",
            Dot::with_attr_getters(&self.graph, &[Config::EdgeNoLabel, Config::NodeNoLabel], &edge_attr, &node_attr)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NORMAL: RgResourceIndex = RgResourceIndex(0);
    const LIT: RgResourceIndex = RgResourceIndex(1);

    fn deferred() -> RgDependencyGraph {
        use RgAccessKind::{Read, Write};
        RgDependencyGraph::build(
            &["gbuffer", "lighting", "post", "gbuffer-next"],
            &[
                vec![(NORMAL, Write)],
                vec![(NORMAL, Read), (LIT, Write)],
                vec![(LIT, Read)],
                vec![(NORMAL, Write)],
            ],
        )
    }

    #[test]
    fn hazards_become_edges() {
        let graph = deferred();

        assert_eq!(graph.pass_count(), 4);
        assert_eq!(graph.edge(0, 1).map(|e| e.hazards.clone()), Some(vec![(RgHazard::ReadAfterWrite, NORMAL)]));
        assert_eq!(graph.edge(1, 2).map(|e| e.hazards.clone()), Some(vec![(RgHazard::ReadAfterWrite, LIT)]));
        assert_eq!(graph.edge(1, 3).map(|e| e.hazards.clone()), Some(vec![(RgHazard::WriteAfterRead, NORMAL)]));
        assert_eq!(graph.edge(0, 3).map(|e| e.hazards.clone()), Some(vec![(RgHazard::WriteAfterWrite, NORMAL)]));
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.predecessors(3), vec![0, 1]);
        assert_eq!(graph.successors(0), vec![1, 3]);
    }

    #[test]
    fn declaration_order_is_a_valid_topological_order() {
        let graph = deferred();
        let order = graph.topological_order().expect("edges only point forward");
        let position = |pass: usize| order.iter().position(|&p| p == pass);
        assert!(position(0) < position(1));
        assert!(position(1) < position(2));
        assert!(position(1) < position(3));
    }

    #[test]
    fn dot_export_names_passes_and_hazards() {
        let dot = deferred().to_dot();
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("label = \"lighting\""));
        assert!(dot.contains("RAW #0"));
    }

    #[test]
    fn independent_passes_have_no_edges() {
        use RgAccessKind::Write;
        let graph = RgDependencyGraph::build(&["a", "b"], &[vec![(NORMAL, Write)], vec![(LIT, Write)]]);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.predecessors(1).is_empty());
    }
}
