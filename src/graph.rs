//! Arena view over a problem's segment tree and relationship edges.
//!
//! Segments are stored once in a `Vec`; parent/child links and relationship
//! edges are index pairs into it. The arena is rebuilt from storage whenever
//! it is needed and never mutated in place.

use serde::Serialize;
use std::collections::HashMap;

use crate::error::{AnalysisError, AnalysisResult};
use crate::storage::{Relationship, Segment};

#[derive(Debug, Clone)]
struct Edge {
    from: usize,
    to: usize,
    relationship: Relationship,
}

/// Validated segment tree of one problem.
#[derive(Debug, Clone)]
pub struct SegmentGraph {
    problem_id: String,
    nodes: Vec<Segment>,
    by_id: HashMap<String, usize>,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    edges: Vec<Edge>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

/// Nested rendering of the tree, roots first.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentTreeNode {
    #[serde(flatten)]
    pub segment: Segment,
    pub children: Vec<SegmentTreeNode>,
}

/// A relationship together with the segment at its other end.
#[derive(Debug, Clone, Copy)]
pub struct LinkedSegment<'a> {
    pub relationship: &'a Relationship,
    pub segment: &'a Segment,
}

impl SegmentGraph {
    /// Build the arena, rejecting foreign segments, dangling parents and parent cycles.
    pub fn build(
        problem_id: &str,
        segments: Vec<Segment>,
        relationships: Vec<Relationship>,
    ) -> AnalysisResult<Self> {
        let mut by_id = HashMap::with_capacity(segments.len());
        for (position, segment) in segments.iter().enumerate() {
            if segment.problem_id != problem_id {
                return Err(AnalysisError::invalid_argument(format!(
                    "segment {} belongs to problem {}, not {}",
                    segment.id, segment.problem_id, problem_id
                )));
            }
            by_id.insert(segment.id.clone(), position);
        }

        let mut parent = vec![None; segments.len()];
        let mut children = vec![Vec::new(); segments.len()];
        for (position, segment) in segments.iter().enumerate() {
            if let Some(parent_id) = &segment.parent_id {
                let Some(&parent_position) = by_id.get(parent_id) else {
                    return Err(AnalysisError::invalid_argument(format!(
                        "parent {} of segment {} is not a segment of problem {}",
                        parent_id, segment.id, problem_id
                    )));
                };
                parent[position] = Some(parent_position);
                children[parent_position].push(position);
            }
        }

        let mut graph = Self {
            problem_id: problem_id.to_string(),
            nodes: segments,
            by_id,
            parent,
            children,
            edges: Vec::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
        };
        graph.reject_cycles()?;

        graph.outgoing = vec![Vec::new(); graph.nodes.len()];
        graph.incoming = vec![Vec::new(); graph.nodes.len()];
        for relationship in relationships {
            let from = graph.position(&relationship.from_segment_id)?;
            let to = graph.position(&relationship.to_segment_id)?;
            let edge = graph.edges.len();
            graph.outgoing[from].push(edge);
            graph.incoming[to].push(edge);
            graph.edges.push(Edge {
                from,
                to,
                relationship,
            });
        }

        Ok(graph)
    }

    fn reject_cycles(&self) -> AnalysisResult<()> {
        // 0 = unvisited, 1 = on current chain, 2 = known to reach a root
        let mut state = vec![0u8; self.nodes.len()];
        for start in 0..self.nodes.len() {
            let mut chain = Vec::new();
            let mut cursor = Some(start);
            while let Some(position) = cursor {
                match state[position] {
                    2 => break,
                    1 => {
                        return Err(AnalysisError::invalid_argument(format!(
                            "segment {} is its own ancestor",
                            self.nodes[position].id
                        )))
                    }
                    _ => {
                        state[position] = 1;
                        chain.push(position);
                        cursor = self.parent[position];
                    }
                }
            }
            for position in chain {
                state[position] = 2;
            }
        }
        Ok(())
    }

    fn position(&self, id: &str) -> AnalysisResult<usize> {
        self.by_id
            .get(id)
            .copied()
            .ok_or_else(|| AnalysisError::NotFound {
                entity: "Segment",
                id: id.to_string(),
            })
    }

    pub fn problem_id(&self) -> &str {
        &self.problem_id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Segment> {
        self.by_id.get(id).map(|&p| &self.nodes[p])
    }

    /// Segments without a parent, in storage order.
    pub fn roots(&self) -> Vec<&Segment> {
        self.parent
            .iter()
            .enumerate()
            .filter(|(_, parent)| parent.is_none())
            .map(|(position, _)| &self.nodes[position])
            .collect()
    }

    pub fn children(&self, id: &str) -> AnalysisResult<Vec<&Segment>> {
        let position = self.position(id)?;
        Ok(self.children[position]
            .iter()
            .map(|&child| &self.nodes[child])
            .collect())
    }

    /// Parent chain of `id`, nearest first.
    pub fn ancestors(&self, id: &str) -> AnalysisResult<Vec<&Segment>> {
        let mut cursor = self.parent[self.position(id)?];
        let mut chain = Vec::new();
        while let Some(position) = cursor {
            chain.push(&self.nodes[position]);
            cursor = self.parent[position];
        }
        Ok(chain)
    }

    /// Relationships leaving `id`, with their targets.
    pub fn outgoing(&self, id: &str) -> AnalysisResult<Vec<LinkedSegment<'_>>> {
        let position = self.position(id)?;
        Ok(self.outgoing[position]
            .iter()
            .map(|&edge| LinkedSegment {
                relationship: &self.edges[edge].relationship,
                segment: &self.nodes[self.edges[edge].to],
            })
            .collect())
    }

    /// Relationships arriving at `id`, with their sources.
    pub fn incoming(&self, id: &str) -> AnalysisResult<Vec<LinkedSegment<'_>>> {
        let position = self.position(id)?;
        Ok(self.incoming[position]
            .iter()
            .map(|&edge| LinkedSegment {
                relationship: &self.edges[edge].relationship,
                segment: &self.nodes[self.edges[edge].from],
            })
            .collect())
    }

    /// Check that `segment` may take its declared parent in this problem.
    ///
    /// Works for new segments and for re-parenting existing ones.
    pub fn validate_parent(&self, segment: &Segment) -> AnalysisResult<()> {
        if segment.problem_id != self.problem_id {
            return Err(AnalysisError::invalid_argument(format!(
                "segment {} belongs to problem {}, not {}",
                segment.id, segment.problem_id, self.problem_id
            )));
        }
        let Some(parent_id) = &segment.parent_id else {
            return Ok(());
        };
        if parent_id == &segment.id {
            return Err(AnalysisError::invalid_argument(format!(
                "segment {} cannot be its own parent",
                segment.id
            )));
        }

        let parent_position = self.by_id.get(parent_id).copied().ok_or_else(|| {
            AnalysisError::invalid_argument(format!(
                "parent {} is not a segment of problem {}",
                parent_id, self.problem_id
            ))
        })?;

        let mut cursor = Some(parent_position);
        while let Some(position) = cursor {
            if self.nodes[position].id == segment.id {
                return Err(AnalysisError::invalid_argument(format!(
                    "making {} the parent of {} would create a cycle",
                    parent_id, segment.id
                )));
            }
            cursor = self.parent[position];
        }
        Ok(())
    }

    /// Nested view of every root and its descendants.
    pub fn tree(&self) -> Vec<SegmentTreeNode> {
        self.parent
            .iter()
            .enumerate()
            .filter(|(_, parent)| parent.is_none())
            .map(|(position, _)| self.subtree(position))
            .collect()
    }

    fn subtree(&self, position: usize) -> SegmentTreeNode {
        SegmentTreeNode {
            segment: self.nodes[position].clone(),
            children: self.children[position]
                .iter()
                .map(|&child| self.subtree(child))
                .collect(),
        }
    }
}
