//! Version graph verification
//!
//! Checks, for every version of a history:
//! - edge symmetry (`a` in `b.predecessors` iff `b` in `a.successors`)
//! - the root has no predecessors, every other version has one or more
//! - every edge resolves to a version of the same history
//! - no version reaches itself through predecessor edges
//! - the frozen node exists
//!
//! Problems are reported, never repaired.

use std::collections::HashMap;

use serde::Serialize;

use crate::observability::{Event, Logger};
use crate::state::EntityId;
use crate::txn::ItemStateManager;

use super::errors::VersionResult;
use super::history::{Arena, VersionHistory};

/// A single verification finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum GraphProblem {
    RootHasPredecessors { version: EntityId },
    MissingPredecessors { version: EntityId },
    DanglingEdge { version: EntityId, target: EntityId },
    /// `successor` lists `predecessor`, but not the other way round
    MissingSuccessorEdge { predecessor: EntityId, successor: EntityId },
    /// `predecessor` lists `successor`, but not the other way round
    MissingPredecessorEdge { predecessor: EntityId, successor: EntityId },
    Cycle { version: EntityId },
    MissingFrozenNode { version: EntityId, frozen_node: EntityId },
}

/// Outcome of `VersionHistory::verify`.
#[derive(Debug, Clone, Serialize)]
pub struct GraphReport {
    pub history: EntityId,
    pub versions: usize,
    pub problems: Vec<GraphProblem>,
}

impl GraphReport {
    pub fn is_consistent(&self) -> bool {
        self.problems.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Reports every version that closes a predecessor cycle.
fn find_cycles(arena: &Arena, problems: &mut Vec<GraphProblem>) {
    let mut marks: HashMap<EntityId, Mark> = HashMap::new();

    for start in arena.ordered() {
        if marks.contains_key(&start.id()) {
            continue;
        }
        // Iterative DFS: (version, index of next predecessor to visit)
        let mut stack: Vec<(EntityId, usize)> = vec![(start.id(), 0)];
        marks.insert(start.id(), Mark::Visiting);

        while let Some((id, next)) = stack.last().copied() {
            let preds = arena
                .versions
                .get(&id)
                .map(|v| v.predecessor_ids())
                .unwrap_or_default();

            if next >= preds.len() {
                marks.insert(id, Mark::Done);
                stack.pop();
                continue;
            }
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }

            let pred = preds[next];
            if !arena.versions.contains_key(&pred) {
                continue;
            }
            match marks.get(&pred) {
                Some(Mark::Visiting) => problems.push(GraphProblem::Cycle { version: pred }),
                Some(Mark::Done) => {}
                None => {
                    marks.insert(pred, Mark::Visiting);
                    stack.push((pred, 0));
                }
            }
        }
    }
}

impl VersionHistory {
    /// Checks the graph invariants and reports every violation found.
    pub fn verify<M: ItemStateManager + ?Sized>(&self, manager: &M) -> VersionResult<GraphReport> {
        let arena = self.read()?;
        let mut problems = Vec::new();

        for version in arena.ordered() {
            let id = version.id();
            let preds = version.predecessor_ids();

            if version.is_root() && !preds.is_empty() {
                problems.push(GraphProblem::RootHasPredecessors { version: id });
            }
            if !version.is_root() && preds.is_empty() {
                problems.push(GraphProblem::MissingPredecessors { version: id });
            }

            for pred in preds {
                match arena.versions.get(pred) {
                    None => problems.push(GraphProblem::DanglingEdge {
                        version: id,
                        target: *pred,
                    }),
                    Some(p) if !p.successor_ids().contains(&id) => {
                        problems.push(GraphProblem::MissingSuccessorEdge {
                            predecessor: *pred,
                            successor: id,
                        })
                    }
                    Some(_) => {}
                }
            }

            for succ in version.successor_ids() {
                match arena.versions.get(succ) {
                    None => problems.push(GraphProblem::DanglingEdge {
                        version: id,
                        target: *succ,
                    }),
                    Some(s) if !s.predecessor_ids().contains(&id) => {
                        problems.push(GraphProblem::MissingPredecessorEdge {
                            predecessor: id,
                            successor: *succ,
                        })
                    }
                    Some(_) => {}
                }
            }

            if !manager.has_item_state(&version.frozen_node_id()) {
                problems.push(GraphProblem::MissingFrozenNode {
                    version: id,
                    frozen_node: version.frozen_node_id(),
                });
            }
        }

        find_cycles(&arena, &mut problems);

        let report = GraphReport {
            history: self.id(),
            versions: arena.versions.len(),
            problems,
        };
        if !report.is_consistent() {
            Logger::warn(
                Event::GraphInconsistent.as_str(),
                &[
                    ("history_id", &report.history.to_string()),
                    ("problems", &report.problems.len().to_string()),
                ],
            );
        }
        Ok(report)
    }
}
