//! Arena-backed reasoning tree.
//!
//! The tree owns every node in one map keyed by id. Parent links are plain
//! ids, so walking up or down is a sequence of map lookups and no node ever
//! holds a reference to another.

use chrono::{DateTime, Utc};
use ponder_config::ExplorationStrategyKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::TreeError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtType {
    Hypothesis,
    #[default]
    Analysis,
    Alternative,
    Refinement,
    Conclusion,
}

impl ThoughtType {
    /// Lenient parse of a model-provided label; unknown labels are analysis.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "hypothesis" => Self::Hypothesis,
            "alternative" => Self::Alternative,
            "refinement" => Self::Refinement,
            "conclusion" => Self::Conclusion,
            _ => Self::Analysis,
        }
    }
}

/// Node lifecycle: Active → Evaluated → {Pruned | BestPath}.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    #[default]
    Active,
    Evaluated,
    Pruned,
    BestPath,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThoughtNode {
    pub id: String,
    pub parent_id: Option<String>,
    pub child_ids: Vec<String>,
    pub depth: usize,
    pub thought: String,
    pub thought_type: ThoughtType,
    /// In [0, 1] once evaluated.
    pub score: f64,
    pub state: NodeState,
    pub evaluated_utc: Option<DateTime<Utc>>,
}

impl ThoughtNode {
    fn new(parent_id: Option<String>, depth: usize, thought: String, thought_type: ThoughtType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id,
            child_ids: Vec::new(),
            depth,
            thought,
            thought_type,
            score: 0.0,
            state: NodeState::Active,
            evaluated_utc: None,
        }
    }

    pub fn is_pruned(&self) -> bool {
        self.state == NodeState::Pruned
    }

    pub fn is_evaluated(&self) -> bool {
        self.evaluated_utc.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningTree {
    root_id: Option<String>,
    nodes: HashMap<String, ThoughtNode>,
    pub max_depth: usize,
    pub max_nodes: usize,
    pub strategy: ExplorationStrategyKind,
    pub best_path: Vec<String>,
    pub created_utc: DateTime<Utc>,
    pub completed_utc: Option<DateTime<Utc>>,
}

impl ReasoningTree {
    pub fn new(max_depth: usize, max_nodes: usize, strategy: ExplorationStrategyKind) -> Self {
        Self {
            root_id: None,
            nodes: HashMap::new(),
            max_depth,
            max_nodes: max_nodes.max(1),
            strategy,
            best_path: Vec::new(),
            created_utc: Utc::now(),
            completed_utc: None,
        }
    }

    pub fn root_id(&self) -> Option<&str> {
        self.root_id.as_deref()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_at_capacity(&self) -> bool {
        self.nodes.len() >= self.max_nodes
    }

    pub fn node(&self, id: &str) -> Option<&ThoughtNode> {
        self.nodes.get(id)
    }

    fn node_mut(&mut self, id: &str) -> Result<&mut ThoughtNode, TreeError> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| TreeError::NodeNotFound(id.to_string()))
    }

    /// Create the root. Fails if one already exists.
    pub fn create_root(&mut self, thought: impl Into<String>, thought_type: ThoughtType) -> Result<String, TreeError> {
        if self.root_id.is_some() {
            return Err(TreeError::RootAlreadyExists);
        }
        let node = ThoughtNode::new(None, 0, thought.into(), thought_type);
        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        self.root_id = Some(id.clone());
        Ok(id)
    }

    /// Append a child under `parent_id` at `parent.depth + 1`.
    pub fn add_child(
        &mut self,
        parent_id: &str,
        thought: impl Into<String>,
        thought_type: ThoughtType,
    ) -> Result<String, TreeError> {
        let parent = self
            .nodes
            .get(parent_id)
            .ok_or_else(|| TreeError::ParentNotFound(parent_id.to_string()))?;
        if parent.depth >= self.max_depth {
            return Err(TreeError::MaxDepthExceeded {
                node_id: parent_id.to_string(),
                max_depth: self.max_depth,
            });
        }
        if self.is_at_capacity() {
            return Err(TreeError::AtCapacity {
                max_nodes: self.max_nodes,
            });
        }

        let node = ThoughtNode::new(Some(parent_id.to_string()), parent.depth + 1, thought.into(), thought_type);
        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        self.node_mut(parent_id)?.child_ids.push(id.clone());
        Ok(id)
    }

    /// Whether `id` may receive children: it exists, is not pruned, sits
    /// above the depth limit, and the tree has room.
    pub fn can_expand(&self, id: &str) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|n| !n.is_pruned() && n.depth < self.max_depth)
            && !self.is_at_capacity()
    }

    /// Record an evaluation. The score is clamped to [0, 1].
    pub fn set_score(&mut self, id: &str, score: f64) -> Result<(), TreeError> {
        let node = self.node_mut(id)?;
        node.score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
        node.evaluated_utc = Some(Utc::now());
        if node.state == NodeState::Active {
            node.state = NodeState::Evaluated;
        }
        Ok(())
    }

    /// Mark `id` and every descendant pruned. Returns how many nodes changed.
    pub fn prune(&mut self, id: &str) -> Result<usize, TreeError> {
        if !self.nodes.contains_key(id) {
            return Err(TreeError::NodeNotFound(id.to_string()));
        }
        let mut changed = 0;
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&current) else {
                continue;
            };
            if node.state != NodeState::Pruned {
                node.state = NodeState::Pruned;
                changed += 1;
            }
            stack.extend(node.child_ids.iter().cloned());
        }
        Ok(changed)
    }

    pub fn is_pruned(&self, id: &str) -> bool {
        self.nodes.get(id).is_some_and(ThoughtNode::is_pruned)
    }

    /// Children of `id` that are still live.
    pub fn live_children(&self, id: &str) -> Vec<String> {
        self.nodes
            .get(id)
            .map(|n| {
                n.child_ids
                    .iter()
                    .filter(|c| !self.is_pruned(c))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `id` ends an explored chain: it is evaluated, live, and none
    /// of its live children has been evaluated.
    pub fn is_explored_leaf(&self, id: &str) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        node.is_evaluated()
            && !node.is_pruned()
            && !node.child_ids.iter().any(|c| {
                self.nodes
                    .get(c)
                    .is_some_and(|child| !child.is_pruned() && child.is_evaluated())
            })
    }

    /// The highest-scoring explored leaf and its score.
    ///
    /// Ties go to the deeper leaf, then to the one reached first walking
    /// children in generation order.
    pub fn best_leaf(&self) -> Option<(String, f64)> {
        let mut best: Option<(&str, f64, usize)> = None;
        let mut stack: Vec<&str> = self.root_id.as_deref().into_iter().collect();
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if node.is_pruned() {
                continue;
            }
            if self.is_explored_leaf(id) {
                let better = match best {
                    None => true,
                    Some((_, score, depth)) => node.score > score || (node.score == score && node.depth > depth),
                };
                if better {
                    best = Some((id, node.score, node.depth));
                }
            }
            stack.extend(node.child_ids.iter().rev().map(String::as_str));
        }
        best.map(|(id, score, _)| (id.to_string(), score))
    }

    /// Ids from the root down to `id`.
    pub fn path_to(&self, id: &str) -> Result<Vec<String>, TreeError> {
        let mut path = Vec::new();
        let mut current = Some(id.to_string());
        while let Some(node_id) = current {
            let node = self
                .nodes
                .get(&node_id)
                .ok_or_else(|| TreeError::NodeNotFound(node_id.clone()))?;
            current = node.parent_id.clone();
            path.push(node_id);
        }
        path.reverse();
        Ok(path)
    }

    /// The thought texts along `path`.
    pub fn thoughts(&self, path: &[String]) -> Vec<String> {
        path.iter()
            .filter_map(|id| self.nodes.get(id))
            .map(|n| n.thought.clone())
            .collect()
    }

    /// Mark the tree finished with `path` as its best path.
    pub fn complete(&mut self, path: Vec<String>) -> Result<(), TreeError> {
        for id in &path {
            let node = self
                .nodes
                .get(id)
                .ok_or_else(|| TreeError::NodeNotFound(id.clone()))?;
            if node.is_pruned() {
                return Err(TreeError::PrunedNodeInPath(id.clone()));
            }
        }
        for id in &path {
            self.node_mut(id)?.state = NodeState::BestPath;
        }
        self.best_path = path;
        self.completed_utc = Some(Utc::now());
        Ok(())
    }
}
