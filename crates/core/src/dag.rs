use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum composite tree depth accepted at registration.
pub const MAX_DAG_DEPTH: usize = 8;

/// Validation errors for composite trees.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DagError {
    /// The tree exceeds [`MAX_DAG_DEPTH`].
    #[error("composite tree depth {0} exceeds maximum of {MAX_DAG_DEPTH}")]
    TooDeep(usize),

    /// An AND/OR node has no children.
    #[error("{0} node has no children")]
    EmptyNode(&'static str),

    /// A leaf references an empty guardrail id.
    #[error("leaf references an empty guardrail id")]
    EmptyLeaf,
}

/// A node in the AND/OR/NOT composition tree.
///
/// Leaves reference guardrail ids; inner nodes combine child decisions. The
/// structure is a tree (no sharing, no cycles), so depth bounds it fully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeNode {
    /// Reference to a registered guardrail.
    Leaf(String),
    /// Blocks when any child blocks; short-circuits on the first block.
    And(Vec<CompositeNode>),
    /// Allows when any child allows; short-circuits on the first allow.
    Or(Vec<CompositeNode>),
    /// Flips its single child's decision.
    Not(Box<CompositeNode>),
}

impl CompositeNode {
    /// Depth of the tree (a lone leaf has depth 1).
    pub fn depth(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::And(children) | Self::Or(children) => {
                1 + children.iter().map(Self::depth).max().unwrap_or(0)
            }
            Self::Not(child) => 1 + child.depth(),
        }
    }

    /// Validate shape constraints: bounded depth, non-empty operator nodes,
    /// non-empty leaf ids.
    pub fn validate(&self) -> Result<(), DagError> {
        let depth = self.depth();
        if depth > MAX_DAG_DEPTH {
            return Err(DagError::TooDeep(depth));
        }
        self.validate_shape()
    }

    fn validate_shape(&self) -> Result<(), DagError> {
        match self {
            Self::Leaf(id) => {
                if id.is_empty() {
                    return Err(DagError::EmptyLeaf);
                }
            }
            Self::And(children) => {
                if children.is_empty() {
                    return Err(DagError::EmptyNode("and"));
                }
                for child in children {
                    child.validate_shape()?;
                }
            }
            Self::Or(children) => {
                if children.is_empty() {
                    return Err(DagError::EmptyNode("or"));
                }
                for child in children {
                    child.validate_shape()?;
                }
            }
            Self::Not(child) => child.validate_shape()?,
        }
        Ok(())
    }

    /// All guardrail ids referenced by leaves, in pre-order.
    pub fn referenced_ids(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_ids(&mut out);
        out
    }

    fn collect_ids<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Leaf(id) => out.push(id),
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_ids(out);
                }
            }
            Self::Not(child) => child.collect_ids(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: &str) -> CompositeNode {
        CompositeNode::Leaf(id.into())
    }

    #[test]
    fn depth_of_leaf_is_one() {
        assert_eq!(leaf("a").depth(), 1);
    }

    #[test]
    fn depth_counts_nesting() {
        let tree = CompositeNode::And(vec![
            leaf("a"),
            CompositeNode::Not(Box::new(CompositeNode::Or(vec![leaf("b"), leaf("c")]))),
        ]);
        assert_eq!(tree.depth(), 4);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn rejects_over_deep_tree() {
        let mut tree = leaf("a");
        for _ in 0..MAX_DAG_DEPTH {
            tree = CompositeNode::Not(Box::new(tree));
        }
        assert_eq!(tree.depth(), MAX_DAG_DEPTH + 1);
        assert_eq!(tree.validate(), Err(DagError::TooDeep(MAX_DAG_DEPTH + 1)));
    }

    #[test]
    fn accepts_tree_at_max_depth() {
        let mut tree = leaf("a");
        for _ in 0..(MAX_DAG_DEPTH - 1) {
            tree = CompositeNode::Not(Box::new(tree));
        }
        assert_eq!(tree.depth(), MAX_DAG_DEPTH);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn rejects_empty_operator_nodes() {
        assert_eq!(
            CompositeNode::And(vec![]).validate(),
            Err(DagError::EmptyNode("and"))
        );
        assert_eq!(
            CompositeNode::Or(vec![]).validate(),
            Err(DagError::EmptyNode("or"))
        );
    }

    #[test]
    fn rejects_empty_leaf_id() {
        let tree = CompositeNode::And(vec![leaf("")]);
        assert_eq!(tree.validate(), Err(DagError::EmptyLeaf));
    }

    #[test]
    fn referenced_ids_preorder() {
        let tree = CompositeNode::Or(vec![
            CompositeNode::And(vec![leaf("a"), leaf("b")]),
            CompositeNode::Not(Box::new(leaf("c"))),
        ]);
        assert_eq!(tree.referenced_ids(), vec!["a", "b", "c"]);
    }

    #[test]
    fn serde_shape() {
        let tree = CompositeNode::And(vec![
            leaf("pii_blocker"),
            CompositeNode::Not(Box::new(leaf("allow_list"))),
        ]);
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "and": [
                    {"leaf": "pii_blocker"},
                    {"not": {"leaf": "allow_list"}},
                ]
            })
        );
        let back: CompositeNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, tree);
    }
}
