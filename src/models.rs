//! Physical plan model
//!
//! A physical plan describes where the sub-tasks of one distributed query run:
//!
//! ```text
//!              Root (broker, merges results)
//!             /                \
//!   Intermediate (broker)   Intermediate (broker)
//!        /      \                 |
//!     Leaf     Leaf             Leaf (storage nodes)
//! ```
//!
//! The root always fans out to exactly one tier: the intermediates when the
//! plan has any, otherwise the leaves.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Routing indicator of a cluster node (its address, e.g. `"10.0.0.4:9000"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeIndicator(pub String);

impl NodeIndicator {
    pub fn new(indicator: impl Into<String>) -> Self {
        Self(indicator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeIndicator {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Root node of a plan, the broker that receives the query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    pub indicator: NodeIndicator,
    /// Number of sub-task results the root waits for
    pub num_of_task: usize,
}

/// Intermediate broker that merges results of its own leaves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intermediate {
    pub indicator: NodeIndicator,
    pub parent: NodeIndicator,
    pub num_of_task: usize,
}

/// Storage node that executes the query against its shards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaf {
    pub indicator: NodeIndicator,
    pub parent: NodeIndicator,
    /// Shards this leaf reads
    #[serde(default)]
    pub shard_ids: Vec<u32>,
}

/// Compiled distributed execution plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalPlan {
    pub database: String,
    pub root: Root,
    #[serde(default)]
    pub intermediates: Vec<Intermediate>,
    #[serde(default)]
    pub leafs: Vec<Leaf>,
}

/// Which tier the root dispatches to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOut {
    Intermediates,
    Leafs,
}

impl PhysicalPlan {
    /// Create a plan with only a root; tiers are added with the builder methods
    pub fn new(database: impl Into<String>, root: Root) -> Self {
        Self {
            database: database.into(),
            root,
            intermediates: Vec::new(),
            leafs: Vec::new(),
        }
    }

    /// Builder: add an intermediate node
    pub fn intermediate(mut self, intermediate: Intermediate) -> Self {
        self.intermediates.push(intermediate);
        self
    }

    /// Builder: add a leaf node
    pub fn leaf(mut self, leaf: Leaf) -> Self {
        self.leafs.push(leaf);
        self
    }

    /// Tier the root's first hop goes to, `None` for a plan with nothing to run
    pub fn fan_out(&self) -> Option<FanOut> {
        if !self.intermediates.is_empty() {
            Some(FanOut::Intermediates)
        } else if !self.leafs.is_empty() {
            Some(FanOut::Leafs)
        } else {
            None
        }
    }

    /// Dispatch targets of the root, in plan order
    pub fn targets(&self) -> Vec<&NodeIndicator> {
        match self.fan_out() {
            Some(FanOut::Intermediates) => self.intermediates.iter().map(|n| &n.indicator).collect(),
            Some(FanOut::Leafs) => self.leafs.iter().map(|n| &n.indicator).collect(),
            None => Vec::new(),
        }
    }

    /// Leaf indicators in plan order
    pub fn leaf_targets(&self) -> Vec<&NodeIndicator> {
        self.leafs.iter().map(|n| &n.indicator).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Root {
        Root {
            indicator: "broker-1".into(),
            num_of_task: 2,
        }
    }

    fn leaf(name: &str) -> Leaf {
        Leaf {
            indicator: name.into(),
            parent: "broker-1".into(),
            shard_ids: vec![1],
        }
    }

    #[test]
    fn test_fan_out_prefers_intermediates() {
        let plan = PhysicalPlan::new("db", root())
            .intermediate(Intermediate {
                indicator: "broker-2".into(),
                parent: "broker-1".into(),
                num_of_task: 1,
            })
            .leaf(leaf("storage-1"));

        assert_eq!(plan.fan_out(), Some(FanOut::Intermediates));
        assert_eq!(plan.targets(), vec![&NodeIndicator::from("broker-2")]);
    }

    #[test]
    fn test_fan_out_leafs_in_order() {
        let plan = PhysicalPlan::new("db", root())
            .leaf(leaf("storage-2"))
            .leaf(leaf("storage-1"));

        assert_eq!(plan.fan_out(), Some(FanOut::Leafs));
        let targets: Vec<&str> = plan.targets().iter().map(|t| t.as_str()).collect();
        assert_eq!(targets, vec!["storage-2", "storage-1"]);
    }

    #[test]
    fn test_empty_plan_has_no_fan_out() {
        let plan = PhysicalPlan::new("db", root());
        assert_eq!(plan.fan_out(), None);
        assert!(plan.targets().is_empty());
    }

    #[test]
    fn test_plan_json_shape() {
        let plan = PhysicalPlan::new("db", root()).leaf(leaf("storage-1"));
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["root"]["indicator"], "broker-1");
        assert_eq!(json["leafs"][0]["indicator"], "storage-1");
    }
}
