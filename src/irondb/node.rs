use crate::irondb::reader::SeriesReader;
use futures::Stream;
use std::pin::Pin;

pub type NodeStream = Pin<Box<dyn Stream<Item = Node> + Send>>;

#[derive(Debug, Clone)]
pub struct LeafNode {
    pub name: String,
    pub reader: SeriesReader,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchNode {
    pub name: String,
}

/// A metric name produced by discovery.
#[derive(Debug, Clone)]
pub enum Node {
    Leaf(LeafNode),
    Branch(BranchNode),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Leaf(leaf) => &leaf.name,
            Node::Branch(branch) => &branch.name,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub fn as_leaf(&self) -> Option<&LeafNode> {
        match self {
            Node::Leaf(leaf) => Some(leaf),
            Node::Branch(_) => None,
        }
    }
}
