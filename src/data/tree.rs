// tree.rs - Arena phylogenetic tree and Newick parsing

use crate::data::SequenceSet;
use crate::error::{HcError, Result};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

pub type NodeId = usize;

/// A tree node. Parent and children are arena indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub branch_length: f64,
    /// Support on the percent scale (0-100), if annotated
    pub support: Option<f64>,
    pub leaf_label: Option<String>,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Rooted tree stored as an arena of nodes.
///
/// The outermost Newick node is the root. Unrooted trees keep their basal
/// multifurcation as the root; the root clade is never a group candidate.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

fn support_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)").expect("valid support regex")
    })
}

/// Parse the leading number of an internal node label (`95/0.98` reads as 95)
pub fn parse_support_label(label: &str) -> Option<f64> {
    support_regex()
        .captures(label)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

impl Tree {
    /// Build a tree from explicit nodes, checking the arena invariants
    pub fn from_nodes(nodes: Vec<Node>, root: NodeId) -> Result<Self> {
        let tree = Self { nodes, root };
        tree.check_structure()?;
        Ok(tree)
    }

    pub fn from_newick(text: &str) -> Result<Self> {
        let mut tree = NewickParser::new(text).parse()?;
        tree.normalize_support();
        tree.check_structure()?;
        Ok(tree)
    }

    pub fn from_newick_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| HcError::io(path, e))?;
        let tree = Self::from_newick(&text)?;
        println!(
            "🌳 Loaded tree from {}: {} nodes, {} leaves",
            path.display(),
            tree.len(),
            tree.leaf_count()
        );
        Ok(tree)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Node ids in post-order (children before parents, children in file order)
    pub fn post_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            for &child in self.nodes[id].children.iter().rev() {
                stack.push((child, false));
            }
        }
        order
    }

    /// Leaf ids in left-to-right order
    pub fn leaves(&self) -> Vec<NodeId> {
        self.post_order()
            .into_iter()
            .filter(|&id| self.nodes[id].is_leaf())
            .collect()
    }

    /// Leaf ids below (and including) a node, left to right
    pub fn leaves_under(&self, id: NodeId) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            if node.is_leaf() {
                leaves.push(current);
            } else {
                for &child in node.children.iter().rev() {
                    stack.push(child);
                }
            }
        }
        leaves
    }

    /// Number of leaves below every node, indexed by node id
    pub fn leaf_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.nodes.len()];
        for id in self.post_order() {
            let node = &self.nodes[id];
            counts[id] = if node.is_leaf() {
                1
            } else {
                node.children.iter().map(|&c| counts[c]).sum()
            };
        }
        counts
    }

    pub fn leaf_label(&self, id: NodeId) -> Option<&str> {
        self.nodes[id].leaf_label.as_deref()
    }

    pub fn leaf_labels(&self) -> Vec<&str> {
        self.leaves()
            .into_iter()
            .filter_map(|id| self.leaf_label(id))
            .collect()
    }

    /// Every leaf label must name a sequence of the set
    pub fn validate_against(&self, sequences: &SequenceSet) -> Result<()> {
        let missing: Vec<&str> = self
            .leaf_labels()
            .into_iter()
            .filter(|label| !sequences.contains(label))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        let preview: Vec<&str> = missing.iter().take(5).copied().collect();
        Err(HcError::MalformedTree(format!(
            "{} leaf label(s) absent from the sequence set (e.g. {})",
            missing.len(),
            preview.join(", ")
        )))
    }

    /// Rescale fraction-style support (all values <= 1) to percent
    fn normalize_support(&mut self) {
        let supports: Vec<f64> = self.nodes.iter().filter_map(|n| n.support).collect();
        if !supports.is_empty() && supports.iter().all(|&s| s <= 1.0) {
            for node in &mut self.nodes {
                if let Some(s) = node.support.as_mut() {
                    *s *= 100.0;
                }
            }
        }
    }

    fn check_structure(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(HcError::MalformedTree("tree has no nodes".to_string()));
        }
        if self.root >= self.nodes.len() {
            return Err(HcError::MalformedTree(format!("root {} out of range", self.root)));
        }
        if self.nodes[self.root].parent.is_some() {
            return Err(HcError::MalformedTree("root node has a parent".to_string()));
        }

        let mut seen = vec![false; self.nodes.len()];
        let mut labels = HashSet::new();
        let mut stack = vec![self.root];

        while let Some(id) = stack.pop() {
            if seen[id] {
                return Err(HcError::MalformedTree(format!(
                    "node {} reached twice (cycle or shared child)",
                    id
                )));
            }
            seen[id] = true;
            let node = &self.nodes[id];

            if node.id != id {
                return Err(HcError::MalformedTree(format!(
                    "node at index {} carries id {}",
                    id, node.id
                )));
            }
            if !(node.branch_length >= 0.0) {
                return Err(HcError::MalformedTree(format!(
                    "node {} has invalid branch length {}",
                    id, node.branch_length
                )));
            }

            if node.is_leaf() {
                match node.leaf_label.as_deref() {
                    Some(label) if !label.is_empty() => {
                        if !labels.insert(label) {
                            return Err(HcError::MalformedTree(format!(
                                "duplicate leaf label '{}'",
                                label
                            )));
                        }
                    }
                    _ => {
                        return Err(HcError::MalformedTree(format!("leaf {} has no label", id)))
                    }
                }
            }

            for &child in &node.children {
                if child >= self.nodes.len() {
                    return Err(HcError::MalformedTree(format!(
                        "node {} references missing child {}",
                        id, child
                    )));
                }
                if self.nodes[child].parent != Some(id) {
                    return Err(HcError::MalformedTree(format!(
                        "child {} does not point back to parent {}",
                        child, id
                    )));
                }
                stack.push(child);
            }
        }

        if let Some(orphan) = seen.iter().position(|&s| !s) {
            return Err(HcError::MalformedTree(format!(
                "node {} is not reachable from the root",
                orphan
            )));
        }
        Ok(())
    }
}

/// Iterative Newick reader (deep caterpillar trees do not recurse)
struct NewickParser<'a> {
    bytes: &'a [u8],
    pos: usize,
    nodes: Vec<Node>,
}

impl<'a> NewickParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
            nodes: Vec::new(),
        }
    }

    fn error(&self, message: impl Into<String>) -> HcError {
        HcError::Newick {
            position: self.pos,
            message: message.into(),
        }
    }

    fn add_node(&mut self, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            id,
            parent,
            children: Vec::new(),
            branch_length: 0.0,
            support: None,
            leaf_label: None,
        });
        if let Some(p) = parent {
            self.nodes[p].children.push(id);
        }
        id
    }

    fn parse(mut self) -> Result<Tree> {
        // open internal nodes
        let mut open: Vec<NodeId> = Vec::new();
        // last completed node, waiting for its label or length
        let mut current: Option<NodeId> = None;
        // a child slot was opened by '(' or ',' and not yet filled
        let mut expecting_child = false;
        let mut finished = false;

        while self.pos < self.bytes.len() {
            let c = self.bytes[self.pos];
            match c {
                b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                b'[' => self.skip_comment()?,
                b'(' => {
                    if finished {
                        return Err(self.error("content after ';'"));
                    }
                    if current.is_some() || (!open.is_empty() && !expecting_child) {
                        return Err(self.error("unexpected '('"));
                    }
                    if open.is_empty() && !self.nodes.is_empty() {
                        return Err(self.error("more than one root clade"));
                    }
                    let id = self.add_node(open.last().copied());
                    open.push(id);
                    expecting_child = true;
                    self.pos += 1;
                }
                b',' => {
                    if open.is_empty() {
                        return Err(self.error("',' outside parentheses"));
                    }
                    if expecting_child {
                        return Err(self.error("empty leaf label"));
                    }
                    current = None;
                    expecting_child = true;
                    self.pos += 1;
                }
                b')' => {
                    if expecting_child {
                        return Err(self.error("empty leaf label"));
                    }
                    let closed = open.pop().ok_or_else(|| self.error("unbalanced ')'"))?;
                    current = Some(closed);
                    self.pos += 1;
                }
                b':' => {
                    self.pos += 1;
                    let node = current.ok_or_else(|| self.error("branch length without node"))?;
                    let length = self.read_number()?;
                    if length < 0.0 {
                        return Err(HcError::MalformedTree(format!(
                            "negative branch length {} at byte {}",
                            length, self.pos
                        )));
                    }
                    self.nodes[node].branch_length = length;
                }
                b';' => {
                    if !open.is_empty() {
                        return Err(self.error("unbalanced '(' before ';'"));
                    }
                    if self.nodes.is_empty() {
                        return Err(self.error("empty tree"));
                    }
                    finished = true;
                    self.pos += 1;
                }
                _ => {
                    if finished {
                        return Err(self.error("content after ';'"));
                    }
                    let label = self.read_label()?;
                    match current {
                        Some(id) if !self.nodes[id].is_leaf() => {
                            self.nodes[id].support = parse_support_label(&label);
                        }
                        Some(_) => return Err(self.error("leaf has two labels")),
                        None => {
                            if !open.is_empty() && !expecting_child {
                                return Err(self.error("unexpected label"));
                            }
                            if open.is_empty() && !self.nodes.is_empty() {
                                return Err(self.error("more than one root clade"));
                            }
                            let id = self.add_node(open.last().copied());
                            self.nodes[id].leaf_label = Some(label);
                            current = Some(id);
                            expecting_child = false;
                        }
                    }
                }
            }
        }

        if !finished {
            return Err(self.error("missing terminating ';'"));
        }
        Ok(Tree {
            nodes: self.nodes,
            root: 0,
        })
    }

    fn skip_comment(&mut self) -> Result<()> {
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos] != b']' {
            self.pos += 1;
        }
        if self.pos >= self.bytes.len() {
            self.pos = start;
            return Err(self.error("unterminated comment"));
        }
        self.pos += 1;
        Ok(())
    }

    fn read_label(&mut self) -> Result<String> {
        if self.bytes[self.pos] == b'\'' {
            self.pos += 1;
            let mut label = Vec::new();
            loop {
                if self.pos >= self.bytes.len() {
                    return Err(self.error("unterminated quoted label"));
                }
                let b = self.bytes[self.pos];
                self.pos += 1;
                if b == b'\'' {
                    // doubled quote is an escaped quote
                    if self.bytes.get(self.pos) == Some(&b'\'') {
                        label.push(b'\'');
                        self.pos += 1;
                        continue;
                    }
                    break;
                }
                label.push(b);
            }
            return Ok(String::from_utf8_lossy(&label).into_owned());
        }

        let start = self.pos;
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'(' | b')' | b',' | b':' | b';' | b'[' | b' ' | b'\t' | b'\n' | b'\r' => break,
                _ => self.pos += 1,
            }
        }
        // unquoted underscores stand for blanks in Newick; ids keep them as-is
        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    fn read_number(&mut self) -> Result<f64> {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        let start = self.pos;
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'0'..=b'9' | b'.' | b'-' | b'+' | b'e' | b'E' => self.pos += 1,
                _ => break,
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or("");
        text.parse::<f64>()
            .map_err(|_| self.error(format!("invalid branch length '{}'", text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Origin, Sequence};

    fn labels_of(tree: &Tree, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .filter_map(|&id| tree.leaf_label(id).map(str::to_string))
            .collect()
    }

    #[test]
    fn test_parse_basic_newick() {
        let tree = Tree::from_newick("((A:0.1,B:0.2)90:0.05,(C,D)40:0.3,E);").unwrap();
        assert_eq!(tree.leaf_count(), 5);
        assert_eq!(labels_of(&tree, &tree.leaves()), vec!["A", "B", "C", "D", "E"]);

        let root = tree.node(tree.root());
        assert_eq!(root.children.len(), 3);
        let ab = tree.node(root.children[0]);
        assert_eq!(ab.support, Some(90.0));
        assert!((ab.branch_length - 0.05).abs() < 1e-12);
        let a = tree.node(ab.children[0]);
        assert!((a.branch_length - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_fraction_support_rescaled_to_percent() {
        let tree = Tree::from_newick("((A,B)0.95,(C,D)0.4);").unwrap();
        let root = tree.node(tree.root());
        let first = tree.node(root.children[0]).support.unwrap();
        let second = tree.node(root.children[1]).support.unwrap();
        assert!((first - 95.0).abs() < 1e-9);
        assert!((second - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_compound_support_label_and_comments() {
        let tree = Tree::from_newick("[&R] (('seq one':1,B:1)87/0.99:0.2,C:1);").unwrap();
        let root = tree.node(tree.root());
        assert_eq!(tree.node(root.children[0]).support, Some(87.0));
        assert_eq!(tree.leaf_labels(), vec!["seq one", "B", "C"]);
    }

    #[test]
    fn test_post_order_children_first() {
        let tree = Tree::from_newick("((A,B),C);").unwrap();
        let order = tree.post_order();
        assert_eq!(*order.last().unwrap(), tree.root());
        let counts = tree.leaf_counts();
        assert_eq!(counts[tree.root()], 3);
        for id in order {
            for &child in &tree.node(id).children {
                assert!(counts[child] < counts[id]);
            }
        }
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(matches!(Tree::from_newick("((A,B);"), Err(HcError::Newick { .. })));
        assert!(matches!(Tree::from_newick("(A,B)"), Err(HcError::Newick { .. })));
        assert!(matches!(Tree::from_newick("(A,,B);"), Err(HcError::Newick { .. })));
        assert!(matches!(
            Tree::from_newick("(A,A);"),
            Err(HcError::MalformedTree(_))
        ));
        assert!(matches!(
            Tree::from_newick("(A:-1,B);"),
            Err(HcError::MalformedTree(_))
        ));
        assert!(matches!(Tree::from_newick("(A,B);(C,D);"), Err(HcError::Newick { .. })));
    }

    #[test]
    fn test_cycle_detected_in_arena() {
        let nodes = vec![
            Node {
                id: 0,
                parent: None,
                children: vec![1],
                branch_length: 0.0,
                support: None,
                leaf_label: None,
            },
            Node {
                id: 1,
                parent: Some(0),
                children: vec![0],
                branch_length: 0.0,
                support: None,
                leaf_label: None,
            },
        ];
        assert!(matches!(Tree::from_nodes(nodes, 0), Err(HcError::MalformedTree(_))));
    }

    #[test]
    fn test_validate_against_sequences() {
        let tree = Tree::from_newick("(A,(B,C));").unwrap();
        let seqs = SequenceSet::from_sequences(vec![
            Sequence::new("A", b"MK".to_vec(), Origin::Training),
            Sequence::new("B", b"MK".to_vec(), Origin::Training),
        ])
        .unwrap();
        let err = tree.validate_against(&seqs).unwrap_err();
        assert!(err.to_string().contains("C"));
    }

    #[test]
    fn test_deep_caterpillar_does_not_overflow() {
        let mut newick = String::new();
        let depth = 20_000;
        for _ in 0..depth {
            newick.push('(');
        }
        newick.push_str("L0");
        for i in 1..=depth {
            newick.push_str(&format!(",L{})", i));
        }
        newick.push(';');
        let tree = Tree::from_newick(&newick).unwrap();
        assert_eq!(tree.leaf_count(), depth + 1);
        assert_eq!(tree.leaf_counts()[tree.root()], depth + 1);
    }
}
