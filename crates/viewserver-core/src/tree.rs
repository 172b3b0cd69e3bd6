use crate::error::ParseError;
use crate::node::NO_ID;
use crate::node::NodeId;
use crate::node::ViewNode;

/// A dumped view hierarchy stored as an arena.
///
/// Nodes are kept in pre-order, which is also the order the device sent
/// them in, so the root is always at index 0 and every child sits after its
/// parent.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewTree {
    nodes: Vec<ViewNode>,
}

impl ViewTree {
    /// Builds a tree from dump lines (without the trailing `DONE.`).
    ///
    /// Returns `Ok(None)` when there are no lines. Unlike the line-by-line
    /// [`TreeBuilder`], any malformed line fails the whole build.
    pub fn from_lines<I, S>(lines: I) -> Result<Option<Self>, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = TreeBuilder::new();
        for line in lines {
            builder.push_line(line.as_ref())?;
        }
        Ok(builder.finish())
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &ViewNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut ViewNode {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[ViewNode] {
        &self.nodes
    }

    /// Node ids of the subtree rooted at `from`, in pre-order.
    pub fn preorder(&self, from: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        order
    }

    pub fn find_by_hash(&self, hash_code: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.hash_code.eq_ignore_ascii_case(hash_code))
            .map(NodeId)
    }

    /// Recomputes `view_count` for every node: one plus the counts of its children.
    pub fn set_view_count(&mut self) {
        // Children always follow their parent, so a reverse sweep is post-order.
        for i in (0..self.nodes.len()).rev() {
            let count = 1 + self.nodes[i]
                .children
                .iter()
                .map(|child| self.nodes[child.0].view_count)
                .sum::<usize>();
            self.nodes[i].view_count = count;
        }
    }

    /// Marks nodes whose short class name or id contains `text`, ignoring case.
    ///
    /// An empty `text` clears every mark.
    pub fn filter(&mut self, text: &str) {
        let needle = text.to_lowercase();
        for node in &mut self.nodes {
            node.filtered = !needle.is_empty()
                && (node.short_name().to_lowercase().contains(&needle)
                    || (node.id != NO_ID && node.id.to_lowercase().contains(&needle)));
        }
    }
}

/// Incremental builder for the indentation-encoded dump format.
///
/// Each line's leading spaces give its depth. A line that is not deeper than
/// the current node pops back up to the right ancestor before being attached
/// as that ancestor's child.
#[derive(Debug)]
pub struct TreeBuilder {
    nodes: Vec<ViewNode>,
    current: Option<NodeId>,
    current_depth: isize,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            current: None,
            current_depth: -1,
        }
    }

    /// Parses and attaches one line. A rejected line leaves the builder unchanged.
    pub fn push_line(&mut self, line: &str) -> Result<NodeId, ParseError> {
        let indent = line.bytes().take_while(|b| *b == b' ').count();
        let mut node = ViewNode::parse(&line[indent..])?;
        let depth = indent as isize;

        let mut current = self.current;
        let mut current_depth = self.current_depth;
        while depth <= current_depth {
            match current {
                Some(id) => {
                    current = self.nodes[id.0].parent;
                    current_depth -= 1;
                }
                None => break,
            }
        }
        if current.is_none() && !self.nodes.is_empty() {
            return Err(ParseError::MultipleRoots);
        }

        let id = NodeId(self.nodes.len());
        if let Some(parent_id) = current {
            let parent = &mut self.nodes[parent_id.0];
            node.index = parent.children.len();
            node.depth = parent.depth + 1;
            node.parent = Some(parent_id);
            parent.children.push(id);
        }
        self.nodes.push(node);

        self.current = Some(id);
        self.current_depth = depth;
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the tree built so far, or `None` if no line was accepted.
    pub fn finish(self) -> Option<ViewTree> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(ViewTree { nodes: self.nodes })
        }
    }
}
