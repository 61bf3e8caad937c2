use crate::value::Value;

/// Stable handle to a node in a [`Tree`].
///
/// Ids are indices into the tree's arena and stay valid for the lifetime of
/// the tree; detaching a node unlinks it from its parent but never
/// invalidates ids pointing at it or its descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    name: String,
    value: Value,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An ordered, mutable tree of named, dynamically-valued nodes.
///
/// Nodes live in an arena owned by the tree; the parent link is a plain
/// back-index, so cycles and dangling parents cannot be constructed through
/// this API. Sibling order is significant and defines document order.
///
/// # Examples
///
/// ```
/// use grove_lang::{Tree, Value};
///
/// let mut tree = Tree::new();
/// let root = tree.root();
/// let a = tree.add(root, "a", Value::Int(1));
/// let b = tree.add(root, "b", Value::Null);
/// tree.add(b, "c", Value::Null);
///
/// assert_eq!(tree.children(root), &[a, b]);
/// assert_eq!(tree.name(a), "a");
/// assert_eq!(tree.path(a), "0");
/// ```
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<NodeData>,
}

impl Tree {
    /// Creates a tree holding a single root node with an empty name and a
    /// null value.
    pub fn new() -> Self {
        Tree {
            nodes: vec![NodeData {
                name: String::new(),
                value: Value::Null,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// The root node the tree was created with.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of nodes allocated in the arena, detached subtrees included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        false // a tree always has its root
    }

    fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.0]
    }

    /// Appends a new child under `parent` and returns its id.
    pub fn add(&mut self, parent: NodeId, name: impl Into<String>, value: Value) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            name: name.into(),
            value,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.node_mut(parent).children.push(id);
        id
    }

    /// Inserts a new child under `parent` at `index`.
    pub fn insert(
        &mut self,
        parent: NodeId,
        index: usize,
        name: impl Into<String>,
        value: Value,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            name: name.into(),
            value,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.node_mut(parent).children.insert(index, id);
        id
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.node(id).name
    }

    pub fn value(&self, id: NodeId) -> &Value {
        &self.node(id).value
    }

    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) {
        self.node_mut(id).name = name.into();
    }

    pub fn set_value(&mut self, id: NodeId, value: Value) {
        self.node_mut(id).value = value;
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).children.first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).children.last().copied()
    }

    /// Position of `id` among its siblings, `None` for detached nodes and
    /// the root.
    pub fn sibling_index(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.sibling_index(id)?;
        if index == 0 {
            None
        } else {
            Some(self.children(parent)[index - 1])
        }
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.sibling_index(id)?;
        self.children(parent).get(index + 1).copied()
    }

    /// Previous node in document order: the previous sibling's deepest last
    /// descendant, or the parent when there is no previous sibling.
    pub fn previous_node(&self, id: NodeId) -> Option<NodeId> {
        match self.previous_sibling(id) {
            Some(mut cur) => {
                while let Some(last) = self.last_child(cur) {
                    cur = last;
                }
                Some(cur)
            }
            None => self.parent(id),
        }
    }

    /// Next node in document order: first child, else next sibling, else
    /// the nearest ancestor's next sibling.
    pub fn next_node(&self, id: NodeId) -> Option<NodeId> {
        if let Some(child) = self.first_child(id) {
            return Some(child);
        }
        let mut cur = id;
        loop {
            if let Some(sibling) = self.next_sibling(cur) {
                return Some(sibling);
            }
            cur = self.parent(cur)?;
        }
    }

    /// Walks the parent chain to the top of the (sub)tree containing `id`.
    pub fn root_of(&self, id: NodeId) -> NodeId {
        let mut cur = id;
        while let Some(parent) = self.parent(cur) {
            cur = parent;
        }
        cur
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&p| self.parent(p))
    }

    /// The deepest last descendant of `id`, or `id` itself when childless.
    /// This is the final node of the subtree in document order.
    pub fn last_node(&self, id: NodeId) -> NodeId {
        let mut cur = id;
        while let Some(last) = self.last_child(cur) {
            cur = last;
        }
        cur
    }

    /// First node after the subtree rooted at `id` in document order:
    /// the next sibling of `id`, walking up ancestors when absent.
    pub fn subtree_end(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = id;
        loop {
            if let Some(sibling) = self.next_sibling(cur) {
                return Some(sibling);
            }
            cur = self.parent(cur)?;
        }
    }

    /// The subtree rooted at `id` in document order, `id` included.
    pub fn subtree(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let boundary = self.subtree_end(id);
        std::iter::successors(Some(id), move |&cur| {
            let next = self.next_node(cur)?;
            if Some(next) == boundary { None } else { Some(next) }
        })
    }

    /// Positional address of the node: dash-separated child indices from the
    /// root, e.g. `"0-2-1"`. The root's path is the empty string.
    pub fn path(&self, id: NodeId) -> String {
        let mut indices = Vec::new();
        let mut cur = id;
        while let Some(parent) = self.parent(cur) {
            if let Some(index) = self.children(parent).iter().position(|&c| c == cur) {
                indices.push(index.to_string());
            }
            cur = parent;
        }
        indices.reverse();
        indices.join("-")
    }

    /// Resolves a path string produced by [`Tree::path`] back to a node.
    pub fn find_path(&self, path: &str) -> Option<NodeId> {
        let mut cur = self.root();
        if path.is_empty() {
            return Some(cur);
        }
        for part in path.split('-') {
            let index: usize = part.parse().ok()?;
            cur = self.children(cur).get(index).copied()?;
        }
        Some(cur)
    }

    /// Unlinks `id` from its parent. Returns false when the node has no
    /// parent (the root, or an already detached node).
    pub fn detach(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.parent(id) else {
            return false;
        };
        let Some(index) = self.sibling_index(id) else {
            return false;
        };
        self.node_mut(parent).children.remove(index);
        self.node_mut(id).parent = None;
        true
    }

    /// Deep-copies the subtree rooted at `source` into the arena and returns
    /// the detached copy. Node-reference values keep pointing at their
    /// original targets.
    pub fn clone_subtree(&mut self, source: NodeId) -> NodeId {
        let copy = NodeId(self.nodes.len());
        let data = NodeData {
            name: self.node(source).name.clone(),
            value: self.node(source).value.clone(),
            parent: None,
            children: Vec::new(),
        };
        self.nodes.push(data);
        let children: Vec<NodeId> = self.node(source).children.clone();
        for child in children {
            let child_copy = self.clone_subtree(child);
            self.node_mut(child_copy).parent = Some(copy);
            self.node_mut(copy).children.push(child_copy);
        }
        copy
    }

    /// Splices `replacement` (a detached node) into `target`'s position
    /// among its siblings, detaching `target`. Returns false when `target`
    /// has no parent.
    pub fn replace(&mut self, target: NodeId, replacement: NodeId) -> bool {
        let Some(parent) = self.parent(target) else {
            return false;
        };
        let Some(index) = self.sibling_index(target) else {
            return false;
        };
        self.node_mut(parent).children[index] = replacement;
        self.node_mut(replacement).parent = Some(parent);
        self.node_mut(target).parent = None;
        true
    }
}

impl Default for Tree {
    fn default() -> Self {
        Tree::new()
    }
}

#[test]
fn document_order_walk() {
    let mut tree = Tree::new();
    let root = tree.root();
    let a = tree.add(root, "a", Value::Null);
    let b = tree.add(root, "b", Value::Null);
    let c = tree.add(b, "c", Value::Null);
    let d = tree.add(b, "d", Value::Null);

    assert_eq!(tree.next_node(root), Some(a));
    assert_eq!(tree.next_node(a), Some(b));
    assert_eq!(tree.next_node(b), Some(c));
    assert_eq!(tree.next_node(c), Some(d));
    assert_eq!(tree.next_node(d), None);

    assert_eq!(tree.previous_node(d), Some(c));
    assert_eq!(tree.previous_node(b), Some(a));
    assert_eq!(tree.previous_node(a), Some(root));
    assert_eq!(tree.last_node(root), d);

    let flat: Vec<NodeId> = tree.subtree(b).collect();
    assert_eq!(flat, vec![b, c, d]);
}

#[test]
fn insert_and_detach_keep_sibling_order() {
    let mut tree = Tree::new();
    let root = tree.root();
    let a = tree.add(root, "a", Value::Null);
    let c = tree.add(root, "c", Value::Null);
    let b = tree.insert(root, 1, "b", Value::Null);

    assert_eq!(tree.children(root), &[a, b, c]);
    assert!(tree.detach(b));
    assert_eq!(tree.children(root), &[a, c]);
    // Detaching again is a no-op.
    assert!(!tree.detach(b));
    assert_eq!(tree.parent(b), None);
}

#[test]
fn paths_round_trip() {
    let mut tree = Tree::new();
    let root = tree.root();
    tree.add(root, "a", Value::Null);
    let b = tree.add(root, "b", Value::Null);
    let d = tree.add(b, "d", Value::Null);

    assert_eq!(tree.path(root), "");
    assert_eq!(tree.path(d), "1-0");
    assert_eq!(tree.find_path("1-0"), Some(d));
    assert_eq!(tree.find_path(""), Some(root));
    assert_eq!(tree.find_path("7"), None);
}
