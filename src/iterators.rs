use std::collections::HashSet;

use regex::Regex;

use crate::evaluator::{EvalContext, EvalError};
use crate::tree::{NodeId, Tree};
use crate::value::Value;

/// One step of node-set transformation in an expression chain.
///
/// Each variant holds only its own parameters; the chain supplies the
/// upstream sequence. Evaluation is pull-based: a step receives a lazy
/// iterator over its predecessor's output and returns its own. Steps that
/// must see the whole upstream set (range, modulo, distinct, groups)
/// materialize it into an owned buffer instead of relying on laziness.
#[derive(Debug)]
pub enum Step {
    /// Exact name match.
    Named(String),
    /// Substring name match (`~name`).
    NamedLike(String),
    /// Regex name match (`/regex/opts` or `:regex:...`).
    NamedRegex { regex: Regex, distinct: bool },
    /// Nearest ancestor with the given name (`..name`).
    NamedAncestor(String),
    /// Parent of each node, de-duplicated (`.`).
    Parent,
    /// Root of the FIRST upstream node only (`..`). Single-shot by design.
    Root,
    /// Direct children, flattened in order (`*`).
    Children,
    /// The node itself plus its subtree in document order (`**`).
    Flatten,
    /// Nth sibling forward/backward with cyclic wrap-around (`+N`/`-N`).
    Sibling(i64),
    /// Nth child of each node, skipped when absent (`N`).
    Numbered(usize),
    /// Window over the overall sequence (`[from,to]`).
    Range { from: usize, to: Option<usize> },
    /// Every Nth node of the overall sequence, 1-indexed (`%N`).
    Modulo(usize),
    /// Dereference node-reference values (`#`).
    Reference,
    /// Typed or plain value comparison (`=value[:type]`, `=~like`).
    Valued {
        raw: String,
        type_name: Option<String>,
        like: bool,
    },
    /// Regex value comparison (`=/regex/opts` or `:regex` typed).
    ValuedRegex { regex: Regex, distinct: bool },
    /// De-duplicate by name (`$`).
    DistinctName,
    /// De-duplicate by value string form (`=$`).
    DistinctValue,
    /// Previous node in document order, wrapping to the deepest-last node
    /// of the tree (`<`).
    ShiftLeft,
    /// Next node in document order, wrapping to the tree root (`>`).
    ShiftRight,
    /// A nested parenthesized scope.
    Group(Box<Group>),
}

impl Step {
    /// Applies this step to the upstream sequence.
    pub fn apply<'t>(
        &'t self,
        tree: &'t Tree,
        left: Box<dyn Iterator<Item = NodeId> + 't>,
        ctx: &EvalContext,
    ) -> Result<Box<dyn Iterator<Item = NodeId> + 't>, EvalError> {
        let out: Box<dyn Iterator<Item = NodeId> + 't> = match self {
            Step::Named(name) => Box::new(left.filter(move |&id| tree.name(id) == name)),

            Step::NamedLike(needle) => {
                Box::new(left.filter(move |&id| tree.name(id).contains(needle.as_str())))
            }

            Step::NamedRegex { regex, distinct } => {
                if *distinct {
                    let mut seen = HashSet::new();
                    Box::new(left.filter(move |&id| {
                        regex.is_match(tree.name(id)) && seen.insert(tree.name(id).to_string())
                    }))
                } else {
                    Box::new(left.filter(move |&id| regex.is_match(tree.name(id))))
                }
            }

            Step::NamedAncestor(name) => {
                let mut seen = HashSet::new();
                Box::new(left.filter_map(move |id| {
                    let ancestor = tree.ancestors(id).find(|&a| tree.name(a) == name)?;
                    seen.insert(ancestor).then_some(ancestor)
                }))
            }

            Step::Parent => {
                let mut seen = HashSet::new();
                Box::new(left.filter_map(move |id| {
                    let parent = tree.parent(id)?;
                    seen.insert(parent).then_some(parent)
                }))
            }

            Step::Root => Box::new(left.take(1).map(move |id| tree.root_of(id))),

            Step::Children => {
                Box::new(left.flat_map(move |id| tree.children(id).iter().copied()))
            }

            Step::Flatten => Box::new(left.flat_map(move |id| tree.subtree(id))),

            Step::Sibling(offset) => {
                let offset = *offset;
                Box::new(left.filter_map(move |id| wrapped_sibling(tree, id, offset)))
            }

            Step::Numbered(index) => {
                let index = *index;
                Box::new(left.filter_map(move |id| tree.children(id).get(index).copied()))
            }

            Step::Range { from, to } => {
                let all: Vec<NodeId> = left.collect();
                let from = (*from).min(all.len());
                let until = to.map_or(all.len(), |t| t.min(all.len()));
                let window: Vec<NodeId> = all[from..from.max(until)].to_vec();
                Box::new(window.into_iter())
            }

            Step::Modulo(n) => {
                let n = *n;
                let all: Vec<NodeId> = left.collect();
                let kept: Vec<NodeId> = all
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| (i + 1) % n == 0)
                    .map(|(_, id)| id)
                    .collect();
                Box::new(kept.into_iter())
            }

            Step::Reference => Box::new(left.filter_map(move |id| match tree.value(id) {
                Value::Node(target) => Some(*target),
                _ => None,
            })),

            Step::Valued {
                raw,
                type_name,
                like,
            } => self.apply_valued(tree, left, ctx, raw, type_name.as_deref(), *like)?,

            Step::ValuedRegex { regex, distinct } => {
                if *distinct {
                    let mut seen = HashSet::new();
                    Box::new(left.filter(move |&id| {
                        let value = tree.value(id);
                        !value.is_null() && {
                            let form = value.to_string();
                            regex.is_match(&form) && seen.insert(form)
                        }
                    }))
                } else {
                    Box::new(left.filter(move |&id| {
                        let value = tree.value(id);
                        !value.is_null() && regex.is_match(&value.to_string())
                    }))
                }
            }

            Step::DistinctName => {
                let all: Vec<NodeId> = left.collect();
                let mut seen = HashSet::new();
                let kept: Vec<NodeId> = all
                    .into_iter()
                    .filter(|&id| seen.insert(tree.name(id).to_string()))
                    .collect();
                Box::new(kept.into_iter())
            }

            Step::DistinctValue => {
                let all: Vec<NodeId> = left.collect();
                let mut seen = HashSet::new();
                let kept: Vec<NodeId> = all
                    .into_iter()
                    .filter(|&id| seen.insert(tree.value(id).to_string()))
                    .collect();
                Box::new(kept.into_iter())
            }

            Step::ShiftLeft => Box::new(left.map(move |id| {
                tree.previous_node(id)
                    .unwrap_or_else(|| tree.last_node(tree.root_of(id)))
            })),

            Step::ShiftRight => Box::new(
                left.map(move |id| tree.next_node(id).unwrap_or_else(|| tree.root_of(id))),
            ),

            Step::Group(group) => {
                let input: Vec<NodeId> = left.collect();
                let result = group.evaluate(tree, input, ctx)?;
                Box::new(result.into_iter())
            }
        };
        Ok(out)
    }

    fn apply_valued<'t>(
        &'t self,
        tree: &'t Tree,
        left: Box<dyn Iterator<Item = NodeId> + 't>,
        ctx: &EvalContext,
        raw: &'t str,
        type_name: Option<&str>,
        like: bool,
    ) -> Result<Box<dyn Iterator<Item = NodeId> + 't>, EvalError> {
        if like {
            if let Some(ty) = type_name {
                return Err(EvalError::TypeError(format!(
                    "'like' value comparison cannot be combined with type '{}'",
                    ty
                )));
            }
            return Ok(Box::new(left.filter(move |&id| {
                let value = tree.value(id);
                !value.is_null() && value.to_string().contains(raw)
            })));
        }

        let wanted = match type_name {
            Some(ty) => ctx.convert(raw, ty)?,
            None => Value::String(raw.to_string()),
        };
        Ok(Box::new(
            left.filter(move |&id| *tree.value(id) == wanted),
        ))
    }
}

/// Cyclic sibling stepping: a null sibling pointer wraps to the parent's
/// first (forward) or last (backward) child. Parentless nodes produce
/// nothing.
fn wrapped_sibling(tree: &Tree, id: NodeId, offset: i64) -> Option<NodeId> {
    let mut cur = id;
    if offset >= 0 {
        for _ in 0..offset {
            cur = match tree.next_sibling(cur) {
                Some(next) => next,
                None => tree.first_child(tree.parent(cur)?)?,
            };
        }
    } else {
        for _ in 0..(-offset) {
            cur = match tree.previous_sibling(cur) {
                Some(prev) => prev,
                None => tree.last_child(tree.parent(cur)?)?,
            };
        }
    }
    Some(cur)
}

/// Evaluates a chain of steps over `input`, folding lazy iterators and
/// materializing only at the end.
pub fn eval_chain<'t>(
    chain: &'t [Step],
    tree: &'t Tree,
    input: Vec<NodeId>,
    ctx: &EvalContext,
) -> Result<Vec<NodeId>, EvalError> {
    let mut current: Box<dyn Iterator<Item = NodeId> + 't> = Box::new(input.into_iter());
    for step in chain {
        current = step.apply(tree, current, ctx)?;
    }
    Ok(current.collect())
}

/// Set-combination operator between an accumulated node list and a chain's
/// output. All four work on node identity and preserve first-seen order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    Or,
    And,
    Xor,
    Not,
}

impl LogicalOp {
    /// `combine(acc, rhs)`: OR appends new uniques, AND intersects, XOR
    /// keeps old-only then new-only, NOT subtracts rhs from acc.
    pub fn combine(self, acc: Vec<NodeId>, rhs: Vec<NodeId>) -> Vec<NodeId> {
        match self {
            LogicalOp::Or => {
                let mut seen: HashSet<NodeId> = acc.iter().copied().collect();
                let mut out = acc;
                for id in rhs {
                    if seen.insert(id) {
                        out.push(id);
                    }
                }
                out
            }
            LogicalOp::And => {
                let rhs_set: HashSet<NodeId> = rhs.into_iter().collect();
                acc.into_iter().filter(|id| rhs_set.contains(id)).collect()
            }
            LogicalOp::Xor => {
                let acc_set: HashSet<NodeId> = acc.iter().copied().collect();
                let rhs_set: HashSet<NodeId> = rhs.iter().copied().collect();
                let mut out: Vec<NodeId> = acc
                    .into_iter()
                    .filter(|id| !rhs_set.contains(id))
                    .collect();
                out.extend(rhs.into_iter().filter(|id| !acc_set.contains(id)));
                out
            }
            LogicalOp::Not => {
                let rhs_set: HashSet<NodeId> = rhs.into_iter().collect();
                acc.into_iter().filter(|id| !rhs_set.contains(id)).collect()
            }
        }
    }
}

/// One set-combination term of a group: an operator plus its own chain of
/// steps. The chain always starts from the group's root input.
#[derive(Debug)]
pub struct Logical {
    pub op: LogicalOp,
    pub chain: Vec<Step>,
}

impl Logical {
    pub fn new(op: LogicalOp) -> Self {
        Logical {
            op,
            chain: Vec::new(),
        }
    }
}

/// One parenthesized scope: an ordered list of logicals, folded left to
/// right over the group's root input.
///
/// The outermost group's input is the expression's start node; a nested
/// group's input is whatever the enclosing chain had produced at the `(`
/// position. Every group opens with an implicit OR logical.
#[derive(Debug)]
pub struct Group {
    pub logicals: Vec<Logical>,
    pub reference: bool,
}

impl Group {
    pub fn new() -> Self {
        Group {
            logicals: vec![Logical::new(LogicalOp::Or)],
            reference: false,
        }
    }

    /// Appends a step to the current (last) logical's chain.
    pub fn push_step(&mut self, step: Step) {
        if let Some(logical) = self.logicals.last_mut() {
            logical.chain.push(step);
        }
    }

    /// Opens a new logical term.
    pub fn push_logical(&mut self, op: LogicalOp) {
        self.logicals.push(Logical::new(op));
    }

    /// Folds the group's logicals over `input`:
    /// `acc = combine(acc, chain(input))`.
    pub fn evaluate(
        &self,
        tree: &Tree,
        input: Vec<NodeId>,
        ctx: &EvalContext,
    ) -> Result<Vec<NodeId>, EvalError> {
        let mut acc = Vec::new();
        for logical in &self.logicals {
            let rhs = eval_chain(&logical.chain, tree, input.clone(), ctx)?;
            acc = logical.op.combine(acc, rhs);
        }
        Ok(acc)
    }
}

impl Default for Group {
    fn default() -> Self {
        Group::new()
    }
}
