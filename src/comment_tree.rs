//! Builds the nested reply forest from the flat comment listing.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::{Comment, CommentView, Id};

/// Anything that can be arranged in a reply tree.
pub trait Threaded {
    fn id(&self) -> Id;
    fn parent_id(&self) -> Option<Id>;
}

impl Threaded for Comment {
    fn id(&self) -> Id {
        self.id
    }
    fn parent_id(&self) -> Option<Id> {
        self.parent_comment_id
    }
}

impl Threaded for CommentView {
    fn id(&self) -> Id {
        self.comment.id
    }
    fn parent_id(&self) -> Option<Id> {
        self.comment.parent_comment_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentNode<T> {
    #[serde(flatten)]
    pub node: T,
    pub children: Vec<CommentNode<T>>,
}

/// Arrange `flat` into a forest.
///
/// Roots are the entries without a parent. An entry whose parent is not in
/// the input is dropped along with everything beneath it. Roots and siblings
/// keep their input order. When an id appears twice the later entry wins the
/// index and the earlier one is skipped.
pub fn build_tree<T: Threaded + Clone>(flat: &[T]) -> Vec<CommentNode<T>> {
    // Pass 1: id -> position of its entry.
    let mut index: HashMap<Id, usize> = HashMap::with_capacity(flat.len());
    for (pos, c) in flat.iter().enumerate() {
        index.insert(c.id(), pos);
    }

    // Pass 2: attach each entry under its parent, by position.
    let mut roots: Vec<usize> = Vec::new();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); flat.len()];
    for (pos, c) in flat.iter().enumerate() {
        if index.get(&c.id()) != Some(&pos) {
            continue;
        }
        match c.parent_id() {
            None => roots.push(pos),
            Some(parent) => {
                if let Some(&ppos) = index.get(&parent) {
                    children[ppos].push(pos);
                }
            }
        }
    }

    // Only nodes reachable from a root are materialised, so a parent cycle
    // in corrupt input yields nothing rather than looping.
    fn assemble<T: Clone>(pos: usize, flat: &[T], children: &[Vec<usize>]) -> CommentNode<T> {
        CommentNode {
            node: flat[pos].clone(),
            children: children[pos]
                .iter()
                .map(|&child| assemble(child, flat, children))
                .collect(),
        }
    }

    roots
        .into_iter()
        .map(|pos| assemble(pos, flat, &children))
        .collect()
}

/// Pre-order walk yielding `(id, parent id)` pairs.
pub fn flatten<T: Threaded>(forest: &[CommentNode<T>]) -> Vec<(Id, Option<Id>)> {
    let mut out = Vec::new();
    fn walk<T: Threaded>(nodes: &[CommentNode<T>], out: &mut Vec<(Id, Option<Id>)>) {
        for n in nodes {
            out.push((n.node.id(), n.node.parent_id()));
            walk(&n.children, out);
        }
    }
    walk(forest, &mut out);
    out
}
