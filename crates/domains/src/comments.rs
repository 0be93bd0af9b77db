//! Comment threading.
//!
//! Comments are stored flat with a nullable parent reference. The tree view is
//! rebuilt on read with one grouping pass over an arena of indices, and the
//! nodes are assembled bottom-up without recursion so depth is unbounded.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use uuid::Uuid;

use crate::models::Comment;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentNode {
    pub comment: Comment,
    pub children: Vec<CommentNode>,
}

impl CommentNode {
    /// Number of comments in this subtree, including the node itself.
    pub fn subtree_len(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }
}

/// Builds the reply forest for one justification.
///
/// Roots are comments without a parent. A comment whose parent is not in the
/// set is promoted to a root rather than dropped. Siblings are ordered by
/// `created_at` ascending, then id.
pub fn build_comment_tree(comments: Vec<Comment>) -> Vec<CommentNode> {
    let index: HashMap<Uuid, usize> = comments.iter().enumerate().map(|(i, c)| (c.id, i)).collect();

    let mut roots: Vec<usize> = Vec::new();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); comments.len()];
    for (i, comment) in comments.iter().enumerate() {
        match comment.parent_id.and_then(|p| index.get(&p)) {
            Some(&parent) if parent != i => children[parent].push(i),
            _ => roots.push(i),
        }
    }

    let by_time = |a: &usize, b: &usize| {
        let (a, b) = (&comments[*a], &comments[*b]);
        a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
    };
    roots.sort_by(by_time);
    for group in children.iter_mut() {
        group.sort_by(by_time);
    }

    // Breadth-first order guarantees every child appears after its parent, so
    // walking it backwards finishes all children before their parent.
    let mut order = Vec::with_capacity(comments.len());
    let mut queue: VecDeque<usize> = roots.iter().copied().collect();
    while let Some(i) = queue.pop_front() {
        order.push(i);
        queue.extend(children[i].iter().copied());
    }

    let mut slots: Vec<Option<Comment>> = comments.into_iter().map(Some).collect();
    let mut built: Vec<Option<CommentNode>> = vec![None; slots.len()];
    for &i in order.iter().rev() {
        let kids = children[i].iter().filter_map(|&c| built[c].take()).collect();
        if let Some(comment) = slots[i].take() {
            built[i] = Some(CommentNode { comment, children: kids });
        }
    }

    roots.into_iter().filter_map(|i| built[i].take()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn comment(id: u128, parent: Option<u128>, minute: i64) -> Comment {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        Comment {
            id: Uuid::from_u128(id),
            content: format!("comment {id}"),
            author_id: Uuid::from_u128(999),
            justification_id: Uuid::from_u128(500),
            parent_id: parent.map(Uuid::from_u128),
            created_at: base + Duration::minutes(minute),
        }
    }

    #[test]
    fn builds_nested_chain() {
        let tree = build_comment_tree(vec![
            comment(3, Some(2), 2),
            comment(1, None, 0),
            comment(2, Some(1), 1),
        ]);

        assert_eq!(tree.len(), 1);
        let a = &tree[0];
        assert_eq!(a.comment.id, Uuid::from_u128(1));
        assert_eq!(a.children.len(), 1);
        let b = &a.children[0];
        assert_eq!(b.comment.id, Uuid::from_u128(2));
        assert_eq!(b.children[0].comment.id, Uuid::from_u128(3));
        assert_eq!(a.subtree_len(), 3);
    }

    #[test]
    fn siblings_are_ordered_by_creation_time() {
        let tree = build_comment_tree(vec![
            comment(10, None, 0),
            comment(12, Some(10), 5),
            comment(11, Some(10), 3),
            comment(20, None, -1),
        ]);

        let roots: Vec<_> = tree.iter().map(|n| n.comment.id).collect();
        assert_eq!(roots, vec![Uuid::from_u128(20), Uuid::from_u128(10)]);
        let replies: Vec<_> = tree[1].children.iter().map(|n| n.comment.id).collect();
        assert_eq!(replies, vec![Uuid::from_u128(11), Uuid::from_u128(12)]);
    }

    #[test]
    fn orphans_are_promoted_not_dropped() {
        let tree = build_comment_tree(vec![comment(1, None, 0), comment(2, Some(77), 1)]);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn deep_chains_do_not_recurse() {
        let comments: Vec<_> = (1..=1_000u128)
            .map(|i| comment(i, if i == 1 { None } else { Some(i - 1) }, i as i64))
            .collect();
        let tree = build_comment_tree(comments);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].subtree_len(), 1_000);
        let mut depth = 0;
        let mut node = &tree[0];
        while let Some(next) = node.children.first() {
            depth += 1;
            node = next;
        }
        assert_eq!(depth, 999);
    }

    #[test]
    fn empty_input_yields_empty_forest() {
        assert!(build_comment_tree(Vec::new()).is_empty());
    }
}
