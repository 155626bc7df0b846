use crate::node::NodeId;
use std::collections::{HashMap, VecDeque};

/// Components waiting to be re-rendered, bucketed by tree depth.
///
/// Parents are always reconciled before their descendants: a parent render
/// may update or drop a child, and a dropped child must not be rendered.
#[derive(Debug, Default)]
pub struct UpdateManager {
    buckets: Vec<VecDeque<NodeId>>,
    pending: HashMap<NodeId, u32>,
}

impl UpdateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `id` as dirty. Returns `false` if it already was.
    pub fn add(&mut self, id: NodeId, depth: u32) -> bool {
        if self.pending.contains_key(&id) {
            return false;
        }
        let index = depth as usize;
        if index >= self.buckets.len() {
            self.buckets.resize_with(index + 1, VecDeque::new);
        }
        self.buckets[index].push_back(id);
        self.pending.insert(id, depth);
        true
    }

    /// Clears the dirty mark of `id`, if any.
    pub fn done(&mut self, id: NodeId) {
        self.pending.remove(&id);
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Takes the shallowest pending component.
    ///
    /// Bucket entries cleared through [`UpdateManager::done`] are skipped.
    pub fn pop(&mut self) -> Option<NodeId> {
        for (depth, bucket) in self.buckets.iter_mut().enumerate() {
            while let Some(id) = bucket.pop_front() {
                if self.pending.get(&id) == Some(&(depth as u32)) {
                    self.pending.remove(&id);
                    return Some(id);
                }
            }
        }
        None
    }

    /// Drains every pending component, shallowest first.
    pub fn for_each_in_depth_order(&mut self, mut f: impl FnMut(NodeId)) {
        while let Some(id) = self.pop() {
            f(id);
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.buckets.iter_mut().for_each(VecDeque::clear);
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeArena;

    fn ids(n: usize) -> Vec<NodeId> {
        let mut arena = NodeArena::new();
        (0..n).map(|_| arena.reserve()).collect()
    }

    #[test]
    fn test_shallow_first() {
        let ids = ids(3);
        let mut updates = UpdateManager::new();
        updates.add(ids[0], 3);
        updates.add(ids[1], 1);
        updates.add(ids[2], 2);

        let mut order = Vec::new();
        updates.for_each_in_depth_order(|id| order.push(id));
        assert_eq!(order, vec![ids[1], ids[2], ids[0]]);
        assert!(updates.is_empty());
    }

    #[test]
    fn test_add_deduplicates() {
        let ids = ids(1);
        let mut updates = UpdateManager::new();
        assert!(updates.add(ids[0], 2));
        assert!(!updates.add(ids[0], 2));
        assert!(!updates.add(ids[0], 2));
        assert_eq!(updates.len(), 1);

        assert_eq!(updates.pop(), Some(ids[0]));
        assert_eq!(updates.pop(), None);
    }

    #[test]
    fn test_done_removes_and_tolerates_absent() {
        let ids = ids(2);
        let mut updates = UpdateManager::new();
        updates.add(ids[0], 1);
        updates.done(ids[0]);
        updates.done(ids[1]);

        assert!(updates.is_empty());
        assert_eq!(updates.pop(), None);
    }

    #[test]
    fn test_readd_after_done() {
        let ids = ids(1);
        let mut updates = UpdateManager::new();
        updates.add(ids[0], 1);
        updates.done(ids[0]);
        updates.add(ids[0], 1);

        assert_eq!(updates.pop(), Some(ids[0]));
        assert_eq!(updates.pop(), None);
    }

    #[test]
    fn test_insertion_order_within_depth() {
        let ids = ids(3);
        let mut updates = UpdateManager::new();
        for id in &ids {
            updates.add(*id, 4);
        }
        let order: Vec<_> = std::iter::from_fn(|| updates.pop()).collect();
        assert_eq!(order, ids);
    }

    #[test]
    fn test_added_while_draining_is_still_ordered() {
        let ids = ids(3);
        let mut updates = UpdateManager::new();
        updates.add(ids[0], 2);
        updates.add(ids[1], 5);

        assert_eq!(updates.pop(), Some(ids[0]));
        updates.add(ids[2], 3);
        assert_eq!(updates.pop(), Some(ids[2]));
        assert_eq!(updates.pop(), Some(ids[1]));
    }
}
