//! LRU Tracker Module
//!
//! Implements Least Recently Used tracking for cache eviction.

// == Node Id ==
/// Stable handle to a tracked key, valid until the key is removed.
pub type NodeId = usize;

#[derive(Debug)]
struct Node<K> {
    key: K,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

// == LRU Tracker ==
/// Tracks access order for LRU eviction strategy.
///
/// Keys live in a slab-backed doubly linked list where:
/// - Head = Most recently used
/// - Tail = Least recently used
///
/// Every operation on a known [`NodeId`] is O(1). Freed slots are reused.
#[derive(Debug)]
pub struct LruTracker<K> {
    nodes: Vec<Option<Node<K>>>,
    free: Vec<NodeId>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
}

impl<K> Default for LruTracker<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> LruTracker<K> {
    // == Constructor ==
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    // == Push Front ==
    /// Starts tracking a new key as the most recently used one.
    pub fn push_front(&mut self, key: K) -> NodeId {
        let node = Node {
            key,
            prev: None,
            next: None,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };

        self.attach_front(id);
        self.len += 1;
        id
    }

    // == Touch ==
    /// Marks a key as recently used (moves to head).
    pub fn touch(&mut self, id: NodeId) {
        if self.head == Some(id) || !self.is_live(id) {
            return;
        }
        self.detach(id);
        self.attach_front(id);
    }

    // == Remove ==
    /// Stops tracking a key, returning it.
    pub fn remove(&mut self, id: NodeId) -> Option<K> {
        if !self.is_live(id) {
            return None;
        }
        self.detach(id);
        self.len -= 1;
        self.free.push(id);
        self.nodes[id].take().map(|node| node.key)
    }

    // == Evict Oldest ==
    /// Returns and removes the least recently used key.
    ///
    /// Returns None if tracker is empty.
    pub fn evict_oldest(&mut self) -> Option<K> {
        let tail = self.tail?;
        self.remove(tail)
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&K> {
        self.tail.and_then(|id| self.key(id))
    }

    /// Returns the key stored under `id`.
    pub fn key(&self, id: NodeId) -> Option<&K> {
        self.nodes.get(id)?.as_ref().map(|node| &node.key)
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.len
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drops every tracked key.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    // == Iteration ==
    /// Iterates keys from most to least recently used.
    pub fn iter(&self) -> Iter<'_, K> {
        Iter {
            tracker: self,
            cursor: self.head,
            remaining: self.len,
            reverse: false,
        }
    }

    /// Iterates keys from least to most recently used.
    pub fn iter_rev(&self) -> Iter<'_, K> {
        Iter {
            tracker: self,
            cursor: self.tail,
            remaining: self.len,
            reverse: true,
        }
    }

    fn is_live(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id), Some(Some(_)))
    }

    fn links(&self, id: NodeId) -> (Option<NodeId>, Option<NodeId>) {
        match &self.nodes[id] {
            Some(node) => (node.prev, node.next),
            None => (None, None),
        }
    }

    fn set_prev(&mut self, id: NodeId, prev: Option<NodeId>) {
        if let Some(node) = &mut self.nodes[id] {
            node.prev = prev;
        }
    }

    fn set_next(&mut self, id: NodeId, next: Option<NodeId>) {
        if let Some(node) = &mut self.nodes[id] {
            node.next = next;
        }
    }

    fn detach(&mut self, id: NodeId) {
        let (prev, next) = self.links(id);

        match prev {
            Some(prev) => self.set_next(prev, next),
            None => self.head = next,
        }
        match next {
            Some(next) => self.set_prev(next, prev),
            None => self.tail = prev,
        }

        self.set_prev(id, None);
        self.set_next(id, None);
    }

    fn attach_front(&mut self, id: NodeId) {
        self.set_prev(id, None);
        self.set_next(id, self.head);

        if let Some(head) = self.head {
            self.set_prev(head, Some(id));
        }
        self.head = Some(id);

        if self.tail.is_none() {
            self.tail = Some(id);
        }
    }
}

// == Iterator ==
/// Borrowing iterator over tracked keys, in either direction.
pub struct Iter<'a, K> {
    tracker: &'a LruTracker<K>,
    cursor: Option<NodeId>,
    remaining: usize,
    reverse: bool,
}

impl<'a, K> Iterator for Iter<'a, K> {
    type Item = (NodeId, &'a K);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let node = self.tracker.nodes[id].as_ref()?;
        self.cursor = if self.reverse { node.prev } else { node.next };
        self.remaining = self.remaining.saturating_sub(1);
        Some((id, &node.key))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
