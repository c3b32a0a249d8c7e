//! LRU List Module
//!
//! Recency order for eviction, kept as a doubly linked list inside an arena.
//!
//! Nodes live in a `Vec` and link to each other by index, so reordering is
//! O(1) without shared ownership between neighbours. Two permanent sentinel
//! slots anchor the chain:
//! - Head side = Least recently used
//! - Tail side = Most recently used
//!
//! The list itself is not synchronized; the owning cache only touches it with
//! its LRU mutex held.

// == Sentinels ==
const HEAD: usize = 0;
const TAIL: usize = 1;

// == Node Handle ==
/// Handle of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeId(usize);

#[derive(Debug)]
struct Node<K> {
    /// None for sentinels and recycled slots
    key: Option<K>,
    prev: usize,
    next: usize,
}

impl<K> Node<K> {
    fn sentinel() -> Self {
        Self {
            key: None,
            prev: HEAD,
            next: TAIL,
        }
    }
}

// == LRU List ==
/// Tracks access order for LRU eviction.
#[derive(Debug)]
pub(crate) struct LruList<K> {
    nodes: Vec<Node<K>>,
    /// Recycled slots
    free: Vec<usize>,
    len: usize,
}

impl<K> LruList<K> {
    // == Constructor ==
    /// Creates an empty list: head and tail sentinels pointing at each other.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::sentinel(), Node::sentinel()],
            free: Vec::new(),
            len: 0,
        }
    }

    // == Insert At Tail ==
    /// Appends a node for `key` just before the tail sentinel.
    pub fn insert_at_tail(&mut self, key: K) -> NodeId {
        let index = match self.free.pop() {
            Some(index) => {
                self.nodes[index].key = Some(key);
                index
            }
            None => {
                self.nodes.push(Node {
                    key: Some(key),
                    prev: HEAD,
                    next: TAIL,
                });
                self.nodes.len() - 1
            }
        };
        self.link_before_tail(index);
        self.len += 1;
        NodeId(index)
    }

    // == Move To Tail ==
    /// Marks a node as most recently used.
    ///
    /// No-op for sentinels, recycled slots and the node already at the tail.
    pub fn move_to_tail(&mut self, id: NodeId) {
        if !self.is_linked(id) || self.nodes[TAIL].prev == id.0 {
            return;
        }
        self.detach(id.0);
        self.link_before_tail(id.0);
    }

    // == Unlink ==
    /// Detaches a node, recycles its slot and hands back its key.
    pub fn unlink(&mut self, id: NodeId) -> Option<K> {
        if !self.is_linked(id) {
            return None;
        }
        self.detach(id.0);
        let node = &mut self.nodes[id.0];
        node.prev = id.0;
        node.next = id.0;
        let key = node.key.take();
        self.free.push(id.0);
        self.len -= 1;
        key
    }

    // == Pop Front ==
    /// Removes the least recently used node and returns its key.
    pub fn pop_front(&mut self) -> Option<K> {
        let first = self.nodes[HEAD].next;
        if first == TAIL {
            return None;
        }
        self.unlink(NodeId(first))
    }

    // == Peek Front ==
    /// Returns the least recently used key without removing it.
    #[cfg(test)]
    pub fn peek_front(&self) -> Option<&K> {
        let first = self.nodes[HEAD].next;
        self.nodes[first].key.as_ref()
    }

    // == Clear ==
    /// Drops every node, leaving only the two sentinels linked to each other.
    pub fn clear(&mut self) {
        self.nodes.truncate(2);
        self.nodes[HEAD].next = TAIL;
        self.nodes[TAIL].prev = HEAD;
        self.free.clear();
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Keys from least to most recently used.
    pub fn iter(&self) -> Iter<'_, K> {
        Iter {
            list: self,
            cursor: self.nodes[HEAD].next,
        }
    }

    fn is_linked(&self, id: NodeId) -> bool {
        id.0 > TAIL && id.0 < self.nodes.len() && self.nodes[id.0].key.is_some()
    }

    fn link_before_tail(&mut self, index: usize) {
        let last = self.nodes[TAIL].prev;
        self.nodes[index].prev = last;
        self.nodes[index].next = TAIL;
        self.nodes[last].next = index;
        self.nodes[TAIL].prev = index;
    }

    fn detach(&mut self, index: usize) {
        let (prev, next) = (self.nodes[index].prev, self.nodes[index].next);
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
    }
}

// == Iterator ==
pub(crate) struct Iter<'a, K> {
    list: &'a LruList<K>,
    cursor: usize,
}

impl<'a, K> Iterator for Iter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == TAIL {
            return None;
        }
        let node = &self.list.nodes[self.cursor];
        self.cursor = node.next;
        node.key.as_ref()
    }
}
