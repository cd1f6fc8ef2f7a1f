/*!
 * Wait Node Pool
 *
 * Fixed arena of reusable wait-queue nodes shared by every primitive in a
 * `SyncContext`. Nodes are addressed by index, claimed lock-free and linked
 * into FIFO `WaitList`s under the owning primitive's `FastLock`.
 *
 * # Design
 *
 * - No allocation after construction; capacity bounds the number of callers
 *   blocked at once
 * - A `NodeId` is only reused after an explicit `release`
 * - Link fields are only touched while the enclosing queue's lock is held
 */

use crate::core::limits::NIL_NODE;
use crate::core::sync::FatalAction;
use crate::errors::{fatal, FatalError};
use log::trace;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

/// Index of a node in the pool; also the rendezvous tag of its waiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a parked caller is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeState {
    /// Queued on a `QueuedMutex`
    Queuing = 0,
    /// Queued on a `QueuedRWLock` for shared access
    QueuingRead = 1,
    /// Queued on a `QueuedRWLock` for exclusive access
    QueuingWrite = 2,
    /// Asleep on a `WaitCondition`
    Sleeping = 3,
}

impl NodeState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => NodeState::Queuing,
            1 => NodeState::QueuingRead,
            2 => NodeState::QueuingWrite,
            _ => NodeState::Sleeping,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeState::Queuing => "mutex waiter",
            NodeState::QueuingRead => "reader",
            NodeState::QueuingWrite => "writer",
            NodeState::Sleeping => "condition sleeper",
        }
    }
}

#[repr(C, align(64))] // Cache-line aligned to prevent false sharing
struct WaitNode {
    in_use: AtomicBool,
    // Guarded by the lock of whichever queue holds the node
    state: AtomicU8,
    next: AtomicUsize,
}

impl WaitNode {
    const fn new() -> Self {
        Self {
            in_use: AtomicBool::new(false),
            state: AtomicU8::new(NodeState::Queuing as u8),
            next: AtomicUsize::new(NIL_NODE),
        }
    }
}

/// Fixed-capacity arena of wait nodes
pub struct WaitNodePool {
    slots: Box<[WaitNode]>,
    /// Last claimed index; scan hint only
    cursor: AtomicUsize,
    fatal_action: FatalAction,
}

impl WaitNodePool {
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn with_capacity(capacity: usize, fatal_action: FatalAction) -> Self {
        assert!(capacity > 0, "wait node pool needs at least one slot");
        Self {
            slots: (0..capacity).map(|_| WaitNode::new()).collect(),
            cursor: AtomicUsize::new(capacity - 1),
            fatal_action,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn fatal_action(&self) -> FatalAction {
        self.fatal_action
    }

    /// Claim a free node, scanning round-robin from just past the last claim
    ///
    /// Exhausting the pool is fatal.
    pub fn claim(&self, state: NodeState) -> NodeId {
        let capacity = self.capacity();
        let start = self.cursor.load(Ordering::Relaxed);

        for step in 1..=capacity {
            let index = (start + step) % capacity;
            let node = &self.slots[index];
            if !node.in_use.swap(true, Ordering::Acquire) {
                self.cursor.store(index, Ordering::Relaxed);
                node.next.store(NIL_NODE, Ordering::Relaxed);
                node.state.store(state as u8, Ordering::Relaxed);
                trace!("claimed wait node #{} as {}", index, state.name());
                return NodeId(index);
            }
        }

        fatal(self.fatal_action, FatalError::PoolExhausted { capacity })
    }

    /// Return a node to the pool
    ///
    /// The node must already be unlinked from every queue.
    pub fn release(&self, id: NodeId) {
        if !self.node(id).in_use.swap(false, Ordering::Release) {
            fatal(
                self.fatal_action,
                FatalError::NodeNotQueued { node: id.index() },
            );
        }
    }

    pub fn is_claimed(&self, id: NodeId) -> bool {
        self.node(id).in_use.load(Ordering::Acquire)
    }

    /// Number of nodes currently claimed
    pub fn in_use(&self) -> usize {
        self.slots
            .iter()
            .filter(|node| node.in_use.load(Ordering::Relaxed))
            .count()
    }

    pub fn state(&self, id: NodeId) -> NodeState {
        NodeState::from_u8(self.node(id).state.load(Ordering::Relaxed))
    }

    pub(crate) fn set_state(&self, id: NodeId, state: NodeState) {
        self.node(id).state.store(state as u8, Ordering::Relaxed);
    }

    fn next(&self, id: NodeId) -> Option<NodeId> {
        match self.node(id).next.load(Ordering::Relaxed) {
            NIL_NODE => None,
            index => Some(NodeId(index)),
        }
    }

    fn set_next(&self, id: NodeId, next: Option<NodeId>) {
        let raw = next.map_or(NIL_NODE, NodeId::index);
        self.node(id).next.store(raw, Ordering::Relaxed);
    }

    #[inline]
    fn node(&self, id: NodeId) -> &WaitNode {
        &self.slots[id.0]
    }
}

impl fmt::Debug for WaitNodePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitNodePool")
            .field("capacity", &self.capacity())
            .field("in_use", &self.in_use())
            .finish()
    }
}

/// FIFO list of pool nodes, singly linked through the nodes themselves
///
/// Must only be touched while holding the lock of the primitive that owns it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WaitList {
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
}

impl WaitList {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline]
    pub fn peek_front(&self) -> Option<NodeId> {
        self.head
    }

    pub fn push_back(&mut self, pool: &WaitNodePool, id: NodeId) {
        pool.set_next(id, None);
        match self.tail {
            Some(tail) => pool.set_next(tail, Some(id)),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
    }

    pub fn push_front(&mut self, pool: &WaitNodePool, id: NodeId) {
        pool.set_next(id, self.head);
        if self.tail.is_none() {
            self.tail = Some(id);
        }
        self.head = Some(id);
        self.len += 1;
    }

    /// Move every node of `other` in front of this list, keeping their order
    pub fn prepend(&mut self, pool: &WaitNodePool, other: &mut WaitList) {
        let (Some(other_head), Some(other_tail)) = (other.head, other.tail) else {
            return;
        };
        pool.set_next(other_tail, self.head);
        if self.tail.is_none() {
            self.tail = Some(other_tail);
        }
        self.head = Some(other_head);
        self.len += other.len;
        *other = WaitList::new();
    }

    pub fn pop_front(&mut self, pool: &WaitNodePool) -> Option<NodeId> {
        let head = self.head?;
        self.head = pool.next(head);
        if self.head.is_none() {
            self.tail = None;
        }
        pool.set_next(head, None);
        self.len -= 1;
        Some(head)
    }

    pub fn contains(&self, pool: &WaitNodePool, id: NodeId) -> bool {
        self.iter(pool).any(|node| node == id)
    }

    /// Remove `id` wherever it sits; returns `false` if it is not linked here
    pub fn try_unlink(&mut self, pool: &WaitNodePool, id: NodeId) -> bool {
        let mut prev: Option<NodeId> = None;
        let mut cursor = self.head;

        while let Some(node) = cursor {
            if node == id {
                let next = pool.next(node);
                match prev {
                    Some(prev) => pool.set_next(prev, next),
                    None => self.head = next,
                }
                if self.tail == Some(node) {
                    self.tail = prev;
                }
                pool.set_next(node, None);
                self.len -= 1;
                return true;
            }
            prev = Some(node);
            cursor = pool.next(node);
        }
        false
    }

    /// Remove `id`; a node that is not linked here is fatal
    pub fn unlink(&mut self, pool: &WaitNodePool, id: NodeId) {
        if !self.try_unlink(pool, id) {
            fatal(
                pool.fatal_action(),
                FatalError::NodeNotQueued { node: id.index() },
            );
        }
    }

    pub fn iter<'a>(&self, pool: &'a WaitNodePool) -> impl Iterator<Item = NodeId> + 'a {
        std::iter::successors(self.head, move |&node| pool.next(node))
    }
}
