//! Idle-connection timers.
//!
//! [`TimerList`] keeps entries in ascending expiry order as a doubly linked
//! list threaded through an arena of slots. Handles are generational, so a
//! [`TimerId`] that outlived its entry never aliases a newer one.
//!
//! The list is owned by the reactor thread and carries no lock.

use std::time::Instant;

/// Handle to an entry in a [`TimerList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Node<T> {
    expire: Instant,
    payload: T,
    prev: Option<u32>,
    next: Option<u32>,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    node: Option<Node<T>>,
}

/// Ascending-expiry timer list.
#[derive(Debug)]
pub struct TimerList<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl<T> Default for TimerList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerList<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Adds an entry expiring at `expire`. Entries with equal expiry keep
    /// insertion order.
    pub fn insert(&mut self, expire: Instant, payload: T) -> TimerId {
        let index = self.alloc(Node {
            expire,
            payload,
            prev: None,
            next: None,
        });
        let head = self.head;
        self.link_from(index, head);
        self.len += 1;
        TimerId {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    /// Moves the entry's deadline to `expire` and restores ordering.
    ///
    /// Returns `false` if `id` no longer refers to a live entry.
    pub fn adjust(&mut self, id: TimerId, expire: Instant) -> bool {
        if !self.contains(id) {
            return false;
        }
        let index = id.index;
        let (prev, next) = {
            let node = self.node_mut(index);
            node.expire = expire;
            (node.prev, node.next)
        };

        let before_next = next.is_none_or(|n| expire < self.node(n).expire);
        let after_prev = prev.is_none_or(|p| self.node(p).expire <= expire);
        if before_next && after_prev {
            return true;
        }

        self.unlink(index);
        // Refreshes only push deadlines later, so the scan can start at the
        // old successor. A lowered deadline restarts from the head.
        let start = if after_prev { next } else { self.head };
        self.link_from(index, start);
        true
    }

    /// Removes the entry and hands back its payload.
    pub fn remove(&mut self, id: TimerId) -> Option<T> {
        if !self.contains(id) {
            return None;
        }
        self.unlink(id.index);
        self.len -= 1;
        Some(self.release(id.index).payload)
    }

    pub fn contains(&self, id: TimerId) -> bool {
        self.slots
            .get(id.index as usize)
            .is_some_and(|slot| slot.generation == id.generation && slot.node.is_some())
    }

    pub fn expiry(&self, id: TimerId) -> Option<Instant> {
        if !self.contains(id) {
            return None;
        }
        Some(self.node(id.index).expire)
    }

    /// Earliest deadline, if any.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.head.map(|h| self.node(h).expire)
    }

    /// Pops every entry whose expiry is at or before `now`, in order, and
    /// passes its payload to `on_expire`. Returns the number evicted.
    pub fn tick<F>(&mut self, now: Instant, mut on_expire: F) -> usize
    where
        F: FnMut(T),
    {
        let mut evicted = 0;
        while let Some(head) = self.head {
            if now < self.node(head).expire {
                break;
            }
            self.unlink(head);
            self.len -= 1;
            on_expire(self.release(head).payload);
            evicted += 1;
        }
        evicted
    }

    /// Expiries from head to tail.
    pub fn expiries(&self) -> Vec<Instant> {
        let mut out = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let node = self.node(index);
            out.push(node.expire);
            cursor = node.next;
        }
        out
    }

    fn node(&self, index: u32) -> &Node<T> {
        match &self.slots[index as usize].node {
            Some(node) => node,
            None => unreachable!("timer slot {index} is linked but empty"),
        }
    }

    fn node_mut(&mut self, index: u32) -> &mut Node<T> {
        match &mut self.slots[index as usize].node {
            Some(node) => node,
            None => unreachable!("timer slot {index} is linked but empty"),
        }
    }

    fn alloc(&mut self, node: Node<T>) -> u32 {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize].node = Some(node);
            return index;
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        index
    }

    fn release(&mut self, index: u32) -> Node<T> {
        let slot = &mut self.slots[index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        match slot.node.take() {
            Some(node) => node,
            None => unreachable!("timer slot {index} released twice"),
        }
    }

    /// Links an unlinked node in front of the first entry at or after `start`
    /// whose expiry is strictly larger, or at the tail.
    fn link_from(&mut self, index: u32, start: Option<u32>) {
        let expire = self.node(index).expire;
        let mut cursor = start;
        while let Some(current) = cursor {
            if expire < self.node(current).expire {
                break;
            }
            cursor = self.node(current).next;
        }

        match cursor {
            Some(next) => {
                let prev = self.node(next).prev;
                {
                    let node = self.node_mut(index);
                    node.prev = prev;
                    node.next = Some(next);
                }
                self.node_mut(next).prev = Some(index);
                match prev {
                    Some(p) => self.node_mut(p).next = Some(index),
                    None => self.head = Some(index),
                }
            }
            None => {
                let prev = self.tail;
                {
                    let node = self.node_mut(index);
                    node.prev = prev;
                    node.next = None;
                }
                match prev {
                    Some(p) => self.node_mut(p).next = Some(index),
                    None => self.head = Some(index),
                }
                self.tail = Some(index);
            }
        }
    }

    fn unlink(&mut self, index: u32) {
        let (prev, next) = {
            let node = self.node_mut(index);
            let links = (node.prev, node.next);
            node.prev = None;
            node.next = None;
            links
        };
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }
    }
}
