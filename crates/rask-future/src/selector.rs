// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Compositional AND/OR selection over futures.
//!
//! uC++ exposes this as `UnarySelector`/`BinarySelector` objects built with
//! overloaded `&&`/`||`. Rust's orphan rules make overloading `BitAnd`/
//! `BitOr` on `Arc<Selector>` legal but unreadable as selector construction,
//! so this module exposes explicit `select_all`/`select_any` builders
//! instead. A `Selector` itself implements `Selectee`, so trees nest to
//! arbitrary depth and a `Selector` can sit in a `WaitQueueIsm` exactly like
//! a leaf future.

use std::sync::{Arc, Mutex};

use crate::notify::{Notify, Selectee};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    And,
    Or,
}

enum Kind {
    Leaf(Arc<dyn Selectee>),
    Binary {
        op: Op,
        left: Arc<dyn Selectee>,
        right: Arc<dyn Selectee>,
    },
}

/// One child's registration: the wrapper `Notify` handed to the child plus
/// the child handle itself, kept together so `remove_select` can unlink
/// cleanly — tearing down a selector tree must unregister from every leaf,
/// not just the ones that fired.
struct ChildLink {
    child: Arc<dyn Selectee>,
    wrapper: Arc<dyn Notify>,
}

struct Inner {
    /// Set the moment this episode's composite condition is satisfied and
    /// the outer target has been signalled; guards against a second child
    /// re-triggering delivery to the same target — exactly-once wake,
    /// mirroring uC++'s `DropClient` test-and-set.
    fired: bool,
    target: Option<Arc<dyn Notify>>,
    links: Vec<ChildLink>,
}

/// A node in the AND/OR selection tree.
pub struct Selector {
    kind: Kind,
    state: Mutex<Inner>,
}

/// Forwards a child's wake-up into the owning `Selector`'s re-evaluation:
/// a selector handle subscribes to every leaf in its subtree.
struct ChildNotify {
    owner: std::sync::Weak<Selector>,
}

impl Notify for ChildNotify {
    fn signal(&self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.on_child_signal();
        }
    }
}

impl Selector {
    /// Wrap a single `Selectee` as a selector-tree leaf. Rarely needed
    /// directly — `select_all`/`select_any` accept bare `Arc<dyn Selectee>`
    /// children and wrap leaves themselves.
    pub fn leaf(selectee: Arc<dyn Selectee>) -> Arc<Selector> {
        Arc::new(Selector {
            kind: Kind::Leaf(selectee),
            state: Mutex::new(Inner {
                fired: false,
                target: None,
                links: Vec::new(),
            }),
        })
    }

    fn binary(op: Op, left: Arc<dyn Selectee>, right: Arc<dyn Selectee>) -> Arc<Selector> {
        Arc::new(Selector {
            kind: Kind::Binary { op, left, right },
            state: Mutex::new(Inner {
                fired: false,
                target: None,
                links: Vec::new(),
            }),
        })
    }

    /// Evaluate the composite condition without registering anything —
    /// `available()` semantics lifted to the tree level.
    pub fn is_available(&self) -> bool {
        match &self.kind {
            Kind::Leaf(s) => s.is_available(),
            Kind::Binary { op, left, right } => match op {
                Op::And => left.is_available() && right.is_available(),
                Op::Or => left.is_available() || right.is_available(),
            },
        }
    }

    fn on_child_signal(self: Arc<Self>) {
        let mut guard = self.state.lock().unwrap();
        if guard.fired || guard.target.is_none() {
            return;
        }
        if !self.is_available() {
            return;
        }
        guard.fired = true;
        let target = guard.target.take().unwrap();
        drop(guard);
        target.signal();
    }

    fn children(&self) -> Vec<Arc<dyn Selectee>> {
        match &self.kind {
            Kind::Leaf(s) => vec![s.clone()],
            Kind::Binary { left, right, .. } => vec![left.clone(), right.clone()],
        }
    }
}

/// All selection registration/teardown goes through `Arc<Selector>` since a
/// child wrapper needs a weak back-reference to re-evaluate the tree; a
/// bare `Selector` cannot be registered with a `WaitQueue`.
impl Selectee for Arc<Selector> {
    fn is_available(&self) -> bool {
        Selector::is_available(self)
    }

    fn add_select(&self, target: Arc<dyn Notify>) -> bool {
        let mut guard = self.state.lock().unwrap();
        debug_assert!(
            guard.target.is_none(),
            "selector re-registered while a prior episode is still pending"
        );
        guard.fired = false;
        if Selector::is_available(self) {
            return true;
        }
        guard.target = Some(target);
        let children = self.children();
        drop(guard);

        let mut links = Vec::with_capacity(children.len());
        for child in children {
            let wrapper: Arc<dyn Notify> = Arc::new(ChildNotify {
                owner: Arc::downgrade(self),
            });
            child.add_select(wrapper.clone());
            links.push(ChildLink { child, wrapper });
        }
        self.state.lock().unwrap().links = links;
        false
    }

    fn remove_select(&self, target: &Arc<dyn Notify>) {
        let mut guard = self.state.lock().unwrap();
        let matches_target = guard
            .target
            .as_ref()
            .map(|t| Arc::ptr_eq(t, target))
            .unwrap_or(false);
        if !matches_target {
            return;
        }
        guard.target = None;
        let links = std::mem::take(&mut guard.links);
        drop(guard);
        for link in links {
            link.child.remove_select(&link.wrapper);
        }
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(self) as usize
    }
}

/// Build an AND node: available only once every leaf in `left` and `right`
/// is available.
pub fn select_all(left: Arc<dyn Selectee>, right: Arc<dyn Selectee>) -> Arc<Selector> {
    Selector::binary(Op::And, left, right)
}

/// Build an OR node: available as soon as either `left` or `right` is
/// available.
pub fn select_any(left: Arc<dyn Selectee>, right: Arc<dyn Selectee>) -> Arc<Selector> {
    Selector::binary(Op::Or, left, right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::FutureIsm;
    use std::thread;
    use std::time::Duration;

    fn selectee(f: &FutureIsm<i32>) -> Arc<dyn Selectee> {
        Arc::new(f.clone())
    }

    #[test]
    fn or_fires_on_first_ready_leaf() {
        let a: FutureIsm<i32> = FutureIsm::new();
        let b: FutureIsm<i32> = FutureIsm::new();
        let tree = select_any(selectee(&a), selectee(&b));
        assert!(!Selectee::is_available(&tree));
        a.deliver(1);
        assert!(Selectee::is_available(&tree));
    }

    #[test]
    fn and_requires_both_leaves() {
        let a: FutureIsm<i32> = FutureIsm::new();
        let b: FutureIsm<i32> = FutureIsm::new();
        let tree = select_all(selectee(&a), selectee(&b));
        a.deliver(1);
        assert!(!Selectee::is_available(&tree));
        b.deliver(2);
        assert!(Selectee::is_available(&tree));
    }

    struct Flag(std::sync::atomic::AtomicBool);
    impl Notify for Flag {
        fn signal(&self) {
            self.0.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn and_node_wakes_exactly_once_for_concurrent_deliveries() {
        let a: FutureIsm<i32> = FutureIsm::new();
        let b: FutureIsm<i32> = FutureIsm::new();
        let tree = select_all(selectee(&a), selectee(&b));
        let flag = Arc::new(Flag(std::sync::atomic::AtomicBool::new(false)));
        let notify: Arc<dyn Notify> = flag.clone();
        assert!(!Selectee::add_select(&tree, notify));

        let a2 = a.clone();
        let b2 = b.clone();
        let t1 = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            a2.deliver(1);
        });
        let t2 = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            b2.deliver(2);
        });
        t1.join().unwrap();
        t2.join().unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(flag.0.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn nested_trees_compose() {
        let a: FutureIsm<i32> = FutureIsm::new();
        let b: FutureIsm<i32> = FutureIsm::new();
        let c: FutureIsm<i32> = FutureIsm::new();
        let inner = select_all(selectee(&a), selectee(&b));
        let outer = select_any(inner.clone(), selectee(&c));
        assert!(!Selectee::is_available(&outer));
        c.deliver(9);
        assert!(Selectee::is_available(&outer));
    }
}
