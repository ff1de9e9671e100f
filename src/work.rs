//! Work to be done after a non-blocking operation completes
//!
//! It is common for a non-blocking operation to leave some work behind: a
//! received buffer has to be copied or unpacked into its final destination,
//! a send buffer has to be kept alive until the data is out, and so on. This
//! work cannot be done when the operation is issued, and the code which issued
//! the operation may be long gone by the time it completes.
//!
//! The answer is to attach the work to the request itself, and to have it run
//! when the request is waited on. Since requests can be copied, the work is
//! recorded in a ledger which all copies of the request share, so that it is
//! run exactly once no matter which copy is waited on.

use log::debug;
use std::cell::RefCell;
use std::mem;
use std::rc::Rc;
use std::thread;


/// Unit of work which runs once, after a non-blocking operation completes
///
/// Running the work consumes it. Any closure with no argument and no result
/// qualifies.
///
pub trait PostWaitWork {
    /// Do the work
    fn run(self: Box<Self>);
}
//
impl<F: FnOnce()> PostWaitWork for F {
    fn run(self: Box<Self>) {
        (*self)()
    }
}


/// Copy a receive buffer into its destination once the data has arrived
pub struct CopyBuffer<T: Clone> {
    /// Buffer which the messaging layer fills
    buffer: Rc<RefCell<Vec<T>>>,

    /// Where the data should end up
    target: Rc<RefCell<Vec<T>>>,
}
//
impl<T: Clone> CopyBuffer<T> {
    /// Set up a copy from `buffer` into `target`
    pub fn new(buffer: Rc<RefCell<Vec<T>>>, target: Rc<RefCell<Vec<T>>>) -> Self {
        CopyBuffer { buffer, target }
    }
}
//
impl<T: Clone> PostWaitWork for CopyBuffer<T> {
    fn run(self: Box<Self>) {
        self.target.borrow_mut().clone_from(&self.buffer.borrow());
    }
}


/// Keep a value alive until the operation completes, then drop it
///
/// Typical usage is holding on to a send buffer which the messaging layer
/// reads from asynchronously.
///
pub struct Release<T> {
    value: T,
}
//
impl<T> Release<T> {
    /// Hold on to `value` until the work is run
    pub fn new(value: T) -> Self {
        Release { value }
    }
}
//
impl<T> PostWaitWork for Release<T> {
    fn run(self: Box<Self>) {
        mem::drop(self.value);
    }
}


/// Slot of the work ledger, which remembers whether its work was run
enum WorkItem {
    /// The work is waiting for the operation to complete
    Pending(Box<dyn PostWaitWork>),

    /// The work has been run and discarded
    Done,
}
//
impl WorkItem {
    /// Extract the work, leaving the slot marked as done
    fn take(&mut self) -> Box<dyn PostWaitWork> {
        match mem::replace(self, WorkItem::Done) {
            WorkItem::Pending(work) => work,
            WorkItem::Done => panic!("Attempted to run post-wait work twice"),
        }
    }

    /// Check whether the work has been run already
    fn is_done(&self) -> bool {
        match *self {
            WorkItem::Pending(_) => false,
            WorkItem::Done => true,
        }
    }
}


/// Ordered record of the post-wait work of one logical operation
///
/// The ledger is shared by every copy of the request which it was attached
/// to, and goes away along with the last of them. Work items run in the order
/// where they were attached.
///
pub struct WorkLedger {
    /// Work items, in attachment order
    items: Vec<WorkItem>,

    /// Index of the oldest work item which has not been run yet
    next: usize,
}
//
impl WorkLedger {
    /// Create an empty ledger
    pub(crate) fn new() -> Self {
        WorkLedger {
            items: Vec::new(),
            next: 0,
        }
    }

    /// Append a work item
    pub(crate) fn push(&mut self, work: Box<dyn PostWaitWork>) {
        self.items.push(WorkItem::Pending(work));
    }

    /// Total amount of work items which were ever attached
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Truth that no work item was ever attached
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Amount of work items which have not been run yet
    pub fn pending(&self) -> usize {
        self.items.len() - self.next
    }

    /// Extract the oldest work item which has not been run yet
    fn take_next(&mut self) -> Option<Box<dyn PostWaitWork>> {
        if self.next == self.items.len() {
            return None;
        }
        let work = self.items[self.next].take();
        self.next += 1;
        Some(work)
    }
}
//
impl Drop for WorkLedger {
    fn drop(&mut self) {
        // Dropping unrun work means that nobody waited for the operation
        if !thread::panicking() {
            debug_assert!(self.items.iter().all(WorkItem::is_done),
                          "Post-wait work dropped without being run");
        }
        debug!("Releasing post-wait work ledger with {} item(s)",
               self.items.len());
    }
}


/// Run every pending work item of a ledger, in attachment order
///
/// The ledger is not borrowed while a work item runs, so work is free to
/// interact with the request it was attached to. Returns the amount of work
/// items which were run.
///
pub(crate) fn run_pending(ledger: &RefCell<WorkLedger>) -> usize {
    let mut count = 0;
    loop {
        let next = ledger.borrow_mut().take_next();
        match next {
            Some(work) => {
                work.run();
                count += 1;
            },
            None => break,
        }
    }
    if count > 0 {
        debug!("Ran {} post-wait work item(s)", count);
    }
    count
}
