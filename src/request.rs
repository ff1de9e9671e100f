//! Handles to non-blocking sends and receives
//!
//! A [`Request`] supervises one in-flight operation of the messaging layer. On
//! top of the raw native token, it provides three services:
//!
//! - Value semantics: requests can be cloned and stored in containers, every
//!   clone referring to the same in-flight operation.
//! - Chaining: an operation which had to be split into several physical
//!   transfers can be represented by a single request, which waits for all of
//!   them, oldest first.
//! - Post-wait work: closures and other [`PostWaitWork`] can be attached to a
//!   request, to be run exactly once after the operation completes.
//!
//! Only [`Request::wait`] drains the chain and runs post-wait work. Polling
//! with [`Request::test`] only observes the head operation, so a request with
//! chained operations or attached work must eventually be waited on.

use crate::native::NativeRequest;
use crate::work::{self, PostWaitWork, WorkLedger};
use log::trace;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;


/// Handle to a non-blocking operation
///
/// Cloning a request deep-copies its chain of prior requests, so that the
/// clones can be extended independently, but shares its post-wait work, which
/// is a property of the logical operation.
///
pub struct Request<N: NativeRequest> {
    /// Native operation token
    native: N,

    /// Earlier part of the operation, which must complete before this one
    prior: Option<Box<Request<N>>>,

    /// Post-wait work shared by every clone of this request, if any
    ledger: Option<Rc<RefCell<WorkLedger>>>,
}
//
impl<N: NativeRequest> Request<N> {
    /// Wrap a native operation token
    pub fn new(native: N) -> Self {
        Request {
            native,
            prior: None,
            ledger: None,
        }
    }

    /// Build one logical request out of the physical requests which make it
    /// up, in issue order
    ///
    /// The last request becomes the head and the other ones are chained
    /// underneath it, so that waiting completes them in the same order. None
    /// of the requests may have a chain of its own. Returns None if there is
    /// no request at all.
    ///
    pub fn from_parts<I>(parts: I) -> Option<Self>
        where I: IntoIterator<Item = Request<N>>
    {
        let mut parts: Vec<_> = parts.into_iter().collect();
        let mut head = parts.pop()?;
        for part in parts {
            head.push_prior(part);
        }
        Some(head)
    }

    /// Access the native operation token
    pub fn native(&self) -> &N {
        &self.native
    }

    /// Mutably access the native operation token
    pub fn native_mut(&mut self) -> &mut N {
        &mut self.native
    }

    /// Make this request refer to another native operation, dropping its
    /// chain and its share of the post-wait work
    pub fn reset(&mut self, native: N) {
        self.ledger = None;
        self.prior = None;
        self.native = native;
    }

    /// Record that `req` must complete before this request does
    ///
    /// Each call pushes one more link on top of the chain, so after several
    /// calls, waiting will complete the prior requests in the order where they
    /// were added. Chains are linear: `req` must not have a chain of its own.
    ///
    pub fn add_prior_request(&mut self, req: &Request<N>) {
        self.push_prior(req.clone());
    }

    /// Attach work to be run once the operation has completed
    ///
    /// The work is shared with every clone of this request, and will be run
    /// by whichever of them is waited on first.
    ///
    pub fn add_post_wait_work<W>(&mut self, work: W)
        where W: PostWaitWork + 'static
    {
        self.ledger
            .get_or_insert_with(|| Rc::new(RefCell::new(WorkLedger::new())))
            .borrow_mut()
            .push(Box::new(work));
    }

    /// Wait for the operation to complete and run the post-wait work
    ///
    /// Chained requests are waited on first, oldest first, and their status
    /// is discarded. Post-wait work only runs if every wait succeeded, and
    /// work which already ran is not run again.
    ///
    pub fn wait(&mut self) -> Result<N::Status, N::Error> {
        trace!("Request::wait()");

        if let Some(ref mut prior) = self.prior {
            prior.wait()?;
        }

        let status = self.native.wait()?;

        if let Some(ref ledger) = self.ledger {
            work::run_pending(ledger);
        }

        Ok(status)
    }

    /// Check whether the head operation has completed, without blocking
    ///
    /// Neither chained requests nor post-wait work are looked at.
    ///
    pub fn test(&mut self) -> Result<bool, N::Error> {
        Ok(self.native.test()?.is_some())
    }

    /// Like test(), but also provide the completion status of the head
    /// operation if it has completed
    pub fn test_status(&mut self) -> Result<Option<N::Status>, N::Error> {
        self.native.test()
    }

    /// Truth that other requests are chained underneath this one
    pub fn has_prior(&self) -> bool {
        self.prior.is_some()
    }

    /// Amount of requests chained underneath this one
    pub fn chain_len(&self) -> usize {
        let mut len = 0;
        let mut link = self.prior.as_ref();
        while let Some(req) = link {
            len += 1;
            link = req.prior.as_ref();
        }
        len
    }

    /// Amount of live requests sharing this request's post-wait work, or None
    /// if no work was ever attached
    pub fn ledger_refcount(&self) -> Option<usize> {
        self.ledger.as_ref().map(Rc::strong_count)
    }

    /// Amount of post-wait work items which have not been run yet
    pub fn pending_work(&self) -> usize {
        self.ledger.as_ref().map_or(0, |ledger| ledger.borrow().pending())
    }

    /// Push a new link on top of the chain of prior requests
    fn push_prior(&mut self, mut req: Request<N>) {
        assert!(req.prior.is_none(),
                "Prior requests must form a chain, not a tree");
        req.prior = self.prior.take();
        self.prior = Some(Box::new(req));
    }
}
//
impl<N: NativeRequest> Clone for Request<N> {
    fn clone(&self) -> Self {
        Request {
            native: self.native.clone(),
            prior: self.prior.clone(),
            ledger: self.ledger.clone(),
        }
    }
}
//
impl<N: NativeRequest> Default for Request<N> {
    /// Request which does not refer to any operation
    fn default() -> Self {
        Request::new(N::null())
    }
}
//
impl<N: NativeRequest> From<N> for Request<N> {
    fn from(native: N) -> Self {
        Request::new(native)
    }
}
//
impl<N: NativeRequest + fmt::Debug> fmt::Debug for Request<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Request")
         .field("native", &self.native)
         .field("chain_len", &self.chain_len())
         .field("pending_work", &self.pending_work())
         .finish()
    }
}


/// Wait for a non-blocking send or receive to finish
pub fn wait<N: NativeRequest>(req: &mut Request<N>)
    -> Result<N::Status, N::Error>
{
    req.wait()
}


/// Wait for a batch of non-blocking sends and receives to finish, in order
///
/// Stops at the first failure, leaving the remaining requests untouched.
///
pub fn wait_all<N: NativeRequest>(reqs: &mut [Request<N>])
    -> Result<(), N::Error>
{
    for req in reqs.iter_mut() {
        req.wait()?;
    }
    Ok(())
}


/// Unit tests
#[cfg(test)]
mod tests {
    use crate::native::NativeRequest;
    use crate::request::*;
    use std::cell::{Cell, RefCell};
    use std::error::Error;
    use std::fmt;
    use std::rc::Rc;

    /// Record of what happened to mock requests, in order
    type Journal = Rc<RefCell<Vec<String>>>;

    /// Native request which completes as soon as it is waited on, and writes
    /// down everything that happens to it
    #[derive(Clone)]
    struct MockRequest {
        id: u32,
        done: Rc<Cell<bool>>,
        fails: Rc<Cell<bool>>,
        journal: Option<Journal>,
    }
    //
    impl MockRequest {
        fn new(id: u32, journal: &Journal) -> Self {
            MockRequest {
                id,
                done: Rc::new(Cell::new(false)),
                fails: Rc::new(Cell::new(false)),
                journal: Some(journal.clone()),
            }
        }

        fn log(&self, what: &str) {
            if let Some(ref journal) = self.journal {
                journal.borrow_mut().push(format!("{} {}", what, self.id));
            }
        }
    }
    //
    impl NativeRequest for MockRequest {
        type Status = u32;
        type Error = MockError;

        fn null() -> Self {
            MockRequest {
                id: 0,
                done: Rc::new(Cell::new(true)),
                fails: Rc::new(Cell::new(false)),
                journal: None,
            }
        }

        fn wait(&mut self) -> Result<u32, MockError> {
            self.log("wait");
            if self.fails.get() {
                return Err(MockError(self.id));
            }
            self.done.set(true);
            Ok(self.id)
        }

        fn test(&mut self) -> Result<Option<u32>, MockError> {
            self.log("test");
            if self.fails.get() {
                return Err(MockError(self.id));
            }
            Ok(if self.done.get() { Some(self.id) } else { None })
        }
    }

    #[derive(Debug, PartialEq)]
    struct MockError(u32);
    //
    impl fmt::Display for MockError {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "mock request {} failed", self.0)
        }
    }
    //
    impl Error for MockError {}

    fn journal() -> Journal {
        let _ = env_logger::builder().is_test(true).try_init();
        Rc::new(RefCell::new(Vec::new()))
    }

    fn request(id: u32, journal: &Journal) -> Request<MockRequest> {
        Request::new(MockRequest::new(id, journal))
    }

    /// Post-wait work which writes down when it runs
    fn logged_work(name: &'static str, journal: &Journal)
        -> impl FnOnce() + 'static
    {
        let journal = journal.clone();
        move || journal.borrow_mut().push(format!("work {}", name))
    }

    /// Default requests complete immediately and carry nothing
    #[test]
    fn default_request() {
        let mut req = Request::<MockRequest>::default();
        assert!(!req.has_prior());
        assert_eq!(req.ledger_refcount(), None);
        assert_eq!(req.test(), Ok(true));
        assert_eq!(req.wait(), Ok(0));
    }

    /// Chained requests and post-wait work are handled in the right order
    #[test]
    fn chain_then_work() {
        let journal = journal();
        let first = request(1, &journal);
        let second = request(2, &journal);
        let mut req = request(3, &journal);
        req.add_prior_request(&first);
        req.add_prior_request(&second);
        req.add_post_wait_work(logged_work("a", &journal));
        req.add_post_wait_work(logged_work("b", &journal));
        assert_eq!(req.chain_len(), 2);
        assert_eq!(req.pending_work(), 2);
        assert!(journal.borrow().is_empty());

        assert_eq!(req.wait(), Ok(3));
        assert_eq!(*journal.borrow(),
                   vec!["wait 1", "wait 2", "wait 3", "work a", "work b"]);
        assert_eq!(req.pending_work(), 0);
    }

    /// Waiting again does not run the work again
    #[test]
    fn repeated_wait() {
        let journal = journal();
        let counter = Rc::new(Cell::new(0));
        let c_counter = counter.clone();
        let mut req = request(1, &journal);
        req.add_post_wait_work(move || c_counter.set(c_counter.get() + 1));

        assert_eq!(req.wait(), Ok(1));
        assert_eq!(req.wait(), Ok(1));
        assert_eq!(counter.get(), 1);
    }

    /// Clones share post-wait work, which runs once for all of them
    #[test]
    fn clones_share_work() {
        let journal = journal();
        let mut req = request(1, &journal);
        req.add_post_wait_work(logged_work("a", &journal));
        assert_eq!(req.ledger_refcount(), Some(1));

        let mut copy = req.clone();
        assert_eq!(req.ledger_refcount(), Some(2));
        assert_eq!(copy.pending_work(), 1);

        // Work attached through either clone is seen by both
        copy.add_post_wait_work(logged_work("b", &journal));
        assert_eq!(req.pending_work(), 2);

        assert_eq!(copy.wait(), Ok(1));
        assert_eq!(req.pending_work(), 0);
        assert_eq!(req.wait(), Ok(1));
        assert_eq!(*journal.borrow(),
                   vec!["wait 1", "work a", "work b", "wait 1"]);

        drop(copy);
        assert_eq!(req.ledger_refcount(), Some(1));
    }

    /// The ledger goes away with the last clone, and not before
    #[test]
    fn ledger_lifetime() {
        let journal = journal();
        let mut req = request(1, &journal);
        req.add_post_wait_work(logged_work("a", &journal));
        let ledger = Rc::downgrade(req.ledger.as_ref().unwrap());

        let mut copies = vec![req.clone(), req.clone(), req.clone()];
        assert_eq!(req.ledger_refcount(), Some(4));
        assert_eq!(copies[1].wait(), Ok(1));

        drop(copies.remove(2));
        drop(req);
        drop(copies.remove(0));
        assert!(ledger.upgrade().is_some());
        assert_eq!(copies[0].ledger_refcount(), Some(1));
        drop(copies);
        assert!(ledger.upgrade().is_none());
    }

    /// Clones own independent chains
    #[test]
    fn clones_own_chains() {
        let journal = journal();
        let mut req = request(2, &journal);
        req.add_prior_request(&request(1, &journal));

        let mut copy = req.clone();
        copy.add_prior_request(&request(3, &journal));
        assert_eq!(req.chain_len(), 1);
        assert_eq!(copy.chain_len(), 2);

        assert_eq!(req.wait(), Ok(2));
        assert_eq!(*journal.borrow(), vec!["wait 1", "wait 2"]);
    }

    /// Chained requests cannot be chained again
    #[test]
    #[should_panic(expected = "chain, not a tree")]
    fn no_trees() {
        let journal = journal();
        let mut chained = request(2, &journal);
        chained.add_prior_request(&request(1, &journal));
        let mut req = request(3, &journal);
        req.add_prior_request(&chained);
    }

    /// Polling only looks at the head operation
    #[test]
    fn test_observes_head() {
        let journal = journal();
        let mut req = request(2, &journal);
        req.add_prior_request(&request(1, &journal));
        req.add_post_wait_work(logged_work("a", &journal));

        assert_eq!(req.test(), Ok(false));
        req.native().done.set(true);
        assert_eq!(req.test(), Ok(true));
        assert_eq!(req.pending_work(), 1);
        assert_eq!(*journal.borrow(), vec!["test 2", "test 2"]);

        assert_eq!(req.wait(), Ok(2));
        assert_eq!(*journal.borrow(),
                   vec!["test 2", "test 2", "wait 1", "wait 2", "work a"]);
    }

    /// A successful poll is followed by a wait with the same status
    #[test]
    fn test_then_wait() {
        let journal = journal();
        let mut req = request(7, &journal);
        assert_eq!(req.test_status(), Ok(None));
        req.native_mut().done.set(true);
        assert_eq!(req.test_status(), Ok(Some(7)));
        assert_eq!(req.wait(), Ok(7));
    }

    /// Transport failures propagate, and post-wait work waits for success
    #[test]
    fn failures_propagate() {
        let journal = journal();
        let first = request(1, &journal);
        first.native().fails.set(true);
        let mut req = request(2, &journal);
        req.add_prior_request(&first);
        req.add_post_wait_work(logged_work("a", &journal));

        assert_eq!(req.wait(), Err(MockError(1)));
        assert_eq!(req.test_status(), Ok(None));
        assert_eq!(req.pending_work(), 1);
        assert_eq!(*journal.borrow(), vec!["wait 1", "test 2"]);

        req.native().fails.set(true);
        first.native().fails.set(false);
        assert_eq!(req.test(), Err(MockError(2)));
        assert_eq!(req.wait(), Err(MockError(2)));
        assert_eq!(req.pending_work(), 1);

        req.native().fails.set(false);
        assert_eq!(req.wait(), Ok(2));
        assert_eq!(req.pending_work(), 0);
    }

    /// Resetting a request drops its chain and its share of the work
    #[test]
    fn reset() {
        let journal = journal();
        let mut req = request(2, &journal);
        req.add_prior_request(&request(1, &journal));
        req.add_post_wait_work(logged_work("a", &journal));
        let mut copy = req.clone();
        assert_eq!(copy.wait(), Ok(2));

        req.reset(MockRequest::new(3, &journal));
        assert!(!req.has_prior());
        assert_eq!(req.ledger_refcount(), None);
        assert_eq!(copy.ledger_refcount(), Some(1));
        assert_eq!(req.wait(), Ok(3));
    }

    /// Assignment releases the target's work before sharing the source's
    #[test]
    fn assignment() {
        let journal = journal();
        let mut target = request(1, &journal);
        target.add_post_wait_work(logged_work("a", &journal));
        assert_eq!(target.wait(), Ok(1));
        let old_ledger = Rc::downgrade(target.ledger.as_ref().unwrap());

        let mut source = request(3, &journal);
        source.add_prior_request(&request(2, &journal));
        source.add_post_wait_work(logged_work("b", &journal));

        target.clone_from(&source);
        assert!(old_ledger.upgrade().is_none());
        assert_eq!(source.ledger_refcount(), Some(2));
        assert_eq!(target.chain_len(), 1);

        assert_eq!(target.wait(), Ok(3));
        assert_eq!(source.pending_work(), 0);
    }

    /// Physical requests can be assembled into a logical one
    #[test]
    fn from_parts() {
        let journal = journal();
        assert!(Request::<MockRequest>::from_parts(Vec::new()).is_none());

        let parts = (1..4).map(|id| request(id, &journal));
        let mut req = Request::from_parts(parts).unwrap();
        assert_eq!(req.native().id, 3);
        assert_eq!(req.chain_len(), 2);
        assert_eq!(wait(&mut req), Ok(3));
        assert_eq!(*journal.borrow(), vec!["wait 1", "wait 2", "wait 3"]);
    }

    /// Batches of requests are waited on in order
    #[test]
    fn batch_wait() {
        let journal = journal();
        let mut reqs = vec![request(1, &journal), request(2, &journal)];
        reqs[0].add_post_wait_work(logged_work("a", &journal));
        assert_eq!(wait_all(&mut reqs), Ok(()));
        assert_eq!(*journal.borrow(), vec!["wait 1", "work a", "wait 2"]);
    }
}
