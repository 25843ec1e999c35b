use crate::{
    QueueError,
    traits::{QueueConsumer, QueueFactory, QueueProducer},
};
use crossbeam_epoch::{self as epoch, Atomic, Owned, Shared};
use crossbeam_utils::CachePadded;
use std::{
    fmt,
    mem::MaybeUninit,
    sync::{
        Arc,
        atomic::{self, AtomicBool, AtomicU32, AtomicU64, Ordering},
    },
};

/// Tag bit set on a node's forward link while the node is being unlinked.
///
/// A producer's splice CAS expects an untagged tail link, so sealing the
/// link keeps producers from splicing behind a node that is mid-removal.
const SEALED: usize = 1;

/// A single queue node.
///
/// Two permanent sentinel nodes bound the list; payload nodes live strictly
/// between them. `payload` is uninitialized for the sentinels and never read
/// through them.
struct Node {
    payload: MaybeUninit<Box<[u8]>>,
    next: Atomic<Node>,
    prev: Atomic<Node>,
    /// Claim marker serializing concurrent consumers on the same candidate.
    claimed: AtomicBool,
}

impl Node {
    fn sentinel() -> Self {
        Self {
            payload: MaybeUninit::uninit(),
            next: Atomic::null(),
            prev: Atomic::null(),
            claimed: AtomicBool::new(false),
        }
    }

    fn with_payload(payload: Box<[u8]>) -> Self {
        Self {
            payload: MaybeUninit::new(payload),
            next: Atomic::null(),
            prev: Atomic::null(),
            claimed: AtomicBool::new(false),
        }
    }
}

/// Lock-free unbounded MPMC queue of byte payloads.
///
/// The queue is a doubly linked list between two permanent sentinels. A
/// producer splices its node immediately before the tail sentinel with a
/// single CAS on the predecessor's forward link; a consumer claims the node
/// immediately after the head sentinel and removes it with a single CAS on
/// the head sentinel's forward link. Backward links exist for constant-time
/// tail insertion and the two-sided emptiness check; they may briefly lag
/// behind the forward chain and are never used for traversal decisions.
///
/// Removed nodes are retired through epoch-based reclamation
/// (`crossbeam-epoch`): a node is freed only once every thread that could
/// still hold a reference to it has moved on. This rules out use-after-free
/// and ABA on the link CASes without locks in the hot path.
///
/// # Payload Ownership
///
/// [`enqueue`] copies the caller's bytes into a fresh buffer owned by the
/// queue; [`dequeue`] hands that buffer to the caller. Mutating the source
/// slice after an enqueue never affects the payload a consumer receives.
///
/// # Examples
///
/// ```
/// use courier::queue::ByteQueue;
///
/// # fn main() -> Result<(), courier::QueueError> {
/// let queue = ByteQueue::new();
///
/// queue.enqueue(b"first")?;
/// queue.enqueue(b"second")?;
///
/// assert_eq!(&queue.dequeue()?[..], b"first");
/// assert_eq!(&queue.dequeue()?[..], b"second");
/// assert!(queue.is_empty());
/// # Ok(())
/// # }
/// ```
///
/// [`enqueue`]: ByteQueue::enqueue
/// [`dequeue`]: ByteQueue::dequeue
pub struct ByteQueue {
    /// Head sentinel; its identity is stable for the queue's lifetime.
    head: CachePadded<Atomic<Node>>,
    /// Tail sentinel; its identity is stable for the queue's lifetime.
    tail: CachePadded<Atomic<Node>>,
    len: CachePadded<AtomicU64>,
    max_len: CachePadded<AtomicU64>,
    enqueued: CachePadded<AtomicU32>,
    dequeued: CachePadded<AtomicU32>,
    enqueue_retries: CachePadded<AtomicU32>,
    dequeue_retries: CachePadded<AtomicU32>,
}

// SAFETY: All shared state is atomic; payloads are owned boxes handed off
// between threads through the link protocol.
unsafe impl Send for ByteQueue {}
unsafe impl Sync for ByteQueue {}

impl Default for ByteQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ByteQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteQueue")
            .field("len", &self.len())
            .field("is_empty", &self.is_empty())
            .finish_non_exhaustive()
    }
}

impl ByteQueue {
    /// Create a new, empty queue.
    pub fn new() -> Self {
        let head = Box::into_raw(Box::new(Node::sentinel())).cast_const();
        let tail = Box::into_raw(Box::new(Node::sentinel())).cast_const();

        // SAFETY: both sentinels were just allocated and are not visible to
        // any other thread yet; publication happens when the queue itself is
        // shared.
        unsafe {
            (*head).next.store(Shared::from(tail), Ordering::Relaxed);
            (*tail).prev.store(Shared::from(head), Ordering::Relaxed);
        }

        Self {
            head: CachePadded::new(head.into()),
            tail: CachePadded::new(tail.into()),
            len: CachePadded::new(AtomicU64::new(0)),
            max_len: CachePadded::new(AtomicU64::new(0)),
            enqueued: CachePadded::new(AtomicU32::new(0)),
            dequeued: CachePadded::new(AtomicU32::new(0)),
            enqueue_retries: CachePadded::new(AtomicU32::new(0)),
            dequeue_retries: CachePadded::new(AtomicU32::new(0)),
        }
    }

    /// Append a payload at the tail of the queue.
    ///
    /// The bytes are copied into a freshly allocated buffer owned by the
    /// queue; the caller's slice is not retained. An empty slice enqueues an
    /// empty payload. Returns [`QueueError::OutOfMemory`] if the copy could
    /// not be allocated, leaving the queue unchanged.
    pub fn enqueue(&self, payload: &[u8]) -> Result<(), QueueError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(payload.len())
            .map_err(|_| QueueError::OutOfMemory {
                bytes: payload.len(),
            })?;
        buf.extend_from_slice(payload);
        self.enqueue_owned(buf.into_boxed_slice());
        Ok(())
    }

    /// Append an already-owned payload buffer at the tail of the queue.
    ///
    /// Zero-copy variant of [`enqueue`](ByteQueue::enqueue): ownership of
    /// the buffer moves into the queue without another allocation.
    pub fn enqueue_owned(&self, payload: Box<[u8]>) {
        let guard = &epoch::pin();
        let tail = self.tail.load(Ordering::Acquire, guard);
        // SAFETY: the tail sentinel lives until the queue is dropped.
        let tail_ref = unsafe { tail.deref() };

        let mut new = Owned::new(Node::with_payload(payload));

        loop {
            let prev = tail_ref.prev.load(Ordering::Acquire, guard);

            new.next.store(tail, Ordering::Relaxed);
            new.prev.store(prev, Ordering::Relaxed);
            // Publish the node's fields before the CAS below can make it
            // reachable.
            atomic::fence(Ordering::Release);

            // SAFETY: `prev` was loaded under `guard`, so even if it has
            // been unlinked concurrently its memory is not yet reclaimed.
            let prev_ref = unsafe { prev.deref() };

            // Splice before the tail sentinel. The CAS fails if another
            // producer got there first or if `prev` is sealed mid-removal;
            // both cases reread the freshest tail back-link.
            match prev_ref.next.compare_exchange(
                tail,
                new,
                Ordering::Release,
                Ordering::Acquire,
                guard,
            ) {
                Ok(new) => {
                    tail_ref.prev.store(new, Ordering::Release);

                    let len = self.len.fetch_add(1, Ordering::Relaxed) + 1;
                    self.max_len.fetch_max(len, Ordering::Relaxed);
                    self.enqueued.fetch_add(1, Ordering::Relaxed);
                    return;
                },
                Err(e) => {
                    new = e.new;
                    self.enqueue_retries.fetch_add(1, Ordering::Relaxed);
                },
            }
        }
    }

    /// Remove and return the payload at the head of the queue.
    ///
    /// On success the caller owns the returned buffer. Returns
    /// [`QueueError::Empty`] if no payload node existed at the moment of
    /// observation; that is a result, not a retry condition.
    pub fn dequeue(&self) -> Result<Box<[u8]>, QueueError> {
        let guard = &epoch::pin();
        let head = self.head.load(Ordering::Acquire, guard);
        let tail = self.tail.load(Ordering::Acquire, guard);
        // SAFETY: the head sentinel lives until the queue is dropped.
        let head_ref = unsafe { head.deref() };

        loop {
            let first = head_ref.next.load(Ordering::Acquire, guard);
            if first == tail {
                return Err(QueueError::Empty);
            }
            // SAFETY: `first` was reachable from the head sentinel under
            // `guard`, so its memory is not reclaimed while we are pinned.
            let first_ref = unsafe { first.deref() };

            // Claim the candidate; losing means another consumer is already
            // removing it.
            if first_ref
                .claimed
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                self.dequeue_retries.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            // The claim can be won on a node that a faster consumer already
            // unlinked and released; re-checking the head link filters those
            // out before we touch its forward link.
            if head_ref.next.load(Ordering::Acquire, guard) != first {
                first_ref.claimed.store(false, Ordering::Release);
                self.dequeue_retries.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            // Seal the outgoing link. The returned value is the stable
            // successor for the head swing, and the tag keeps producers from
            // splicing behind a node that is already on its way out.
            let succ = first_ref
                .next
                .fetch_or(SEALED, Ordering::AcqRel, guard)
                .with_tag(0);

            match head_ref.next.compare_exchange(
                first,
                succ,
                Ordering::Release,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    // SAFETY: only sentinels carry an uninitialized payload
                    // and `first` is not one; the claim plus the successful
                    // head swing make this thread the payload's sole owner.
                    let payload = unsafe { first_ref.payload.assume_init_read() };

                    // Back-link fixup for the new first node; when the queue
                    // just became empty this points the tail sentinel back
                    // at the head sentinel.
                    // SAFETY: `succ` is the sealed successor, still valid
                    // under `guard`.
                    unsafe { succ.deref() }.prev.store(head, Ordering::Release);

                    self.len.fetch_sub(1, Ordering::Relaxed);
                    self.dequeued.fetch_add(1, Ordering::Relaxed);

                    first_ref.claimed.store(false, Ordering::Release);
                    // SAFETY: `first` is unlinked; pinned readers may still
                    // hold it, so destruction is deferred to the collector.
                    unsafe { guard.defer_destroy(first) };

                    return Ok(payload);
                },
                Err(_) => {
                    // Undo the seal and the claim, then retry from the new
                    // head link.
                    first_ref.next.store(succ, Ordering::Release);
                    first_ref.claimed.store(false, Ordering::Release);
                    self.dequeue_retries.fetch_add(1, Ordering::Relaxed);
                },
            }
        }
    }

    /// Check if the queue is empty.
    ///
    /// The check is two-sided: the queue reports empty only when the head
    /// sentinel's forward link and the tail sentinel's backward link both
    /// point at the opposite sentinel. A fully linked payload node is never
    /// reported away; at worst a logically empty queue reads as non-empty
    /// for the instant an in-flight operation still has a back-link to fix.
    pub fn is_empty(&self) -> bool {
        let guard = &epoch::pin();
        let head = self.head.load(Ordering::Acquire, guard);
        let tail = self.tail.load(Ordering::Acquire, guard);

        // SAFETY: both sentinels live until the queue is dropped.
        let first = unsafe { head.deref() }.next.load(Ordering::Acquire, guard);
        let last = unsafe { tail.deref() }.prev.load(Ordering::Acquire, guard);

        first == tail && last == head
    }

    /// Get the current number of payloads in the queue.
    ///
    /// A point-in-time estimate under concurrent mutation; it is exact only
    /// at quiescence and must not be treated as a consistency signal.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire) as usize
    }

    /// Get the highest length the queue has reached since construction.
    ///
    /// Monotone non-decreasing; updated on every successful enqueue.
    pub fn max_len(&self) -> usize {
        self.max_len.load(Ordering::Relaxed) as usize
    }

    /// Take a snapshot of the queue's statistics counters.
    ///
    /// Each counter is read atomically, but the counters are not mutually
    /// consistent under concurrent load; the usual accounting identities
    /// hold exactly at quiescent points.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            len: self.len.load(Ordering::Acquire),
            max_len: self.max_len.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            enqueue_retries: self.enqueue_retries.load(Ordering::Relaxed),
            dequeue_retries: self.dequeue_retries.load(Ordering::Relaxed),
        }
    }

    /// Number of payload nodes on the forward chain, head to tail.
    #[cfg(test)]
    fn forward_len(&self) -> usize {
        let guard = &epoch::pin();
        let tail = self.tail.load(Ordering::Acquire, guard);
        let head = self.head.load(Ordering::Acquire, guard);

        let mut count = 0;
        // SAFETY: traversal runs at quiescence in tests; every link on the
        // path targets a live node protected by `guard`.
        let mut curr = unsafe { head.deref() }.next.load(Ordering::Acquire, guard);
        while curr != tail {
            count += 1;
            curr = unsafe { curr.deref() }.next.load(Ordering::Acquire, guard);
        }
        count
    }

    /// Number of payload nodes on the backward chain, tail to head.
    #[cfg(test)]
    fn backward_len(&self) -> usize {
        let guard = &epoch::pin();
        let tail = self.tail.load(Ordering::Acquire, guard);
        let head = self.head.load(Ordering::Acquire, guard);

        let mut count = 0;
        // SAFETY: traversal runs at quiescence in tests; every link on the
        // path targets a live node protected by `guard`.
        let mut curr = unsafe { tail.deref() }.prev.load(Ordering::Acquire, guard);
        while curr != head {
            count += 1;
            curr = unsafe { curr.deref() }.prev.load(Ordering::Acquire, guard);
        }
        count
    }
}

impl Drop for ByteQueue {
    fn drop(&mut self) {
        // SAFETY: `&mut self` guarantees no operation is in flight, so the
        // whole structure is privately owned and can be torn down eagerly.
        unsafe {
            let guard = epoch::unprotected();
            let head = self.head.load(Ordering::Relaxed, guard);
            let tail = self.tail.load(Ordering::Relaxed, guard);

            // Drain undelivered payloads, freeing each node as we go.
            let mut curr = head.deref().next.load(Ordering::Relaxed, guard);
            while curr != tail {
                let node = curr.into_owned().into_box();
                drop(node.payload.assume_init());
                curr = node.next.load(Ordering::Relaxed, guard);
            }

            drop(head.into_owned());
            drop(tail.into_owned());
        }
    }
}

/// Snapshot of a queue's statistics counters.
///
/// Taken with [`ByteQueue::stats`]. `len` and `max_len` are 64-bit exact
/// counts; the operation totals and retry counters are 32-bit wrapping
/// statistics. At quiescence `enqueued - dequeued == len` and the retry
/// counters bound how much CAS contention the queue absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Number of payloads currently in the queue.
    pub len: u64,
    /// Highest length reached since construction.
    pub max_len: u64,
    /// Successful enqueue operations (wrapping).
    pub enqueued: u32,
    /// Successful dequeue operations (wrapping).
    pub dequeued: u32,
    /// Enqueue CAS attempts that lost to a concurrent producer (wrapping).
    pub enqueue_retries: u32,
    /// Dequeue claim or CAS attempts that lost to a concurrent consumer
    /// (wrapping).
    pub dequeue_retries: u32,
}

impl fmt::Display for QueueStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Queue Statistics:")?;
        writeln!(f, "  Length: {}", self.len)?;
        writeln!(f, "  Max Length: {}", self.max_len)?;
        writeln!(f, "  Enqueued: {}", self.enqueued)?;
        writeln!(f, "  Dequeued: {}", self.dequeued)?;
        writeln!(f, "  Enqueue Retries: {}", self.enqueue_retries)?;
        writeln!(f, "  Dequeue Retries: {}", self.dequeue_retries)?;
        write!(
            f,
            "  Net Operations: {}",
            self.enqueued.wrapping_sub(self.dequeued) as i32
        )
    }
}

/// Producer handle for the byte queue.
///
/// A lightweight, cloneable handle that allows appending payloads to the
/// queue. Multiple producer handles can be created for the same queue,
/// enabling multi-producer scenarios. Each clone shares the same underlying
/// queue via `Arc`.
///
/// # Examples
///
/// ```
/// use courier::queue;
/// use std::thread;
///
/// # fn main() -> Result<(), courier::QueueError> {
/// let (producer, consumer) = queue::channel();
///
/// // Clone producer for another thread
/// let producer2 = producer.clone();
/// let handle = thread::spawn(move || {
///     producer2.enqueue(b"from thread").unwrap();
/// });
///
/// producer.enqueue(b"from main")?;
/// handle.join().unwrap();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Producer {
    queue: Arc<ByteQueue>,
}

impl Producer {
    /// Append a payload at the tail of the queue, copying the bytes.
    ///
    /// See [`ByteQueue::enqueue`].
    pub fn enqueue(&self, payload: &[u8]) -> Result<(), QueueError> {
        self.queue.enqueue(payload)
    }

    /// Append an already-owned payload buffer without copying.
    ///
    /// See [`ByteQueue::enqueue_owned`].
    pub fn enqueue_owned(&self, payload: Box<[u8]>) {
        self.queue.enqueue_owned(payload);
    }
}

impl QueueProducer<Box<[u8]>> for Producer {
    fn push(&self, value: Box<[u8]>) -> Result<(), QueueError> {
        self.queue.enqueue_owned(value);
        Ok(())
    }
}

/// Consumer handle for the byte queue.
///
/// A lightweight, cloneable handle that allows removing payloads from the
/// queue. Multiple consumer handles can be created for the same queue,
/// enabling multi-consumer scenarios. Each clone shares the same underlying
/// queue via `Arc`.
///
/// # Examples
///
/// ```
/// use courier::{queue, traits::QueueConsumer};
///
/// # fn main() -> Result<(), courier::QueueError> {
/// let (producer, consumer) = queue::channel();
///
/// producer.enqueue(b"a")?;
/// producer.enqueue(b"b")?;
///
/// let mut seen = Vec::new();
/// consumer.consume(|payload| {
///     seen.push(payload);
///     false // keep going until empty
/// });
/// assert_eq!(seen.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Consumer {
    queue: Arc<ByteQueue>,
}

impl Consumer {
    /// Remove and return the payload at the head of the queue.
    ///
    /// See [`ByteQueue::dequeue`].
    pub fn dequeue(&self) -> Result<Box<[u8]>, QueueError> {
        self.queue.dequeue()
    }

    /// Take a snapshot of the underlying queue's statistics counters.
    ///
    /// See [`ByteQueue::stats`].
    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

impl QueueConsumer<Box<[u8]>> for Consumer {
    fn pop(&self) -> Result<Box<[u8]>, QueueError> {
        self.queue.dequeue()
    }

    fn consume<F>(&self, mut consumer: F) -> usize
    where
        F: FnMut(Box<[u8]>) -> bool,
    {
        let mut count = 0;
        while let Ok(payload) = self.queue.dequeue() {
            count += 1;
            if consumer(payload) {
                break;
            }
        }
        count
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

impl QueueFactory<Box<[u8]>> for Arc<ByteQueue> {
    type Producer = Producer;
    type Consumer = Consumer;

    fn producer(&self) -> Self::Producer {
        Producer {
            queue: self.clone(),
        }
    }

    fn consumer(&self) -> Self::Consumer {
        Consumer {
            queue: self.clone(),
        }
    }
}

/// Create a shared byte queue with a producer/consumer handle pair.
///
/// Clone either handle to add more producers or consumers.
///
/// # Examples
///
/// ```
/// use courier::queue;
///
/// # fn main() -> Result<(), courier::QueueError> {
/// let (producer, consumer) = queue::channel();
///
/// producer.enqueue(b"payload")?;
/// assert_eq!(&consumer.dequeue()?[..], b"payload");
/// # Ok(())
/// # }
/// ```
pub fn channel() -> (Producer, Consumer) {
    Arc::new(ByteQueue::new()).channel()
}
