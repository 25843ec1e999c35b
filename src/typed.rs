use crate::{
    QueueError, decode_value, encode_value,
    queue::{ByteQueue, QueueStats},
    traits::{QueueConsumer, QueueFactory, QueueProducer},
};
use std::{fmt, marker::PhantomData, sync::Arc};

/// A lock-free FIFO queue for plain-data values, layered on the byte core.
///
/// The facade keeps the core type-agnostic: a value is stored by copying its
/// bytes into a payload buffer on enqueue and reconstructing the value from
/// that buffer on dequeue. Because only this queue writes its internal byte
/// queue, every payload it dequeues is exactly `size_of::<T>()` bytes of a
/// previously valid `T`.
///
/// # Type Parameters
///
/// * `T` - The value type to store (must be `Copy + Send + Sync`)
///
/// # Examples
///
/// ```
/// use courier::typed::TypedQueue;
///
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// struct Sample {
///     id: u32,
///     reading: f64,
/// }
///
/// # fn main() -> Result<(), courier::QueueError> {
/// let queue = TypedQueue::<Sample>::new();
///
/// let sample = Sample { id: 7, reading: 0.25 };
/// queue.enqueue(sample)?;
/// assert_eq!(queue.dequeue()?, sample);
/// # Ok(())
/// # }
/// ```
pub struct TypedQueue<T>
where
    T: Copy + Send + Sync,
{
    queue: ByteQueue,
    _phantom: PhantomData<T>,
}

impl<T> fmt::Debug for TypedQueue<T>
where
    T: Copy + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedQueue")
            .field("len", &self.len())
            .field("is_empty", &self.is_empty())
            .finish_non_exhaustive()
    }
}

impl<T> Default for TypedQueue<T>
where
    T: Copy + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TypedQueue<T>
where
    T: Copy + Send + Sync,
{
    /// Create a new, empty typed queue.
    pub fn new() -> Self {
        Self {
            queue: ByteQueue::new(),
            _phantom: PhantomData,
        }
    }

    /// Append a value at the tail of the queue.
    ///
    /// The value's bytes are copied into a queue-owned payload; the queue is
    /// unbounded, so the call only fails on allocation failure.
    pub fn enqueue(&self, value: T) -> Result<(), QueueError> {
        self.queue.enqueue_owned(encode_value(value));
        Ok(())
    }

    /// Remove and return the value at the head of the queue.
    ///
    /// Returns [`QueueError::Empty`] if no value was available at the moment
    /// of observation.
    pub fn dequeue(&self) -> Result<T, QueueError> {
        let payload = self.queue.dequeue()?;
        Ok(decode_value(&payload))
    }

    /// Check if the queue is empty.
    ///
    /// See [`ByteQueue::is_empty`] for the observation guarantees.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Get the current number of values in the queue.
    ///
    /// A point-in-time estimate under concurrent mutation.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Get the highest length the queue has reached since construction.
    pub fn max_len(&self) -> usize {
        self.queue.max_len()
    }

    /// Take a snapshot of the underlying queue's statistics counters.
    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

/// Producer handle for a typed queue.
///
/// A lightweight, cloneable handle that allows pushing values to the queue.
/// Each clone shares the same underlying queue via `Arc`.
///
/// # Examples
///
/// ```
/// use courier::{typed, traits::QueueProducer};
/// use std::thread;
///
/// # fn main() -> Result<(), courier::QueueError> {
/// let (producer, consumer) = typed::channel::<u64>();
///
/// let producer2 = producer.clone();
/// let handle = thread::spawn(move || {
///     producer2.push(42).unwrap();
/// });
///
/// producer.push(100)?;
/// handle.join().unwrap();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TypedProducer<T>
where
    T: Copy + Send + Sync,
{
    queue: Arc<TypedQueue<T>>,
}

impl<T> Clone for TypedProducer<T>
where
    T: Copy + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
        }
    }
}

impl<T> QueueProducer<T> for TypedProducer<T>
where
    T: Copy + Send + Sync,
{
    fn push(&self, value: T) -> Result<(), QueueError> {
        self.queue.enqueue(value)
    }
}

/// Consumer handle for a typed queue.
///
/// A lightweight, cloneable handle that allows popping values from the
/// queue. Each clone shares the same underlying queue via `Arc`.
///
/// # Examples
///
/// ```
/// use courier::{
///     typed,
///     traits::{QueueConsumer, QueueProducer},
/// };
///
/// # fn main() -> Result<(), courier::QueueError> {
/// let (producer, consumer) = typed::channel::<i32>();
///
/// producer.push(1)?;
/// producer.push(2)?;
/// producer.push(3)?;
///
/// let mut sum = 0;
/// consumer.consume(|value| {
///     sum += value;
///     false // continue until empty
/// });
/// assert_eq!(sum, 6);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TypedConsumer<T>
where
    T: Copy + Send + Sync,
{
    queue: Arc<TypedQueue<T>>,
}

impl<T> Clone for TypedConsumer<T>
where
    T: Copy + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
        }
    }
}

impl<T> TypedConsumer<T>
where
    T: Copy + Send + Sync,
{
    /// Take a snapshot of the underlying queue's statistics counters.
    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

impl<T> QueueConsumer<T> for TypedConsumer<T>
where
    T: Copy + Send + Sync,
{
    fn pop(&self) -> Result<T, QueueError> {
        self.queue.dequeue()
    }

    fn consume<F>(&self, mut consumer: F) -> usize
    where
        F: FnMut(T) -> bool,
    {
        let mut count = 0;
        while let Ok(value) = self.queue.dequeue() {
            count += 1;
            if consumer(value) {
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

impl<T> QueueFactory<T> for Arc<TypedQueue<T>>
where
    T: Copy + Send + Sync,
{
    type Producer = TypedProducer<T>;
    type Consumer = TypedConsumer<T>;

    fn producer(&self) -> Self::Producer {
        TypedProducer {
            queue: self.clone(),
        }
    }

    fn consumer(&self) -> Self::Consumer {
        TypedConsumer {
            queue: self.clone(),
        }
    }
}

/// Create a shared typed queue with a producer/consumer handle pair.
///
/// # Examples
///
/// ```
/// use courier::{
///     typed,
///     traits::{QueueConsumer, QueueProducer},
/// };
///
/// # fn main() -> Result<(), courier::QueueError> {
/// let (producer, consumer) = typed::channel::<u32>();
///
/// producer.push(7)?;
/// assert_eq!(consumer.pop()?, 7);
/// # Ok(())
/// # }
/// ```
pub fn channel<T>() -> (TypedProducer<T>, TypedConsumer<T>)
where
    T: Copy + Send + Sync,
{
    Arc::new(TypedQueue::new()).channel()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn roundtrip_single_value() {
        let q = TypedQueue::<i32>::new();

        q.enqueue(10).unwrap();
        assert_eq!(q.len(), 1);
        assert_eq!(q.max_len(), 1);

        assert_eq!(q.dequeue().unwrap(), 10);
        assert_eq!(q.len(), 0);
        assert_eq!(q.dequeue(), Err(QueueError::Empty));
    }

    #[test]
    fn fifo_order_of_five_values() {
        let q = TypedQueue::<i32>::new();

        for value in [10, 20, 30, 40, 50] {
            q.enqueue(value).unwrap();
        }
        assert_eq!(q.len(), 5);
        assert_eq!(q.max_len(), 5);

        for expected in [10, 20, 30, 40, 50] {
            assert_eq!(q.dequeue().unwrap(), expected);
        }
        assert_eq!(q.dequeue(), Err(QueueError::Empty));
    }

    #[test]
    fn struct_values_roundtrip_exactly() {
        #[derive(Debug, Clone, Copy, PartialEq)]
        struct Reading {
            channel: u16,
            raw: u32,
            scaled: f64,
        }

        let q = TypedQueue::<Reading>::new();
        let reading = Reading {
            channel: 3,
            raw: 0xDEAD_BEEF,
            scaled: -12.5,
        };

        q.enqueue(reading).unwrap();
        assert_eq!(q.dequeue().unwrap(), reading);
    }

    #[test]
    fn payloads_carry_the_value_size() {
        let q = TypedQueue::<u64>::new();
        q.enqueue(1).unwrap();

        // The underlying payload is the value's byte image.
        let stats = q.stats();
        assert_eq!(stats.enqueued, 1);
        assert_eq!(q.dequeue().unwrap(), 1);
    }

    #[test]
    fn factory_channel_pairs_handles_on_a_shared_queue() {
        let queue = Arc::new(TypedQueue::<u16>::new());
        let (producer, consumer) = queue.channel();

        producer.push(9).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(consumer.pop().unwrap(), 9);
        assert!(queue.is_empty());
    }

    #[test]
    fn handles_share_one_queue() {
        let (producer, consumer) = channel::<u32>();

        producer.push(5).unwrap();
        producer.push(6).unwrap();

        assert_eq!(consumer.len(), 2);
        assert_eq!(consumer.pop().unwrap(), 5);
        assert_eq!(consumer.pop().unwrap(), 6);
        assert!(consumer.is_empty());
        assert_eq!(consumer.stats().dequeued, 2);
    }

    #[test]
    fn consume_stops_on_request() {
        let (producer, consumer) = channel::<u32>();

        for i in 0..5 {
            producer.push(i).unwrap();
        }

        let mut seen = Vec::new();
        let count = consumer.consume(|value| {
            seen.push(value);
            value == 2 // stop when we see value 2
        });

        assert_eq!(count, 3);
        assert_eq!(seen, vec![0, 1, 2]);

        // The rest stays queued.
        assert_eq!(consumer.pop().unwrap(), 3);
        assert_eq!(consumer.pop().unwrap(), 4);
        assert!(consumer.is_empty());
    }

    #[test]
    fn mpmc_stress_values_conserved() {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 1000;

        let q = TypedQueue::<u64>::new();

        thread::scope(|scope| {
            for tid in 0..PRODUCERS {
                let q = &q;
                scope.spawn(move || {
                    for i in 0..PER_PRODUCER {
                        q.enqueue(tid * 10_000 + i).unwrap();
                    }
                });
            }
        });

        let mut values = Vec::new();
        while let Ok(value) = q.dequeue() {
            values.push(value);
        }
        values.sort_unstable();

        let mut expected: Vec<u64> = (0..PRODUCERS)
            .flat_map(|tid| (0..PER_PRODUCER).map(move |i| tid * 10_000 + i))
            .collect();
        expected.sort_unstable();

        assert_eq!(values, expected);
        assert!(q.is_empty());
    }
}
