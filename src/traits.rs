use crate::QueueError;

/// Trait for queue producers that can push items into a queue.
///
/// This trait provides a consistent interface for all producer types,
/// whether they're byte-payload handles or typed handles.
pub trait QueueProducer<T> {
    /// Push a value into the queue.
    ///
    /// The queue is unbounded, so a push only fails if the internal copy of
    /// the value could not be allocated.
    ///
    /// # Arguments
    /// * `value` - The value to push
    ///
    /// # Returns
    /// `Ok(())` on success, or `QueueError` if the operation fails
    fn push(&self, value: T) -> Result<(), QueueError>;
}

/// Trait for queue consumers that can pop items from a queue.
///
/// This trait provides a consistent interface for all consumer types,
/// whether they're byte-payload handles or typed handles.
pub trait QueueConsumer<T> {
    /// Pop a value from the queue.
    ///
    /// Never waits for a producer: an empty queue is reported immediately.
    ///
    /// # Returns
    /// The popped value on success, or `QueueError::Empty` if the queue is
    /// empty
    fn pop(&self) -> Result<T, QueueError>;

    /// Consume elements with a closure until the queue is empty or the
    /// closure returns true to stop.
    ///
    /// # Arguments
    /// * `consumer` - Function to process each element, returns true to stop
    ///
    /// # Returns
    /// Number of elements consumed
    fn consume<F>(&self, consumer: F) -> usize
    where
        F: FnMut(T) -> bool;

    /// Check if the queue appears empty.
    /// Note: In concurrent scenarios, this may race with other operations.
    ///
    /// # Returns
    /// `true` if the queue appears empty
    fn is_empty(&self) -> bool;

    /// Get approximate queue length.
    /// Note: In concurrent scenarios, this may not be exact.
    ///
    /// # Returns
    /// Approximate number of elements in the queue
    fn len(&self) -> usize;
}

/// Trait for queues that can create producers and consumers.
///
/// This provides a consistent API for obtaining producer and consumer
/// handles from a shared queue.
pub trait QueueFactory<T> {
    /// The type of producers this queue creates
    type Producer: QueueProducer<T>;

    /// The type of consumers this queue creates
    type Consumer: QueueConsumer<T>;

    /// Create both producer and consumer handles in one call.
    ///
    /// This is a convenience method equivalent to calling both `producer()`
    /// and `consumer()`.
    ///
    /// # Returns
    /// A tuple containing `(producer, consumer)` handles
    fn channel(&self) -> (Self::Producer, Self::Consumer) {
        (self.producer(), self.consumer())
    }

    /// Create a new producer handle for this queue.
    ///
    /// # Returns
    /// A producer that can push items to this queue
    fn producer(&self) -> Self::Producer;

    /// Create a new consumer handle for this queue.
    ///
    /// # Returns
    /// A consumer that can pop items from this queue
    fn consumer(&self) -> Self::Consumer;
}
