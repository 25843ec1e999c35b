//! # Courier: Lock-Free Byte-Payload FIFO Queues
//!
//! Courier is a lock-free, unbounded Multi-Producer Multi-Consumer (MPMC)
//! queue for variable-length opaque byte payloads. Producers hand the queue
//! a byte slice; the queue keeps its own copy until a consumer removes it
//! and takes ownership of the buffer.
//!
//! ## Features
//!
//! - **Lock-free algorithms**: enqueue and dequeue splice nodes in and out
//!   with atomic compare-and-swap; no mutexes on the hot path
//! - **MPMC support**: any number of producers and consumers share one queue
//! - **Unbounded**: enqueue never reports a full queue and never blocks
//! - **Owned payloads**: the queue copies on enqueue, the caller owns the
//!   buffer returned by dequeue
//! - **Safe reclamation**: removed nodes are retired through epoch-based
//!   reclamation, so concurrent observers can never touch freed memory
//! - **Statistics**: length, high-water mark, operation totals and CAS retry
//!   counters, readable as a point-in-time snapshot
//!
//! ## Queue Types
//!
//! ### 1. Byte Queue ([`ByteQueue`])
//! The core queue for raw payloads:
//!
//! ```rust
//! use courier::queue::ByteQueue;
//!
//! # fn main() -> Result<(), courier::QueueError> {
//! let queue = ByteQueue::new();
//!
//! queue.enqueue(b"hello")?;
//! let payload = queue.dequeue()?;
//! assert_eq!(&payload[..], b"hello");
//! # Ok(())
//! # }
//! ```
//!
//! ### 2. Typed Queue ([`TypedQueue`])
//! A facade for `Copy` types, encoded through the same byte core:
//!
//! ```rust
//! use courier::typed::TypedQueue;
//!
//! # fn main() -> Result<(), courier::QueueError> {
//! let queue = TypedQueue::<u64>::new();
//!
//! queue.enqueue(42)?;
//! assert_eq!(queue.dequeue()?, 42);
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! Both queue types are `Send + Sync`. Cloneable producer/consumer handles
//! make the multi-threaded wiring explicit:
//!
//! ```rust
//! use courier::{
//!     queue,
//!     traits::{QueueConsumer, QueueProducer},
//! };
//! use std::thread;
//!
//! # fn main() -> Result<(), courier::QueueError> {
//! let (producer, consumer) = queue::channel();
//!
//! let handle = {
//!     let producer = producer.clone();
//!     thread::spawn(move || {
//!         for i in 0u32..100 {
//!             producer.push(Box::from(i.to_le_bytes())).unwrap();
//!         }
//!     })
//! };
//! handle.join().unwrap();
//!
//! let mut received = 0;
//! while consumer.pop().is_ok() {
//!     received += 1;
//! }
//! assert_eq!(received, 100);
//! # Ok(())
//! # }
//! ```
//!
//! ## Progress and Contention
//!
//! Operations never park the calling thread. A losing compare-and-swap
//! retries with fresh inputs; every retry is counted in the statistics so
//! callers can observe contention without tracing. `dequeue` on an empty
//! queue returns [`QueueError::Empty`] immediately rather than waiting for
//! a producer; callers that need back-pressure or bounded work must impose
//! it themselves.
//!
//! ## Error Handling
//!
//! Fallible operations return `Result` types with descriptive errors:
//! - [`QueueError::Empty`] - no payload was available to dequeue
//! - [`QueueError::OutOfMemory`] - the internal payload copy could not be
//!   allocated
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! Courier requires Rust 1.88 or later.
//!
//! [`ByteQueue`]: queue::ByteQueue
//! [`TypedQueue`]: typed::TypedQueue
#![deny(
    missing_docs,
    unused_imports,
    unused_variables,
    dead_code,
    unreachable_code,
    unused_must_use
)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::similar_names
)]

/// Core lock-free byte-payload queue implementation.
///
/// This module provides the foundational [`ByteQueue`] with its sentinel
/// node graph, the [`Producer`]/[`Consumer`] handle pair, and the
/// [`QueueStats`] counter snapshot.
///
/// [`ByteQueue`]: queue::ByteQueue
/// [`Producer`]: queue::Producer
/// [`Consumer`]: queue::Consumer
/// [`QueueStats`]: queue::QueueStats
pub mod queue;

/// Common traits for queue producers, consumers, and factories.
///
/// This module defines the core abstractions that enable consistent APIs
/// across the byte queue and the typed facade: [`QueueProducer`],
/// [`QueueConsumer`], and [`QueueFactory`].
///
/// [`QueueProducer`]: traits::QueueProducer
/// [`QueueConsumer`]: traits::QueueConsumer
/// [`QueueFactory`]: traits::QueueFactory
pub mod traits;

/// Typed queue facade for `Copy` types over the byte core.
///
/// This module provides [`TypedQueue`] which stores plain-data values by
/// copying their bytes into queue payloads, keeping the core type-agnostic.
///
/// [`TypedQueue`]: typed::TypedQueue
pub mod typed;

use std::{mem::MaybeUninit, ptr};
use thiserror::Error;

/// Errors that can occur during queue operations.
///
/// This enum provides comprehensive error reporting for all queue
/// operations, enabling robust error handling in concurrent applications.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue contained no payload at the moment of observation.
    ///
    /// This is a distinguished non-success result, not a failure: with
    /// concurrent producers a payload may become available immediately
    /// afterwards. No statistics counter is incremented for it.
    #[error("queue is empty")]
    Empty,

    /// Allocating the internal payload copy failed.
    ///
    /// The queue's state is unchanged; the enqueue had no effect. The
    /// fixed-size node header itself is allocated through the global
    /// allocator and follows its failure policy.
    #[error("payload allocation of {bytes} bytes failed")]
    OutOfMemory {
        /// The payload length whose copy could not be allocated.
        bytes: usize,
    },
}

/// Copies the raw bytes of a `Copy` value into a freshly allocated payload
/// buffer.
///
/// # Safety
///
/// This function uses `unsafe` code for byte-level copying but maintains
/// safety by:
/// - Only copying `size_of::<T>()` bytes into a buffer of exactly that size
/// - Ensuring `T: Copy` for bitwise copying safety
fn encode_value<T: Copy>(value: T) -> Box<[u8]> {
    let size = size_of::<T>();
    let mut buf = vec![0u8; size].into_boxed_slice();

    // SAFETY: We copy exactly `size` bytes from a valid `T` into a buffer
    // allocated with that exact length.
    unsafe {
        ptr::copy_nonoverlapping((&raw const value).cast::<u8>(), buf.as_mut_ptr(), size);
    }

    buf
}

/// Reconstructs a `Copy` value from the payload bytes produced by
/// [`encode_value`].
///
/// # Safety
///
/// This function uses `unsafe` code for byte-level copying but maintains
/// safety by:
/// - Only copying the exact size of `T`
/// - Using `MaybeUninit` to handle uninitialized memory properly
/// - Requiring that `bytes` came from [`encode_value`] for the same `T`, so
///   the bit pattern is a valid `T`
fn decode_value<T: Copy>(bytes: &[u8]) -> T {
    let size = size_of::<T>();
    assert_eq!(bytes.len(), size, "payload length does not match value size");

    let mut value = MaybeUninit::<T>::uninit();

    // SAFETY: `bytes` holds exactly `size_of::<T>()` bytes written from a
    // valid `T` during encoding, so assuming initialization is sound.
    unsafe {
        ptr::copy_nonoverlapping(bytes.as_ptr(), value.as_mut_ptr().cast::<u8>(), size);
        value.assume_init()
    }
}
