use std::sync::Arc;

/// Receiver of a subscription's items and errors.
///
/// There is no completion signal: a stream runs until it is unsubscribed.
pub trait Observer<T, E>: Send + Sync {
    fn next(&self, item: T);
    fn error(&self, error: E);
}

pub trait BlockSubscription<T, E>: Send + Sync {
    /// Start streaming from `start_block`. Returns without waiting for the stream.
    fn subscribe(&self, observer: Arc<dyn Observer<T, E>>, start_block: u64);

    /// Stop the active stream. Always returns `true`.
    fn unsubscribe(&self) -> bool;

    /// Whether a stream is currently live.
    fn is_active(&self) -> bool;
}
