use tokio::sync::oneshot;
use tuya::TuyaError;

/// A single-resolution result shared by many waiters.
///
/// The coalescer creates one of these per debounce window, hands a
/// [`oneshot::Receiver`] to every caller that attaches, and settles it
/// exactly once when the window resolves. Settlement is idempotent:
/// multiple failure paths may race, and only the first outcome counts.
pub struct DebouncedPromise<T: Clone> {
    waiters: Vec<oneshot::Sender<Result<T, TuyaError>>>,
    settled: bool,
}

impl<T: Clone> DebouncedPromise<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            waiters: Vec::new(),
            settled: false,
        }
    }

    /// Attach one more waiter to the shared outcome.
    pub fn subscribe(&mut self) -> oneshot::Receiver<Result<T, TuyaError>> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        rx
    }

    pub fn resolve(&mut self, value: T) {
        self.settle(Ok(value));
    }

    pub fn reject(&mut self, error: TuyaError) {
        self.settle(Err(error));
    }

    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.settled
    }

    fn settle(&mut self, outcome: Result<T, TuyaError>) {
        if self.settled {
            return;
        }
        self.settled = true;
        for waiter in self.waiters.drain(..) {
            // A waiter that gave up (dropped its receiver) is not an error.
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl<T: Clone> Default for DebouncedPromise<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fans_one_value_out_to_all_waiters() {
        let mut promise = DebouncedPromise::new();
        let a = promise.subscribe();
        let b = promise.subscribe();
        let c = promise.subscribe();

        promise.resolve(42u32);

        assert_eq!(a.await.unwrap(), Ok(42));
        assert_eq!(b.await.unwrap(), Ok(42));
        assert_eq!(c.await.unwrap(), Ok(42));
    }

    #[tokio::test]
    async fn rejection_reaches_every_waiter() {
        let mut promise: DebouncedPromise<u32> = DebouncedPromise::new();
        let a = promise.subscribe();
        let b = promise.subscribe();

        promise.reject(TuyaError::DeviceOffline);

        assert_eq!(a.await.unwrap(), Err(TuyaError::DeviceOffline));
        assert_eq!(b.await.unwrap(), Err(TuyaError::DeviceOffline));
    }

    #[tokio::test]
    async fn second_settlement_is_a_no_op() {
        let mut promise = DebouncedPromise::new();
        let rx = promise.subscribe();

        promise.resolve(1u32);
        promise.reject(TuyaError::DeviceOffline);
        promise.resolve(2u32);

        assert!(promise.is_settled());
        assert_eq!(rx.await.unwrap(), Ok(1));
    }

    #[tokio::test]
    async fn dropped_waiter_does_not_block_settlement() {
        let mut promise = DebouncedPromise::new();
        let kept = promise.subscribe();
        drop(promise.subscribe());

        promise.resolve(7u32);
        assert_eq!(kept.await.unwrap(), Ok(7));
    }
}
