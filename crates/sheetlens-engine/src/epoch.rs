/// Cache generation. Every mutation through the engine moves to the next epoch; anything
/// cached under an older epoch is stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

impl Epoch {
    pub fn next(self) -> Self {
        Epoch(self.0.wrapping_add(1))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// A cache value tagged with the epoch it was filled under.
///
/// Reading under a different epoch resets the value first, so invalidation is a counter bump
/// rather than a walk over every cache.
#[derive(Debug, Default)]
pub struct Stamped<T> {
    epoch: Epoch,
    value: T,
}

impl<T: Default> Stamped<T> {
    pub fn new(epoch: Epoch) -> Self {
        Self {
            epoch,
            value: T::default(),
        }
    }

    /// Mutable access for `current`, discarding contents built under another epoch
    pub fn current_mut(&mut self, current: Epoch) -> &mut T {
        if self.epoch != current {
            self.value = T::default();
            self.epoch = current;
        }
        &mut self.value
    }

    /// Read-only access; `None` when the contents are stale
    pub fn current(&self, current: Epoch) -> Option<&T> {
        (self.epoch == current).then_some(&self.value)
    }
}
