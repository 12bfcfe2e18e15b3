//! Generation tags for asynchronous reads.
//!
//! Every read is issued with the generation current at the time. Mode
//! switches, address loads and wallet changes advance the counter, and a
//! result whose tag no longer matches is dropped instead of applied.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

#[derive(Debug, Default)]
pub struct GenerationCounter {
    current: u64,
}

impl GenerationCounter {
    pub fn current(&self) -> Generation {
        Generation(self.current)
    }

    /// Invalidate everything issued so far
    pub fn advance(&mut self) -> Generation {
        self.current += 1;
        Generation(self.current)
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        generation.0 == self.current
    }
}

/// A result carrying the generation that requested it.
#[derive(Debug, Clone)]
pub struct Tagged<T> {
    pub generation: Generation,
    pub value: T,
}

impl<T> Tagged<T> {
    pub fn new(generation: Generation, value: T) -> Self {
        Self { generation, value }
    }

    /// The value if it is still current, otherwise `None`
    pub fn accept(self, counter: &GenerationCounter) -> Option<T> {
        counter.is_current(self.generation).then_some(self.value)
    }
}
