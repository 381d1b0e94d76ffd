//! Upstream signal chain interface.
//!
//! The acquisition controller drives the chain through a ready/valid contract:
//! it pushes at most one input per step while [`SignalChain::ready`] is high,
//! and polls at most one result per step. A `Some` from [`SignalChain::poll`]
//! is the "data ready" pulse together with its result word.

use crate::sample::Sample;

/// Generation/filter/transform stage sitting in front of the queue.
pub trait SignalChain: Send {
    /// Ready for the next input sample (level).
    fn ready(&self) -> bool;

    /// Accept one input sample. Only called while [`SignalChain::ready`] is high.
    fn push(&mut self, input: i16);

    /// Data-ready pulse with its result, at most one per step.
    fn poll(&mut self) -> Option<Sample>;

    /// Discard all in-flight data.
    fn reset(&mut self) {}
}

/// Chain that hands every input straight back as a result word.
///
/// Results carry the input in the real (low) half with a zero imaginary half,
/// so a counting source produces consecutive words.
#[derive(Debug, Default)]
pub struct PassThrough {
    pending: Option<Sample>,
}

impl PassThrough {
    /// Create an empty pass-through chain.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignalChain for PassThrough {
    fn ready(&self) -> bool {
        self.pending.is_none()
    }

    fn push(&mut self, input: i16) {
        self.pending = Some(Sample::from_complex(input, 0));
    }

    fn poll(&mut self) -> Option<Sample> {
        self.pending.take()
    }

    fn reset(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_through_one_result_per_input() {
        let mut chain = PassThrough::new();
        assert!(chain.ready());
        assert_eq!(chain.poll(), None);

        chain.push(-2);
        assert!(!chain.ready());
        let result = chain.poll().unwrap();
        assert_eq!(result.re(), -2);
        assert_eq!(result.im(), 0);
        assert!(chain.ready());
    }

    #[test]
    fn test_reset_discards_pending() {
        let mut chain = PassThrough::new();
        chain.push(5);
        chain.reset();
        assert_eq!(chain.poll(), None);
    }
}
