//! The processor contract.

use crate::signal::Signal;

/// Consumes signals of one type and produces signals of another.
///
/// A processor sees its input in order and may emit nothing for a given input
/// (a rate limiter dropping a duplicate, for example). Processors never see
/// each other's state; to run one concurrently, hand it to
/// [`crate::stream::spawn`].
pub trait SignalProcessor<I, O, P = ()> {
    /// Feed one signal, get at most one signal back.
    fn process(&mut self, signal: Signal<I, P>) -> Option<Signal<O, P>>;

    /// Feed a finite sequence, collecting everything emitted.
    fn process_all<It>(&mut self, input: It) -> Vec<Signal<O, P>>
    where
        It: IntoIterator<Item = Signal<I, P>>,
        Self: Sized,
    {
        input
            .into_iter()
            .filter_map(|signal| self.process(signal))
            .collect()
    }
}

impl<I, O, P, F> SignalProcessor<I, O, P> for F
where
    F: FnMut(Signal<I, P>) -> Option<Signal<O, P>>,
{
    fn process(&mut self, signal: Signal<I, P>) -> Option<Signal<O, P>> {
        self(signal)
    }
}
