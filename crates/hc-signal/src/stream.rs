//! Running processors over tokio channels.
//!
//! Streams are bounded `mpsc` channels. Completion is the sender side being
//! dropped, so a pipeline shuts down from the source outward.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::processor::SignalProcessor;
use crate::signal::Signal;

/// Capacity of every channel created by this module.
pub const CHANNEL_CAPACITY: usize = 64;

pub type SignalSender<T, P = ()> = mpsc::Sender<Signal<T, P>>;
pub type SignalReceiver<T, P = ()> = mpsc::Receiver<Signal<T, P>>;

/// Fresh bounded signal channel.
pub fn channel<T, P>() -> (SignalSender<T, P>, SignalReceiver<T, P>) {
    mpsc::channel(CHANNEL_CAPACITY)
}

/// Run `processor` as its own task, reading `input` until it completes.
///
/// The returned receiver completes once the input completes (or its reader goes
/// away). The join handle hands the processor back for inspection.
pub fn spawn<Proc, I, O, P>(
    mut processor: Proc,
    mut input: SignalReceiver<I, P>,
) -> (SignalReceiver<O, P>, JoinHandle<Proc>)
where
    Proc: SignalProcessor<I, O, P> + Send + 'static,
    I: Send + 'static,
    O: Send + 'static,
    P: Send + 'static,
{
    let (tx, rx) = channel();
    let handle = tokio::spawn(async move {
        while let Some(signal) = input.recv().await {
            if let Some(out) = processor.process(signal) {
                if tx.send(out).await.is_err() {
                    tracing::debug!("downstream closed, stopping processor");
                    break;
                }
            }
        }
        processor
    });
    (rx, handle)
}

/// Interleave several streams into one, in arrival order.
///
/// The merged stream completes when every input has completed.
pub fn merge<T, P>(inputs: Vec<SignalReceiver<T, P>>) -> SignalReceiver<T, P>
where
    T: Send + 'static,
    P: Send + 'static,
{
    let (tx, rx) = channel();
    for mut input in inputs {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(signal) = input.recv().await {
                if tx.send(signal).await.is_err() {
                    break;
                }
            }
        });
    }
    rx
}

/// Finite stream from an in-memory sequence. Completes after the last item.
pub fn from_iter<T, P>(signals: impl IntoIterator<Item = Signal<T, P>>) -> SignalReceiver<T, P> {
    let signals: Vec<_> = signals.into_iter().collect();
    let (tx, rx) = mpsc::channel(signals.len().max(1));
    for signal in signals {
        // Capacity equals the item count, so this cannot be full.
        let _ = tx.try_send(signal);
    }
    rx
}

/// Drain a stream to completion.
pub async fn collect<T, P>(mut input: SignalReceiver<T, P>) -> Vec<Signal<T, P>> {
    let mut out = Vec::new();
    while let Some(signal) = input.recv().await {
        out.push(signal);
    }
    out
}
