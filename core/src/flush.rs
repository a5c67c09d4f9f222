//! Background snapshotting for an [`InvertedIndex`].
//!
//! A [`Flusher`] owns one OS thread that wakes on a ticker, flushes when the
//! index generation moved since the last successful flush, and exits when its
//! shutdown channel closes. Shutdown joins the thread and performs a final flush.

use crate::{IndexError, InvertedIndex};
use crossbeam_channel::{select, tick, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub struct Flusher {
    index: Arc<InvertedIndex>,
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Flusher {
    pub fn spawn(index: Arc<InvertedIndex>, interval: Duration) -> Result<Self, IndexError> {
        if interval.is_zero() {
            return Err(IndexError::Config("flush interval must be greater than 0".into()));
        }
        let (tx, rx) = crossbeam_channel::bounded::<()>(0);
        let worker = index.clone();
        let handle = std::thread::Builder::new()
            .name("index-flusher".into())
            .spawn(move || run(worker, interval, rx))?;
        tracing::info!(interval_ms = interval.as_millis() as u64, "index flusher started");
        Ok(Self { index, shutdown: Some(tx), handle: Some(handle) })
    }

    pub fn is_running(&self) -> bool { self.handle.as_ref().is_some_and(|h| !h.is_finished()) }

    /// Stop the ticker, wait for the thread and write a final snapshot.
    pub fn shutdown(mut self) -> Result<(), IndexError> { self.stop() }

    fn stop(&mut self) -> Result<(), IndexError> {
        // closing the channel wakes the select below
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("index flusher thread panicked");
            }
        }
        let res = self.index.flush();
        match &res {
            Ok(()) => tracing::info!("index flusher stopped after final flush"),
            Err(err) => tracing::error!(error = %err, "final index flush failed"),
        }
        res
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop();
        }
    }
}

fn run(index: Arc<InvertedIndex>, interval: Duration, shutdown: Receiver<()>) {
    let ticker = tick(interval);
    let mut flushed = None;
    loop {
        select! {
            recv(ticker) -> _ => {
                let current = index.generation();
                if flushed == Some(current) { continue; }
                match index.flush_generation() {
                    Ok(generation) => flushed = Some(generation),
                    Err(err) => tracing::warn!(error = %err, "background flush failed, retrying next tick"),
                }
            }
            recv(shutdown) -> _ => break,
        }
    }
}
