//! Background work for the GUI thread.
//!
//! Each job runs its future on a dedicated thread with a current-thread tokio
//! runtime and hands the output back over a channel the frame loop polls.

use anyhow::{anyhow, Result};
use std::future::Future;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use tokio::runtime::Builder;

pub struct AsyncJob<T> {
    receiver: Option<Receiver<T>>,
}

impl<T: Send + 'static> AsyncJob<T> {
    /// Build the future on a worker thread and run it to completion there
    pub fn spawn<FutBuilder, Fut>(builder: FutBuilder) -> Self
    where
        FutBuilder: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || match Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => {
                let _ = tx.send(runtime.block_on(builder()));
            }
            // Dropping `tx` surfaces as a lost job in `poll`
            Err(e) => tracing::error!("Failed to create async runtime: {}", e),
        });
        Self { receiver: Some(rx) }
    }
}

impl<T> AsyncJob<T> {
    /// `Some` once the job is done; an error if the worker died without a result
    pub fn poll(&mut self) -> Option<Result<T>> {
        let rx = self.receiver.as_ref()?;
        match rx.try_recv() {
            Ok(value) => {
                self.receiver = None;
                Some(Ok(value))
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.receiver = None;
                Some(Err(anyhow!("Worker task disconnected")))
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.receiver.is_some()
    }
}
