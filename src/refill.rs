use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::word_generator::TextSupplier;

/// Ask for more text on behalf of one session generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefillRequest {
    pub generation: u64,
}

/// Text produced for a [`RefillRequest`]. Empty text means the supplier had
/// nothing to give.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefillResponse {
    pub generation: u64,
    pub text: String,
}

/// Run a supplier and fold failures into an empty response.
pub fn run_supplier(supplier: &mut dyn TextSupplier, request: RefillRequest) -> RefillResponse {
    let text = match supplier.supply_more() {
        Ok(text) => text,
        Err(err) => {
            warn!(generation = request.generation, %err, "refill failed, buffer will not grow");
            String::new()
        }
    };
    RefillResponse {
        generation: request.generation,
        text,
    }
}

/// Serves refill requests on a background thread so keystroke handling
/// never waits on text supply.
pub struct RefillWorker {
    requests: Option<Sender<RefillRequest>>,
    handle: Option<JoinHandle<()>>,
}

impl RefillWorker {
    /// `deliver` receives every response and returns false once nobody is
    /// listening any more, which stops the worker.
    pub fn spawn<F>(mut supplier: Box<dyn TextSupplier>, deliver: F) -> Self
    where
        F: Fn(RefillResponse) -> bool + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<RefillRequest>();

        let handle = thread::spawn(move || {
            for request in rx {
                let response = run_supplier(supplier.as_mut(), request);
                debug!(generation = response.generation, chars = response.text.len(), "refill ready");
                if !deliver(response) {
                    break;
                }
            }
        });

        Self {
            requests: Some(tx),
            handle: Some(handle),
        }
    }

    pub fn request(&self, request: RefillRequest) {
        let sent = self
            .requests
            .as_ref()
            .is_some_and(|tx| tx.send(request).is_ok());
        if !sent {
            warn!(generation = request.generation, "refill worker is gone, request dropped");
        }
    }
}

impl Drop for RefillWorker {
    fn drop(&mut self) {
        // closing the channel ends the worker loop
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
