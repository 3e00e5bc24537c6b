//! Drives [`Assembly`] from a live frame stream.

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use alpha_core::stream::{Assembly, AssemblyState, Step};

use crate::error::ClientError;

/// Identifies one assembly started by [`StreamAssembler::begin`].
#[derive(Clone, Debug)]
pub struct Ticket {
    generation: u64,
    token: CancellationToken,
}

impl Ticket {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssemblyOutcome {
    pub state: AssemblyState,
    pub content: String,
    /// Number of times the visible text was published.
    pub updates: usize,
}

#[derive(Default)]
struct Active {
    generation: u64,
    token: Option<CancellationToken>,
}

/// At most one assembly runs at a time; starting one cancels its predecessor.
#[derive(Default)]
pub struct StreamAssembler {
    active: Mutex<Active>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> Ticket {
        let token = CancellationToken::new();
        let mut active = self.active.lock();
        if let Some(previous) = active.token.replace(token.clone()) {
            debug!("cancelling previous assembly");
            previous.cancel();
        }
        active.generation += 1;
        Ticket {
            generation: active.generation,
            token,
        }
    }

    /// Cancel the running assembly, if any.
    pub fn cancel(&self) -> bool {
        match self.active.lock().token.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().token.is_some()
    }

    /// Fold `lines` into an assembly, calling `publish` with the whole buffer
    /// each time it changes. Returns once the stream completes, fails or the
    /// ticket is cancelled.
    pub async fn run<S, F>(&self, ticket: Ticket, lines: S, mut publish: F) -> AssemblyOutcome
    where
        S: Stream<Item = Result<String, ClientError>>,
        F: FnMut(&str),
    {
        let mut lines = std::pin::pin!(lines);
        let mut assembly = Assembly::new();
        let mut updates = 0;
        assembly.start();

        loop {
            let next = tokio::select! {
                biased;
                _ = ticket.token.cancelled() => {
                    assembly.cancel();
                    break;
                }
                next = lines.next() => next,
            };

            match next {
                Some(Ok(line)) => match assembly.apply_line(&line) {
                    Step::Published(text) => {
                        updates += 1;
                        publish(text);
                    }
                    Step::Finished => break,
                    Step::Skipped => {}
                },
                Some(Err(e)) => {
                    warn!(error = %e, kind = e.error_kind(), "chat stream failed");
                    if let Some(text) = assembly.fail() {
                        updates += 1;
                        publish(text);
                    }
                    break;
                }
                None => {
                    assembly.finish();
                    break;
                }
            }
        }

        self.release(&ticket);
        let state = assembly.state();
        debug!(?state, updates, "assembly ended");
        AssemblyOutcome {
            state,
            content: assembly.into_content(),
            updates,
        }
    }

    /// Run a stream that could not even be opened.
    pub fn fail(
        &self,
        ticket: Ticket,
        error: &ClientError,
        mut publish: impl FnMut(&str),
    ) -> AssemblyOutcome {
        let mut assembly = Assembly::new();
        assembly.start();
        let mut updates = 0;
        if ticket.token.is_cancelled() {
            assembly.cancel();
        } else {
            warn!(error = %error, kind = error.error_kind(), "chat request failed");
            if let Some(text) = assembly.fail() {
                updates += 1;
                publish(text);
            }
        }
        self.release(&ticket);
        AssemblyOutcome {
            state: assembly.state(),
            content: assembly.into_content(),
            updates,
        }
    }

    fn release(&self, ticket: &Ticket) {
        let mut active = self.active.lock();
        if active.generation == ticket.generation {
            active.token = None;
        }
    }
}
