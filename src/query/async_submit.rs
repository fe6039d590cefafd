//! Asynchronous submission
//!
//! Runs [`Query::submit`] on a worker thread. The query's own callback still
//! fires on that thread; the query itself comes back through the channel
//! together with the outcome.

use std::thread;

use crossbeam::channel::{self, Receiver};
use tracing::debug;

use crate::error::Result;

use super::{Query, QueryStatus};

/// Outcome of an asynchronous submission
pub type AsyncOutcome = (Query, Result<QueryStatus>);

/// Submit `query` on a worker thread
///
/// The receiver yields exactly one message once processing ends.
pub fn submit_async(mut query: Query) -> Receiver<AsyncOutcome> {
    let (tx, rx) = channel::bounded(1);
    thread::spawn(move || {
        let result = query.submit();
        debug!(status = ?query.status(), "Asynchronous submission finished");
        // The caller may have dropped the receiver; the query is then dropped here
        let _ = tx.send((query, result));
    });
    rx
}
