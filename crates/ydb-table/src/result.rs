//! Query results.
//!
//! [`QueryResult`] wraps the unary query response (a sequence of result
//! sets), [`QueryStream`] the streaming variant. Both hand out
//! [`ResultSetReader`]s; scanning errors stay inside the reader.

use crate::scanner::ResultSetReader;
use tokio::sync::mpsc;
use ydb_cluster::{Result, YdbError};
use ydb_proto::{ExecuteQueryResult, StreamPart};

/// Materialized result of a data query.
pub struct QueryResult {
    sets: std::vec::IntoIter<ydb_proto::ResultSet>,
    count: usize,
}

impl QueryResult {
    pub fn new(result: ExecuteQueryResult) -> QueryResult {
        let count = result.result_sets.len();
        QueryResult {
            sets: result.result_sets.into_iter(),
            count,
        }
    }

    pub fn result_set_count(&self) -> usize {
        self.count
    }

    /// Advances to the next result set.
    pub fn next_result_set(&mut self) -> Option<ResultSetReader> {
        self.sets.next().map(ResultSetReader::new)
    }

    /// Single-set convenience: the first result set of the response.
    pub fn into_first(mut self) -> Option<ResultSetReader> {
        self.next_result_set()
    }
}

impl std::fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResult")
            .field("result_sets", &self.count)
            .finish()
    }
}

/// Incremental result of a scan query.
pub struct QueryStream {
    receiver: mpsc::UnboundedReceiver<Result<StreamPart>>,
}

impl QueryStream {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<Result<StreamPart>>) -> QueryStream {
        QueryStream { receiver }
    }

    /// Next result set of the stream; `None` when the stream is finished.
    /// Parts carrying a failure status surface as operation errors.
    pub async fn next_result_set(&mut self) -> Option<Result<ResultSetReader>> {
        loop {
            let part = match self.receiver.recv().await? {
                Ok(part) => part,
                Err(err) => return Some(Err(err)),
            };
            if !part.status.is_success() {
                return Some(Err(YdbError::operation(part.status, part.issues)));
            }
            if let Some(set) = part.result_set {
                return Some(Ok(ResultSetReader::new(set)));
            }
            if part.done {
                return None;
            }
        }
    }
}
