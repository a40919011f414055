use thiserror::Error;

use super::types::{
    RequestBeginEvent, RequestId, RequestInfo, RequestProgress, RequestProgressEvent,
};

/// Keep track of every segment request currently pending.
#[derive(Default)]
pub struct PendingRequestsStore {
    /// Pending requests, in the order in which they were added.
    requests: Vec<RequestInfo>,
}

impl PendingRequestsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending request.
    ///
    /// A request re-using the id of a pending one replaces it.
    pub fn add(&mut self, evt: RequestBeginEvent) {
        let request = RequestInfo {
            id: evt.id,
            request_timestamp: evt.request_timestamp,
            content: evt.content,
            progress: vec![],
        };
        match self.requests.iter_mut().find(|r| r.id == request.id) {
            Some(existing) => *existing = request,
            None => self.requests.push(request),
        }
    }

    /// Add progress information to a pending request.
    pub fn add_progress(&mut self, evt: RequestProgressEvent) -> Result<(), PendingRequestError> {
        match self.requests.iter_mut().find(|r| r.id == evt.id) {
            None => Err(PendingRequestError::UnknownRequest { id: evt.id }),
            Some(request) => {
                request.progress.push(RequestProgress {
                    timestamp: evt.timestamp,
                    size: evt.size,
                    total_size: evt.total_size,
                });
                Ok(())
            }
        }
    }

    /// Remove a request once it is finished.
    pub fn remove(&mut self, id: &str) -> Result<(), PendingRequestError> {
        match self.requests.iter().position(|r| r.id == id) {
            None => Err(PendingRequestError::UnknownRequest { id: id.to_owned() }),
            Some(idx) => {
                self.requests.remove(idx);
                Ok(())
            }
        }
    }

    /// Returns every pending request, sorted by ascending segment start time.
    ///
    /// Requests for segments with the same start time are sorted by ascending request time, then
    /// by insertion order.
    pub fn get_requests(&self) -> Vec<&RequestInfo> {
        let mut requests: Vec<&RequestInfo> = self.requests.iter().collect();
        requests.sort_by(|a, b| {
            a.content
                .segment
                .time
                .total_cmp(&b.content.segment.time)
                .then(a.request_timestamp.total_cmp(&b.request_timestamp))
        });
        requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum PendingRequestError {
    #[error("No pending request found with the id \"{id}\"")]
    UnknownRequest { id: RequestId },
}
