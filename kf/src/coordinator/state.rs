//! Exposed fetch state handed to the host

use crate::entry::Status;
use crate::error::FetchError;

/// What a consumer shows: the last value, whether a fetch is running, and the last error
///
/// `data` survives a new fetch starting and a later rejection; only a successful
/// settlement replaces it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchState<V> {
    pub data: Option<V>,
    pub is_loading: bool,
    pub error: Option<FetchError>,
    pub status: Status,
}

impl<V> Default for FetchState<V> {
    fn default() -> Self {
        Self {
            data: None,
            is_loading: false,
            error: None,
            status: Status::Idle,
        }
    }
}

impl<V> FetchState<V> {
    pub(crate) fn begin(&mut self) {
        self.is_loading = true;
        self.status = Status::Pending;
        self.error = None;
    }

    pub(crate) fn resolve(&mut self, value: V) {
        self.data = Some(value);
        self.error = None;
        self.status = Status::Resolved;
        self.is_loading = false;
    }

    pub(crate) fn reject(&mut self, err: FetchError) {
        self.error = Some(err);
        self.status = Status::Rejected;
        self.is_loading = false;
    }

    pub(crate) fn settle(&mut self, outcome: Result<V, FetchError>) {
        match outcome {
            Ok(value) => self.resolve(value),
            Err(err) => self.reject(err),
        }
    }

    /// True once the latest fetch resolved or rejected
    pub fn is_settled(&self) -> bool {
        matches!(self.status, Status::Resolved | Status::Rejected)
    }
}
