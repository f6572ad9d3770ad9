/*!
Mock indexing backend for tests without an Elasticsearch node

Records every request the publisher sends and answers from a script.
When the script is empty, documents are "created" and bulk requests
succeed for every item.
*/

use async_trait::async_trait;
use serde_json::Value;
use stats_publisher::{IndexTransport, PublishError, PublishResult, TransportResponse};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Document,
    Bulk,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub kind: RequestKind,
    pub index: Option<String>,
    pub doc_type: Option<String>,
    pub body: String,
}

impl RecordedRequest {
    /// Parsed body: one value for a document request, every line for a bulk request
    pub fn json_lines(&self) -> anyhow::Result<Vec<Value>> {
        self.body
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(Into::into))
            .collect()
    }

    /// Documents of a bulk request, without the action lines
    pub fn bulk_documents(&self) -> anyhow::Result<Vec<Value>> {
        Ok(self.json_lines()?.into_iter().skip(1).step_by(2).collect())
    }

    /// Action lines of a bulk request
    pub fn bulk_actions(&self) -> anyhow::Result<Vec<Value>> {
        Ok(self.json_lines()?.into_iter().step_by(2).collect())
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Respond(TransportResponse),
    Fail(std::io::ErrorKind, String),
}

/// In-memory `IndexTransport` that records requests and replays scripted answers
#[derive(Clone, Default)]
pub struct MockTransport {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    script: Arc<Mutex<VecDeque<Scripted>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw answer for the next request
    pub fn respond_with(&self, status: u16, body: impl Into<String>) -> &Self {
        self.script.lock().unwrap().push_back(Scripted::Respond(TransportResponse {
            status,
            body: body.into(),
        }));
        self
    }

    /// Queue a transport failure (connection refused, timeout...) for the next request
    pub fn fail_with(&self, kind: std::io::ErrorKind, message: impl Into<String>) -> &Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Fail(kind, message.into()));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_of(&self, kind: RequestKind) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.requests.lock().unwrap().clear();
        self.script.lock().unwrap().clear();
    }

    fn answer(&self, request: RecordedRequest) -> PublishResult<TransportResponse> {
        let default = match request.kind {
            RequestKind::Document => TransportResponse {
                status: 201,
                body: crate::fixtures::responses::created(),
            },
            RequestKind::Bulk => {
                let items = request.body.lines().filter(|l| !l.trim().is_empty()).count() / 2;
                TransportResponse {
                    status: 200,
                    body: crate::fixtures::responses::bulk_ok(items),
                }
            }
        };
        self.requests.lock().unwrap().push(request);

        match self.script.lock().unwrap().pop_front() {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(kind, message)) => {
                Err(PublishError::transport(std::io::Error::new(kind, message)))
            }
            None => Ok(default),
        }
    }
}

#[async_trait]
impl IndexTransport for MockTransport {
    async fn index_document(&self, index: &str, doc_type: &str, body: String) -> PublishResult<TransportResponse> {
        self.answer(RecordedRequest {
            kind: RequestKind::Document,
            index: Some(index.to_string()),
            doc_type: Some(doc_type.to_string()),
            body,
        })
    }

    async fn bulk(&self, body: String) -> PublishResult<TransportResponse> {
        self.answer(RecordedRequest {
            kind: RequestKind::Bulk,
            index: None,
            doc_type: None,
            body,
        })
    }
}
