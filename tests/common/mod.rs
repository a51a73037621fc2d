//! In-memory transport used by the executor tests.
//!
//! Replies are scripted up front; once the script runs out the last reply
//! repeats. Every request is recorded and every body handle counts its own
//! creation and release.

#![allow(dead_code)]

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use restexec::transport::{ResponseBody, Transport, TransportError, TransportResponse};
use restexec::{Executor, OutgoingRequest};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One scripted outcome of `Transport::send`.
#[derive(Debug, Clone)]
pub enum Reply {
    Response {
        status: u16,
        headers: Vec<(String, String)>,
        body: String,
        broken_body: bool,
    },
    Refused,
    Timeout,
    Io,
}

impl Reply {
    pub fn status(code: u16) -> Self {
        Reply::Response {
            status: code,
            headers: Vec::new(),
            body: String::new(),
            broken_body: false,
        }
    }

    pub fn ok(body: &str) -> Self {
        Reply::status(200).body(body)
    }

    pub fn rate_limited(retry_after: Option<&str>) -> Self {
        let reply = Reply::status(429).body("slow down");
        match retry_after {
            Some(value) => reply.header("retry-after", value),
            None => reply,
        }
    }

    pub fn body(mut self, text: &str) -> Self {
        if let Reply::Response { body, .. } = &mut self {
            *body = text.to_string();
        }
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let Reply::Response { headers, .. } = &mut self {
            headers.push((name.to_string(), value.to_string()));
        }
        self
    }

    pub fn broken_body(mut self) -> Self {
        if let Reply::Response { broken_body, .. } = &mut self {
            *broken_body = true;
        }
        self
    }
}

#[derive(Debug, Default)]
pub struct BodyCounters {
    opened: AtomicUsize,
    released: AtomicUsize,
}

/// Body handle that records its release on drop.
#[derive(Debug)]
pub struct FakeBody {
    text: String,
    broken: bool,
    counters: Arc<BodyCounters>,
}

impl FakeBody {
    fn new(text: String, broken: bool, counters: Arc<BodyCounters>) -> Self {
        counters.opened.fetch_add(1, Ordering::SeqCst);
        Self {
            text,
            broken,
            counters,
        }
    }
}

impl Drop for FakeBody {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl ResponseBody for FakeBody {
    async fn read_to_string(mut self) -> Result<String, TransportError> {
        if self.broken {
            let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "stream cut");
            return Err(TransportError::Io(Box::new(eof)));
        }
        Ok(std::mem::take(&mut self.text))
    }
}

#[derive(Debug)]
pub struct FakeTransport {
    script: Mutex<VecDeque<Reply>>,
    last: Mutex<Option<Reply>>,
    requests: Mutex<Vec<OutgoingRequest>>,
    counters: Arc<BodyCounters>,
}

impl FakeTransport {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            counters: Arc::new(BodyCounters::default()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<OutgoingRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> Reply {
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = self.script.lock().unwrap().pop_front() {
            *last = Some(reply);
        }
        last.clone().expect("FakeTransport needs at least one reply")
    }
}

impl Transport for FakeTransport {
    type Body = FakeBody;

    async fn send(
        &self,
        request: OutgoingRequest,
    ) -> Result<TransportResponse<FakeBody>, TransportError> {
        self.requests.lock().unwrap().push(request);

        match self.next_reply() {
            Reply::Response {
                status,
                headers,
                body,
                broken_body,
            } => {
                let mut header_map = HeaderMap::new();
                for (name, value) in headers {
                    header_map.append(
                        HeaderName::try_from(name).unwrap(),
                        HeaderValue::try_from(value).unwrap(),
                    );
                }
                Ok(TransportResponse {
                    status: StatusCode::from_u16(status).unwrap(),
                    headers: header_map,
                    body: FakeBody::new(body, broken_body, Arc::clone(&self.counters)),
                })
            }
            Reply::Refused => {
                let refused =
                    std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
                Err(TransportError::Connection(Box::new(refused)))
            }
            Reply::Timeout => Err(TransportError::Timeout),
            Reply::Io => {
                let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
                Err(TransportError::Io(Box::new(reset)))
            }
        }
    }
}

pub fn executor(replies: Vec<Reply>) -> Executor<FakeTransport> {
    Executor::new(FakeTransport::new(replies))
}

pub const URL: &str = "https://api.example.com/2.0/repositories/acme/core";
