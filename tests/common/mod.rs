// Common test utilities for integration tests
// A scripted in-memory backend, message/contact fixtures and a tiny HTTP server.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use log::LevelFilter;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use tenant_chat::messaging::MessagesApi;
use tenant_chat::models::{Contact, Message, MessageStatus, SendMessageRequest, UserRef};
use tenant_chat::MessagingError;

static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

pub const ME: &str = "tenant-1";

pub fn contact(id: &str, name: &str, unread: Option<u32>) -> Contact {
    let mut contact = Contact::new(id, name);
    contact.unread_messages_count = unread;
    contact
}

/// Message created `minute` minutes past 10:00 on a fixed day
pub fn message(id: &str, from: &str, to: &str, minute: u32, status: MessageStatus) -> Message {
    Message {
        public_id: id.to_string(),
        message: format!("message {}", id),
        status,
        user_from: UserRef::new(from),
        user_to: UserRef::new(to),
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap(),
    }
}

/// In-memory backend with call counters and optional gates that hold a call until released
pub struct StubApi {
    conversations: Mutex<Result<Vec<Contact>, MessagingError>>,
    conversation_script: Mutex<VecDeque<(Option<Arc<Notify>>, Result<Vec<Contact>, MessagingError>)>>,
    threads: Mutex<HashMap<String, Result<Vec<Message>, MessagingError>>>,
    thread_gates: Mutex<HashMap<String, Arc<Notify>>>,
    send_result: Mutex<Option<Result<Message, MessagingError>>>,
    send_gate: Mutex<Option<Arc<Notify>>>,
    mark_read_result: Mutex<Result<(), MessagingError>>,
    conversation_calls: AtomicUsize,
    thread_calls: AtomicUsize,
    send_requests: Mutex<Vec<SendMessageRequest>>,
    mark_read_calls: Mutex<Vec<String>>,
}

impl StubApi {
    pub fn new() -> Arc<Self> {
        Arc::new(StubApi {
            conversations: Mutex::new(Ok(Vec::new())),
            conversation_script: Mutex::new(VecDeque::new()),
            threads: Mutex::new(HashMap::new()),
            thread_gates: Mutex::new(HashMap::new()),
            send_result: Mutex::new(None),
            send_gate: Mutex::new(None),
            mark_read_result: Mutex::new(Ok(())),
            conversation_calls: AtomicUsize::new(0),
            thread_calls: AtomicUsize::new(0),
            send_requests: Mutex::new(Vec::new()),
            mark_read_calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_conversations(&self, result: Result<Vec<Contact>, MessagingError>) {
        *self.conversations.lock().unwrap() = result;
    }

    /// Queue a one-shot answer for the next conversations call, optionally held by a gate
    pub fn script_conversations(&self, result: Result<Vec<Contact>, MessagingError>) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.conversation_script
            .lock()
            .unwrap()
            .push_back((Some(gate.clone()), result));
        gate
    }

    pub fn set_thread(&self, contact_id: &str, result: Result<Vec<Message>, MessagingError>) {
        self.threads.lock().unwrap().insert(contact_id.to_string(), result);
    }

    /// Hold the next thread call for `contact_id` until the returned gate is notified
    pub fn gate_thread(&self, contact_id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.thread_gates
            .lock()
            .unwrap()
            .insert(contact_id.to_string(), gate.clone());
        gate
    }

    pub fn set_send_result(&self, result: Result<Message, MessagingError>) {
        *self.send_result.lock().unwrap() = Some(result);
    }

    /// Hold the next send until the returned gate is notified
    pub fn gate_send(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.send_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn set_mark_read_result(&self, result: Result<(), MessagingError>) {
        *self.mark_read_result.lock().unwrap() = result;
    }

    pub fn conversation_calls(&self) -> usize {
        self.conversation_calls.load(Ordering::SeqCst)
    }

    pub fn thread_calls(&self) -> usize {
        self.thread_calls.load(Ordering::SeqCst)
    }

    pub fn send_calls(&self) -> usize {
        self.send_requests.lock().unwrap().len()
    }

    pub fn send_requests(&self) -> Vec<SendMessageRequest> {
        self.send_requests.lock().unwrap().clone()
    }

    pub fn mark_read_calls(&self) -> Vec<String> {
        self.mark_read_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagesApi for StubApi {
    async fn my_conversations(&self, _user_id: &str) -> Result<Vec<Contact>, MessagingError> {
        self.conversation_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.conversation_script.lock().unwrap().pop_front();
        match scripted {
            Some((gate, result)) => {
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                result
            }
            None => self.conversations.lock().unwrap().clone(),
        }
    }

    async fn messages_with(&self, _user_id: &str, contact_id: &str) -> Result<Vec<Message>, MessagingError> {
        self.thread_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.thread_gates.lock().unwrap().remove(contact_id);
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.threads
            .lock()
            .unwrap()
            .get(contact_id)
            .cloned()
            .unwrap_or_else(|| Err(MessagingError::NotFound(format!("no user {}", contact_id))))
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message, MessagingError> {
        self.send_requests.lock().unwrap().push(request.clone());
        let gate = self.send_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let scripted = self.send_result.lock().unwrap().clone();
        scripted.unwrap_or_else(|| {
            let mut sent = message("sent-1", &request.user_from_id, &request.user_to_id, 59, MessageStatus::Sent);
            sent.message = request.message.clone();
            Ok(sent)
        })
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), MessagingError> {
        self.mark_read_calls.lock().unwrap().push(message_id.to_string());
        self.mark_read_result.lock().unwrap().clone()
    }
}

/// One request as the fake backend saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Minimal HTTP/1.1 server answering each connection with the next canned response
pub struct FakeBackend {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl FakeBackend {
    pub async fn start(responses: Vec<(u16, &str)>) -> FakeBackend {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let mut responses: VecDeque<(u16, String)> = responses
            .into_iter()
            .map(|(status, body)| (status, body.to_string()))
            .collect();

        let recorded = requests.clone();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => break,
                };
                let request = match read_request(&mut socket).await {
                    Some(request) => request,
                    None => continue,
                };
                recorded.lock().unwrap().push(request);

                let (status, body) = responses
                    .pop_front()
                    .unwrap_or((500, r#"{"message":"no canned response"}"#.to_string()));
                let response = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        FakeBackend {
            base_url: format!("http://{}", address),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<RecordedRequest> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = find_subsequence(&buffer, b"\r\n\r\n") {
            break pos;
        }
        let read = socket.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..read]);
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = header_end + 4;
    while buffer.len() < body_start + content_length {
        let read = socket.read(&mut chunk).await.ok()?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
    let body_end = buffer.len().min(body_start + content_length);
    let body = String::from_utf8_lossy(&buffer[body_start..body_end]).to_string();

    Some(RecordedRequest {
        method,
        path,
        headers,
        body,
    })
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}
