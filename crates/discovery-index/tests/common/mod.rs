//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use discovery_index::embeddings::{EmbeddingError, EmbeddingHealth, EmbeddingProvider};

/// A request seen by [`FakeServer`].
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// How the fake server answers a request.
pub enum Reply {
    Json(u16, String),
    /// Never answer
    Hang,
}

/// Minimal HTTP/1.1 server on a random local port.
pub struct FakeServer {
    pub url: String,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Recorded) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(handler);

        let seen = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let handler = handler.clone();
                let seen = seen.clone();
                tokio::spawn(async move {
                    serve(stream, handler.as_ref(), &seen).await;
                });
            }
        });

        Self { url, requests }
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve<F>(mut stream: TcpStream, handler: &F, seen: &Mutex<Vec<Recorded>>)
where
    F: Fn(&Recorded) -> Reply,
{
    let Some(request) = read_request(&mut stream).await else {
        return;
    };
    seen.lock().unwrap().push(request.clone());

    match handler(&request) {
        Reply::Json(status, body) => {
            let response = format!(
                "HTTP/1.1 {} Fake\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
        Reply::Hang => {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let content_length = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();
    Some(Recorded { method, path, body })
}

/// JSON body of an embeddings reply with `dims` values.
pub fn embedding_body(dims: usize) -> String {
    let values: Vec<String> = (0..dims).map(|i| format!("{}", i as f32 / 10.0)).collect();
    format!("{{\"embedding\": [{}]}}", values.join(", "))
}

/// Deterministic bag-of-words embedder.
///
/// Each word is hashed into one of `dims` buckets, so texts sharing words
/// point in similar directions.
pub struct KeywordEmbedder {
    dims: usize,
    healthy: AtomicBool,
    online: AtomicBool,
    fail_containing: Option<String>,
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            healthy: AtomicBool::new(true),
            online: AtomicBool::new(true),
            fail_containing: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail any text containing `needle`.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_containing = Some(needle.to_string());
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Simulate the server going away: health stays as set, embeds fail.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
                % self.dims;
            vector[bucket] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.online.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Connection {
                url: "http://127.0.0.1:9".to_string(),
                message: "connection refused".to_string(),
            });
        }
        if let Some(needle) = &self.fail_containing {
            if text.contains(needle.as_str()) {
                return Err(EmbeddingError::Http {
                    status: 500,
                    snippet: "model crashed".to_string(),
                });
            }
        }
        Ok(self.vector_for(text))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "keyword-test"
    }

    async fn health(&self) -> EmbeddingHealth {
        let healthy = self.healthy.load(Ordering::SeqCst);
        EmbeddingHealth {
            server_reachable: healthy,
            model_available: healthy,
            available_models: vec!["keyword-test".to_string()],
            message: if healthy {
                "ok".to_string()
            } else {
                "Cannot reach embedding service. Start it with `ollama serve`".to_string()
            },
        }
    }
}

pub fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// A small React/TypeScript project.
pub fn sample_project(root: &Path) {
    write(
        root,
        "src/contacts/ContactList.tsx",
        r#"import React, { useState } from 'react';

export interface ContactListProps {
  title: string;
  pageSize: number;
}

export const ContactList = ({ title }: ContactListProps) => {
  const [selected, setSelected] = useState<string | null>(null);
  return <ul title={title}>contact list of customers</ul>;
};
"#,
    );
    write(
        root,
        "src/contacts/useContactFilter.ts",
        r#"import { useListContext } from 'react-admin';

export function useContactFilter(query: string) {
  const { filterValues } = useListContext();
  return { ...filterValues, q: query };
}
"#,
    );
    write(
        root,
        "src/deals/DealCard.tsx",
        r#"export type A = B;

export function DealCard({ amount }: { amount: number }) {
  return <div className="deal">{amount} deal amount</div>;
}
"#,
    );
    write(
        root,
        "src/utils/format.ts",
        r#"export function formatCurrency(value: number): string {
  return new Intl.NumberFormat('en-US').format(value);
}
"#,
    );
    write(root, "node_modules/lib/index.js", "export function ignored() { return 1; }\n");
}

pub fn source_globs() -> (Vec<String>, Vec<String>) {
    (
        vec!["src/**/*.ts".to_string(), "src/**/*.tsx".to_string()],
        vec!["**/*.test.ts".to_string()],
    )
}
