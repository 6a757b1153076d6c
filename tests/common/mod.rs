#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use epic_free_games_lambda_rust::retry::RetryPolicy;
use serde_json::{json, Value};

/// Canned HTTP response.
#[derive(Clone, Debug)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Reply {
    pub fn status(status: u16) -> Self {
        Self { status, headers: Vec::new(), body: String::new() }
    }

    pub fn json(status: u16, body: &Value) -> Self {
        Self { status, headers: Vec::new(), body: body.to_string() }
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Self { status, headers: Vec::new(), body: body.to_string() }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Clone, Debug)]
pub struct Recorded {
    pub request_line: String,
    pub body: String,
}

/// Single-threaded HTTP/1.1 server replaying `script` in order; the last reply repeats.
pub struct FakeServer {
    pub url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeServer {
    pub fn start(script: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake server");
        let addr = listener.local_addr().expect("local addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);

        thread::spawn(move || {
            let mut served = 0usize;
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let Ok(read_half) = stream.try_clone() else { continue };
                let mut reader = BufReader::new(read_half);

                let mut request_line = String::new();
                if reader.read_line(&mut request_line).is_err() {
                    continue;
                }
                let mut content_length = 0usize;
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap_or(0) == 0 {
                        break;
                    }
                    let line = line.trim_end();
                    if line.is_empty() {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse().unwrap_or(0);
                        }
                    }
                }
                let mut body = vec![0u8; content_length];
                let _ = reader.read_exact(&mut body);

                recorded.lock().unwrap().push(Recorded {
                    request_line: request_line.trim_end().to_string(),
                    body: String::from_utf8_lossy(&body).into_owned(),
                });

                let reply = script
                    .get(served)
                    .or_else(|| script.last())
                    .cloned()
                    .unwrap_or_else(|| Reply::status(500));
                served += 1;

                let mut head = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                    reply.status,
                    reason(reply.status),
                    reply.body.len()
                );
                for (name, value) in &reply.headers {
                    head.push_str(&format!("{name}: {value}\r\n"));
                }
                head.push_str("\r\n");
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(reply.body.as_bytes());
                let _ = stream.flush();
            }
        });

        Self { url: format!("http://{addr}/"), requests }
    }

    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    /// `content` fields of the JSON bodies posted so far.
    pub fn posted_contents(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| {
                let body: Value = serde_json::from_str(&r.body).expect("posted body is JSON");
                body["content"].as_str().expect("content field").to_string()
            })
            .collect()
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        401 => "Unauthorized",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

/// Retry policy with millisecond waits so tests stay fast.
pub fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        max_retry_after: Duration::from_millis(50),
    }
}

pub fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// A single catalog element with one free window in the given list.
pub fn element(title: &str, id: &str, current: &[(DateTime<Utc>, DateTime<Utc>)], upcoming: &[(DateTime<Utc>, DateTime<Utc>)]) -> Value {
    let group = |windows: &[(DateTime<Utc>, DateTime<Utc>)]| -> Value {
        if windows.is_empty() {
            return json!([]);
        }
        let offers: Vec<Value> = windows
            .iter()
            .map(|(start, end)| {
                json!({
                    "startDate": ts(*start),
                    "endDate": ts(*end),
                    "discountSetting": { "discountType": "PERCENTAGE", "discountPercentage": 0 }
                })
            })
            .collect();
        json!([{ "promotionalOffers": offers }])
    };

    json!({
        "title": title,
        "id": id,
        "namespace": "ns",
        "description": format!("{title} description."),
        "keyImages": [ { "type": "Thumbnail", "url": format!("https://cdn.example/{id}.jpg") } ],
        "seller": { "name": "Test Publisher" },
        "productSlug": id,
        "price": { "totalPrice": { "originalPrice": 1000, "discountPrice": 0 } },
        "promotions": {
            "promotionalOffers": group(current),
            "upcomingPromotionalOffers": group(upcoming)
        }
    })
}

pub fn payload(elements: Vec<Value>) -> Value {
    json!({ "data": { "Catalog": { "searchStore": { "elements": elements } } }, "extensions": {} })
}

pub fn sample_payload() -> Value {
    serde_json::from_str(include_str!("../free_games_promotions.json")).expect("fixture parses")
}
