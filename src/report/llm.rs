//! Client for an OpenAI-compatible chat-completions endpoint.

use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Anything that turns a prompt into report text.
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Read the API key from a plain-text file, trimming surrounding whitespace.
pub fn read_api_key(path: &Path) -> Result<String> {
    let key = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() != io::ErrorKind::NotFound {
            log::warn!("could not read {}: {e}", path.display());
        }
        Error::CredentialNotFound(path.to_path_buf())
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::CredentialNotFound(path.to_path_buf()));
    }
    Ok(key.to_string())
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

// ---------------------------------------------------------------------------
// ChatClient
// ---------------------------------------------------------------------------

/// Blocking chat-completions client. Requests are sent at temperature 0 so the
/// same prompt gives the same report where the service allows it.
pub struct ChatClient {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: String,
}

impl ChatClient {
    pub fn new(endpoint: &str, model: &str, api_key: String, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key,
        }
    }
}

impl TextGenerator for ChatClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some(prompt.to_string()),
            }],
            temperature: 0.0,
        };

        log::info!("requesting report from {} ({})", self.endpoint, self.model);
        let response = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(&request);

        let response = match response {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                log::error!("service answered {code}: {body}");
                return Err(Error::Service(format!("HTTP {code}: {}", body.trim())));
            }
            Err(e) => return Err(Error::Service(e.to_string())),
        };

        let parsed: ChatResponse = response
            .into_json()
            .map_err(|e| Error::Service(format!("invalid response body: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| Error::Service("response contained no text".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve one request with a canned response; the handle yields the
    /// request headers (lower-cased) and body.
    fn one_shot_server(
        status: &'static str,
        body: &'static str,
    ) -> (String, thread::JoinHandle<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/v1/chat/completions", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut headers = String::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                headers.push_str(&line.to_ascii_lowercase());
            }

            let mut request_body = Vec::new();
            let content_length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse::<usize>().unwrap());
            if let Some(len) = content_length {
                request_body.resize(len, 0);
                reader.read_exact(&mut request_body).unwrap();
            } else if headers.contains("transfer-encoding: chunked") {
                loop {
                    let mut size_line = String::new();
                    reader.read_line(&mut size_line).unwrap();
                    let size = usize::from_str_radix(size_line.trim(), 16).unwrap();
                    let mut chunk = vec![0u8; size + 2];
                    reader.read_exact(&mut chunk).unwrap();
                    if size == 0 {
                        break;
                    }
                    request_body.extend_from_slice(&chunk[..size]);
                }
            }

            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            stream.flush().unwrap();
            (headers, String::from_utf8(request_body).unwrap())
        });
        (url, handle)
    }

    #[test]
    fn test_generate_returns_message_content() {
        let (url, handle) = one_shot_server(
            "200 OK",
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"All devices look fine."}}]}"#,
        );
        let client = ChatClient::new(&url, "test-model", "sk-test".into(), Duration::from_secs(5));
        let text = client.generate("Check VD1").unwrap();
        assert_eq!(text, "All devices look fine.");

        let (headers, request_body) = handle.join().unwrap();
        assert!(headers.contains("authorization: bearer sk-test"), "{headers}");
        let body: serde_json::Value = serde_json::from_str(&request_body).unwrap();
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Check VD1");
    }

    #[test]
    fn test_http_error_is_service_error() {
        let (url, handle) = one_shot_server("401 Unauthorized", r#"{"error":"bad key"}"#);
        let client = ChatClient::new(&url, "m", "wrong".into(), Duration::from_secs(5));
        let err = client.generate("hi").unwrap_err();
        handle.join().unwrap();
        match err {
            Error::Service(msg) => assert!(msg.contains("401"), "{msg}"),
            other => panic!("expected Service error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_choices_is_service_error() {
        let (url, handle) = one_shot_server("200 OK", r#"{"choices":[]}"#);
        let client = ChatClient::new(&url, "m", "k".into(), Duration::from_secs(5));
        assert!(matches!(client.generate("hi"), Err(Error::Service(_))));
        handle.join().unwrap();
    }

    #[test]
    fn test_read_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_key.txt");

        assert!(matches!(read_api_key(&path), Err(Error::CredentialNotFound(_))));

        std::fs::write(&path, "  \n").unwrap();
        assert!(matches!(read_api_key(&path), Err(Error::CredentialNotFound(_))));

        std::fs::write(&path, "sk-abc123\n").unwrap();
        assert_eq!(read_api_key(&path).unwrap(), "sk-abc123");
    }
}
