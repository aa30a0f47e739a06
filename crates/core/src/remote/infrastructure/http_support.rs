use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::blocking::{Client, Response};

use crate::remote::domain::client_error::ClientError;

/// Blocking client with one timeout covering connect, send and body read.
pub fn build_client(timeout: Duration) -> Result<Client, ClientError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(transport_error)
}

/// Flattens a reqwest error and its source chain into one line.
pub fn transport_error(err: reqwest::Error) -> ClientError {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    ClientError::Transport(message)
}

/// Reads status and body. An unreadable body is a transport failure.
pub fn read_response(response: Response) -> Result<(u16, String), ClientError> {
    let status = response.status().as_u16();
    let body = response.text().map_err(transport_error)?;
    Ok((status, body))
}

/// Like [`read_response`] but non-2xx statuses become [`ClientError::Status`].
pub fn read_success(response: Response) -> Result<String, ClientError> {
    let (status, body) = read_response(response)?;
    if (200..300).contains(&status) {
        Ok(body)
    } else {
        Err(ClientError::Status { status, body })
    }
}

/// `data:image/jpeg;base64,...` form expected by the recognition service.
pub fn jpeg_data_uri(image: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(image))
}

pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
pub(crate) mod test_server {
    //! Minimal HTTP/1.1 responder for exercising the clients.
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub method: String,
        pub path: String,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl RecordedRequest {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }

        pub fn body_text(&self) -> String {
            String::from_utf8_lossy(&self.body).into_owned()
        }
    }

    /// Serves one canned `(status, body)` per connection, in order, then
    /// returns everything it received.
    pub fn serve(responses: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<RecordedRequest>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let mut recorded = Vec::new();
            for (status, body) in responses {
                let (stream, _) = listener.accept().unwrap();
                recorded.push(handle_one(stream, status, body));
            }
            recorded
        });
        (url, handle)
    }

    /// An address nothing listens on.
    pub fn refused_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        url
    }

    fn handle_one(stream: TcpStream, status: u16, body: &str) -> RecordedRequest {
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default().to_string();
        let path = parts.next().unwrap_or_default().to_string();

        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((k, v)) = line.split_once(':') {
                headers.push((k.trim().to_string(), v.trim().to_string()));
            }
        }

        let find = |name: &str| {
            headers
                .iter()
                .find(|(k, _): &&(String, String)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        };
        let body_in = if let Some(len) = find("content-length") {
            let mut buf = vec![0u8; len.parse().unwrap()];
            reader.read_exact(&mut buf).unwrap();
            buf
        } else if find("transfer-encoding").is_some_and(|v| v.contains("chunked")) {
            read_chunked(&mut reader)
        } else {
            Vec::new()
        };

        let reply = format!(
            "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let mut stream = stream;
        stream.write_all(reply.as_bytes()).unwrap();
        stream.flush().unwrap();

        RecordedRequest {
            method,
            path,
            headers,
            body: body_in,
        }
    }

    fn read_chunked(reader: &mut impl BufRead) -> Vec<u8> {
        let mut body = Vec::new();
        loop {
            let mut size_line = String::new();
            reader.read_line(&mut size_line).unwrap();
            let size = usize::from_str_radix(size_line.trim(), 16).unwrap_or(0);
            let mut chunk = vec![0u8; size + 2];
            reader.read_exact(&mut chunk).unwrap();
            if size == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..size]);
        }
        body
    }
}
