//! Helpers shared by the command tests.

use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};
use std::thread;
use tiny_http::{Response, Server, StatusCode};

/// A canned route: request path (including query), status code, body.
pub type Route = (String, u16, Vec<u8>);

/// Serves fixed responses on a random local port and records request paths.
pub struct TestServer {
    pub url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub fn start<P: Into<String>>(routes: Vec<(P, u16, Vec<u8>)>) -> Self {
        let routes: Vec<Route> = routes
            .into_iter()
            .map(|(path, status, body)| (path.into(), status, body))
            .collect();
        let server = Server::http("127.0.0.1:0").expect("bind test server");
        let port = server
            .server_addr()
            .to_ip()
            .expect("test server listens on an ip address")
            .port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        thread::spawn(move || {
            for request in server.incoming_requests() {
                seen.lock().unwrap().push(request.url().to_string());
                let response = match routes.iter().find(|(path, ..)| path == request.url()) {
                    Some((_, status, body)) => {
                        Response::from_data(body.clone()).with_status_code(StatusCode(*status))
                    }
                    None => Response::from_data(b"not found".to_vec())
                        .with_status_code(StatusCode(404)),
                };
                let _ = request.respond(response);
            }
        });

        Self {
            url: format!("http://127.0.0.1:{port}"),
            requests,
        }
    }

    /// Paths requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
