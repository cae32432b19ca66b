//! In-process HTTP server for tests.

use std::thread;
use tiny_http::{Response, Server, StatusCode};

/// A canned route: request path (including query), status code, body.
pub type Route = (&'static str, u16, Vec<u8>);

/// Serves fixed responses on a random local port until the test process exits.
pub struct TestServer {
    pub url: String,
}

impl TestServer {
    pub fn start(routes: Vec<Route>) -> Self {
        let server = Server::http("127.0.0.1:0").expect("bind test server");
        let port = server
            .server_addr()
            .to_ip()
            .expect("test server listens on an ip address")
            .port();

        thread::spawn(move || {
            for request in server.incoming_requests() {
                let response = match routes.iter().find(|(path, ..)| *path == request.url()) {
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
        }
    }
}
