//! In-process fake router used by the unit tests.
//!
//! Runs an axum server on its own tokio runtime thread so the blocking client
//! can talk to it from ordinary `#[test]` functions. The fake enforces the
//! same contract as the firmware: session cookie, rolling verification token
//! and a real client-proof check.

use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde::Deserialize;
use tokio::sync::oneshot;

use crate::auth::compute_client_proof;
use crate::xml;

pub const SESSION_COOKIE: &str = "SessionID=mock-session";

const TOKEN_HEADER: HeaderName = HeaderName::from_static("__requestverificationtoken");

pub const SIGNAL_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<response>\n<pci>43</pci>\n<cell_id>44294436</cell_id>\n<rsrq>-14dB</rsrq>\n<rsrp>-86dBm</rsrp>\n<rssi>-61dBm</rssi>\n<sinr>10dB</sinr>\n<mode>7</mode>\n<ulbandwidth>15MHz</ulbandwidth>\n<dlbandwidth>15MHz</dlbandwidth>\n<txpower>PPusch:8dBm PPucch:-5dBm PSrs:0dBm PPrach:-4dBm</txpower>\n<earfcn>DL:3025 UL:21025</earfcn>\n<band>7</band>\n</response>\n";

/// Behaviour of the fake router.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub username: String,
    pub password: String,
    /// Body of `/api/webserver/token`; empty means the `<token>` element is omitted.
    pub anonymous_token: String,
    /// Token header on the challenge response (client keeps the first 32 chars).
    pub challenge_token: Option<String>,
    /// Token header on the authentication response.
    pub login_token: Option<String>,
    pub iterations: u32,
    pub salt: String,
    pub server_nonce_suffix: String,
    pub signal_body: String,
    pub control_status: StatusCode,
    pub control_body: String,
    /// Token header on the control response.
    pub control_token: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            username: "admin".into(),
            password: "pass".into(),
            anonymous_token: "TJECW4tvlJ2fGiClXMwew8wiGWRKlabcS7xTD7LGjRhXAtLCQRYWUKc5YdaRuzJJ".into(),
            challenge_token: Some(
                "5f3c1b8a9e2d4c7f8a1b2c3d4e5f6a7bIGNOREDIGNOREDIGNOREDIGNOREDXXXX".into(),
            ),
            login_token: Some("25ae2067cf278b183daab21a32d133e5".into()),
            iterations: 100,
            salt: "fd4b1e6ad1b05db6ff288928fed3005ef4fdc9ade8be276220a8f41adcccda29".into(),
            server_nonce_suffix: "Lpcw0a320YeprpYH8kURAUwfyTbYtHUA".into(),
            signal_body: SIGNAL_XML.into(),
            control_status: StatusCode::OK,
            control_body: "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<response>OK</response>\n"
                .into(),
            control_token: None,
        }
    }
}

/// A request as seen by the fake router.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub token: Option<String>,
    pub cookie: Option<String>,
    pub content_type: Option<String>,
    pub content_length: Option<String>,
    pub body: String,
}

#[derive(Default)]
struct DeviceState {
    requests: Vec<Recorded>,
    client_nonce: Option<String>,
    logged_in: bool,
}

#[derive(Clone)]
struct Shared {
    config: Arc<DeviceConfig>,
    state: Arc<Mutex<DeviceState>>,
}

pub struct MockDevice {
    url: String,
    state: Arc<Mutex<DeviceState>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockDevice {
    pub fn start(config: DeviceConfig) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind mock device");
        listener.set_nonblocking(true).expect("set nonblocking");
        let url = format!("http://{}", listener.local_addr().expect("local addr"));

        let state = Arc::new(Mutex::new(DeviceState::default()));
        let shared = Shared {
            config: Arc::new(config),
            state: Arc::clone(&state),
        };
        let app = Router::new().fallback(handle).with_state(shared);
        let (tx, rx) = oneshot::channel::<()>();

        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("mock device runtime");
            rt.block_on(async move {
                let listener =
                    tokio::net::TcpListener::from_std(listener).expect("tokio listener");
                axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = rx.await;
                    })
                    .await
                    .expect("mock device server");
            });
        });

        Self {
            url,
            state,
            shutdown: Some(tx),
        }
    }

    /// Base URL, e.g. `http://127.0.0.1:41234`.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn header(headers: &HeaderMap, name: impl axum::http::header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ChallengeLoginBody {
    username: String,
    firstnonce: String,
    mode: u8,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct AuthenticationLoginBody {
    clientproof: String,
    finalnonce: String,
}

fn xml_response(status: StatusCode, token: Option<&str>, body: String) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
    if let Some(t) = token {
        headers.insert(TOKEN_HEADER, HeaderValue::from_str(t).expect("token header"));
    }
    (status, headers, body).into_response()
}

/// Firmware "format error" for request bodies that are not `<request>` XML.
const FORMAT_ERROR: u32 = 100005;

fn error_doc(code: u32) -> String {
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<error>\n<code>{code}</code>\n<message></message>\n</error>\n")
}

async fn handle(
    State(shared): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = String::from_utf8_lossy(&body).into_owned();
    let recorded = Recorded {
        method: method.to_string(),
        path: uri.path().to_string(),
        token: header(&headers, TOKEN_HEADER),
        cookie: header(&headers, COOKIE),
        content_type: header(&headers, CONTENT_TYPE),
        content_length: header(&headers, CONTENT_LENGTH),
        body: body.clone(),
    };
    let has_cookie = recorded
        .cookie
        .as_deref()
        .is_some_and(|c| c.contains(SESSION_COOKIE));
    let sent_token = recorded.token.clone();

    let config = &shared.config;
    let mut state = shared.state.lock().unwrap();
    state.requests.push(recorded);

    match (method.as_str(), uri.path()) {
        ("GET", "/") => {
            let mut headers = HeaderMap::new();
            headers.insert(SET_COOKIE, HeaderValue::from_static("SessionID=mock-session; path=/"));
            (StatusCode::OK, headers, "<html></html>").into_response()
        }
        ("GET", "/api/webserver/token") => {
            let inner = if config.anonymous_token.is_empty() {
                String::new()
            } else {
                format!("<token>{}</token>", config.anonymous_token)
            };
            xml_response(
                StatusCode::OK,
                None,
                format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?><response>{inner}</response>"),
            )
        }
        ("POST", "/api/user/challenge_login") => {
            let Ok(request) = xml::decode::<ChallengeLoginBody>(&body, "challenge login")
            else {
                return xml_response(StatusCode::OK, None, error_doc(FORMAT_ERROR));
            };
            if request.username != config.username || request.mode != 1 {
                return xml_response(StatusCode::OK, None, error_doc(108006));
            }
            let nonce = request.firstnonce;
            state.client_nonce = Some(nonce.clone());
            xml_response(
                StatusCode::OK,
                config.challenge_token.as_deref(),
                format!(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\"?><response><iterations>{}</iterations><servernonce>{nonce}{}</servernonce><modeselected>1</modeselected><salt>{}</salt><newType>0</newType></response>",
                    config.iterations, config.server_nonce_suffix, config.salt
                ),
            )
        }
        ("POST", "/api/user/authentication_login") => {
            let Ok(request) =
                xml::decode::<AuthenticationLoginBody>(&body, "authentication login")
            else {
                return xml_response(StatusCode::BAD_REQUEST, None, error_doc(FORMAT_ERROR));
            };
            let client_nonce = state.client_nonce.clone().unwrap_or_default();
            let expected = compute_client_proof(
                &config.password,
                &client_nonce,
                config.iterations,
                &request.finalnonce,
                &config.salt,
            )
            .ok();
            if expected.as_deref() != Some(request.clientproof.as_str()) {
                return xml_response(StatusCode::UNAUTHORIZED, None, error_doc(108006));
            }
            state.logged_in = true;
            xml_response(
                StatusCode::OK,
                config.login_token.as_deref(),
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?><response><serversignature>0ad0937ab319b6cc</serversignature></response>".into(),
            )
        }
        ("GET", "/api/device/signal") => {
            if !state.logged_in || !has_cookie {
                return xml_response(StatusCode::OK, None, error_doc(125002));
            }
            xml_response(StatusCode::OK, None, config.signal_body.clone())
        }
        ("POST", "/api/device/control") => {
            if !state.logged_in || !has_cookie || sent_token != config.login_token {
                return xml_response(StatusCode::OK, None, error_doc(125002));
            }
            xml_response(
                config.control_status,
                config.control_token.as_deref(),
                config.control_body.clone(),
            )
        }
        _ => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_challenge_body_is_format_error() {
        let device = MockDevice::start(DeviceConfig::default());
        let body = reqwest::blocking::Client::builder()
            .no_proxy()
            .build()
            .unwrap()
            .post(format!("{}/api/user/challenge_login", device.url()))
            .body("<request><username>admin</request>")
            .send()
            .unwrap()
            .text()
            .unwrap();
        assert_eq!(
            xml::error_document(&body).map(|d| d.code),
            Some(i64::from(FORMAT_ERROR))
        );
    }

    #[test]
    fn test_challenge_body_fields_are_decoded() {
        let request: ChallengeLoginBody = xml::decode(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<request><username>admin</username><firstnonce>abc</firstnonce><mode>1</mode></request>",
            "challenge login",
        )
        .unwrap();
        assert_eq!(request.username, "admin");
        assert_eq!(request.firstnonce, "abc");
        assert_eq!(request.mode, 1);
    }
}
