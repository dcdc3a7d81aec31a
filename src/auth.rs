//! SCRAM-style login handshake.
//!
//! The firmware login is a four-step exchange:
//!
//! ```text
//! GET  /                             : collect session cookies
//! GET  /api/webserver/token          : anonymous token, second half is used
//! POST /api/user/challenge_login     : send client nonce, get salt/iterations
//! POST /api/user/authentication_login: send client proof
//! ```
//!
//! Every POST carries the rolling `__requestverificationtoken` header. Each
//! step takes the current [`VerificationToken`] by value and hands back the
//! next one, so a stale token can never be reused by accident.
//!
//! The challenge response returns a 64-char token of which only the first 32
//! characters are valid, while the authentication response returns the token
//! that must be used verbatim. This asymmetry is a firmware quirk.

use std::fmt;

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Error, HandshakeStep, Result};
use crate::xml;

/// Header carrying the rolling verification token (matched case-insensitively).
pub const TOKEN_HEADER: &str = "__requestverificationtoken";

pub(crate) const TOKEN_PATH: &str = "/api/webserver/token";
pub(crate) const CHALLENGE_LOGIN_PATH: &str = "/api/user/challenge_login";
pub(crate) const AUTHENTICATION_LOGIN_PATH: &str = "/api/user/authentication_login";

/// Content type the firmware expects on login requests.
const LOGIN_CONTENT_TYPE: &str = "text/html";

/// Length of the token returned by `/api/webserver/token`.
const ANONYMOUS_TOKEN_LEN: usize = 64;

/// Usable prefix of the token returned by the challenge login.
const CHALLENGE_TOKEN_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// Rolling anti-CSRF token. `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct VerificationToken(String);

impl VerificationToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Token from the anonymous `/api/webserver/token` document: the second
    /// half of a 64-character value.
    pub fn from_anonymous(token: &str) -> Result<Self> {
        if token.len() != ANONYMOUS_TOKEN_LEN {
            return Err(Error::protocol(format!(
                "expected a {ANONYMOUS_TOKEN_LEN}-character token, got {} characters",
                token.len()
            )));
        }
        token
            .get(ANONYMOUS_TOKEN_LEN / 2..)
            .map(Self::new)
            .ok_or_else(|| Error::protocol("token is not ASCII"))
    }

    /// Token from the challenge login response header: first 32 characters.
    fn from_challenge_headers(headers: &HeaderMap) -> Result<Self> {
        let value = header_token(headers)?;
        value
            .get(..CHALLENGE_TOKEN_LEN)
            .map(Self::new)
            .ok_or_else(|| {
                Error::protocol(format!(
                    "{TOKEN_HEADER} header shorter than {CHALLENGE_TOKEN_LEN} characters"
                ))
            })
    }

    /// Token from the authentication login response header: full value.
    fn from_login_headers(headers: &HeaderMap) -> Result<Self> {
        header_token(headers).map(Self::new)
    }
}

impl fmt::Debug for VerificationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VerificationToken(<redacted>)")
    }
}

/// The verification token header value of a response, if present.
pub(crate) fn header_value(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn header_token(headers: &HeaderMap) -> Result<&str> {
    header_value(headers)
        .ok_or_else(|| Error::protocol(format!("missing {TOKEN_HEADER} header in the response")))
}

/// 64 hex characters: two independent 128-bit random values from the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientNonce(String);

impl ClientNonce {
    pub fn generate() -> Self {
        Self(format!("{}{}", random_hex_128(), random_hex_128()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientNonce {
    fn from(nonce: &str) -> Self {
        Self(nonce.to_string())
    }
}

fn random_hex_128() -> String {
    let mut buf = [0u8; 16];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Parameters returned by the challenge login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub iterations: u32,
    /// Client nonce followed by the device's own suffix.
    pub server_nonce: String,
    /// Hex-encoded PBKDF2 salt.
    pub salt: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct TokenResponse {
    token: String,
}

#[derive(Serialize)]
struct ChallengeLoginRequest<'a> {
    username: &'a str,
    firstnonce: &'a str,
    mode: u8,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ChallengeLoginResponse {
    iterations: u32,
    servernonce: String,
    salt: String,
}

#[derive(Serialize)]
struct AuthenticationLoginRequest<'a> {
    clientproof: &'a str,
    finalnonce: &'a str,
}

/// Compute the SCRAM client proof, hex-encoded.
///
/// ```text
/// message        = clientNonce "," serverNonce "," serverNonce
/// saltedPassword = PBKDF2-HMAC-SHA256(password, salt, iterations, 32)
/// clientKey      = HMAC-SHA256("Client Key", saltedPassword)
/// storedKey      = SHA256(clientKey)
/// signature      = HMAC-SHA256(message, storedKey)
/// clientProof    = clientKey XOR signature
/// ```
pub fn compute_client_proof(
    password: &str,
    client_nonce: &str,
    iterations: u32,
    server_nonce: &str,
    salt: &str,
) -> Result<String> {
    let message = format!("{client_nonce},{server_nonce},{server_nonce}");
    let salt = hex::decode(salt).map_err(|e| Error::protocol(format!("salt is not hex: {e}")))?;

    let mut salted_password = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut salted_password);

    let client_key = hmac_sha256(b"Client Key", &salted_password);
    let stored_key = Sha256::digest(client_key);
    let signature = hmac_sha256(message.as_bytes(), &stored_key);

    let proof: Vec<u8> = client_key
        .iter()
        .zip(signature.iter())
        .map(|(k, s)| k ^ s)
        .collect();
    Ok(hex::encode(proof))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

// ── Handshake steps ──────────────────────────────────────────────────

/// Run the full handshake and return the token for authenticated requests.
///
/// Failures are wrapped in [`Error::Auth`] naming the step.
pub(crate) fn handshake(
    http: &Client,
    base_url: &str,
    username: &str,
    password: &str,
) -> Result<VerificationToken> {
    init_session(http, base_url).map_err(at(HandshakeStep::InitSession))?;

    let token = fetch_token(http, base_url).map_err(at(HandshakeStep::FetchToken))?;

    let nonce = ClientNonce::generate();
    let (challenge, token) = challenge_login(http, base_url, token, username, &nonce)
        .map_err(at(HandshakeStep::ChallengeLogin))?;

    authentication_login(http, base_url, token, password, &nonce, &challenge)
        .map_err(at(HandshakeStep::AuthenticationLogin))
}

fn at(step: HandshakeStep) -> impl FnOnce(Error) -> Error {
    move |source| Error::Auth {
        step,
        source: Box::new(source),
    }
}

/// `GET /`: only the cookies matter; status and body are ignored.
pub(crate) fn init_session(http: &Client, base_url: &str) -> Result<()> {
    let resp = http.get(base_url).send()?;
    debug!("init session: HTTP {}", resp.status());
    Ok(())
}

/// `GET /api/webserver/token`: anonymous token for the challenge login.
pub(crate) fn fetch_token(http: &Client, base_url: &str) -> Result<VerificationToken> {
    let body = http.get(format!("{base_url}{TOKEN_PATH}")).send()?.text()?;
    let parsed: TokenResponse = xml::decode(&body, "token")?;
    if parsed.token.is_empty() {
        return Err(Error::protocol("token response has no token"));
    }
    debug!("fetched anonymous token");
    VerificationToken::from_anonymous(&parsed.token)
}

/// `POST /api/user/challenge_login`: returns the PBKDF2 parameters and the
/// next token.
pub(crate) fn challenge_login(
    http: &Client,
    base_url: &str,
    token: VerificationToken,
    username: &str,
    nonce: &ClientNonce,
) -> Result<(Challenge, VerificationToken)> {
    let body = xml::encode_request_with_declaration(&ChallengeLoginRequest {
        username,
        firstnonce: nonce.as_str(),
        mode: 1,
    })?;
    let resp = post_login(http, &format!("{base_url}{CHALLENGE_LOGIN_PATH}"), &token, body)?;
    let headers = resp.headers().clone();
    let text = resp.text()?;

    xml::check_error(&text)?;
    let next = VerificationToken::from_challenge_headers(&headers)?;
    let parsed: ChallengeLoginResponse = xml::decode(&text, "challenge login")?;

    if parsed.iterations == 0 {
        return Err(Error::protocol("challenge has no iteration count"));
    }
    if parsed.servernonce.is_empty() {
        return Err(Error::protocol("challenge has no server nonce"));
    }
    if !parsed.servernonce.starts_with(nonce.as_str()) {
        return Err(Error::protocol("server nonce does not extend the client nonce"));
    }
    if hex::decode(&parsed.salt).is_err() {
        return Err(Error::protocol("challenge salt is not hex"));
    }

    debug!("challenge accepted, {} iterations", parsed.iterations);
    Ok((
        Challenge {
            iterations: parsed.iterations,
            server_nonce: parsed.servernonce,
            salt: parsed.salt,
        },
        next,
    ))
}

/// `POST /api/user/authentication_login`: proves password knowledge and
/// returns the session token.
pub(crate) fn authentication_login(
    http: &Client,
    base_url: &str,
    token: VerificationToken,
    password: &str,
    nonce: &ClientNonce,
    challenge: &Challenge,
) -> Result<VerificationToken> {
    let proof = compute_client_proof(
        password,
        nonce.as_str(),
        challenge.iterations,
        &challenge.server_nonce,
        &challenge.salt,
    )?;
    let body = xml::encode_request_with_declaration(&AuthenticationLoginRequest {
        clientproof: &proof,
        finalnonce: &challenge.server_nonce,
    })?;
    let resp = post_login(
        http,
        &format!("{base_url}{AUTHENTICATION_LOGIN_PATH}"),
        &token,
        body,
    )?;

    let status = resp.status();
    if !status.is_success() {
        return Err(Error::protocol(format!(
            "authentication login rejected with HTTP {status}"
        )));
    }
    debug!("authentication login: HTTP {status}");
    VerificationToken::from_login_headers(resp.headers())
}

fn post_login(
    http: &Client,
    url: &str,
    token: &VerificationToken,
    body: String,
) -> Result<Response> {
    let resp = http
        .post(url)
        .header(CONTENT_TYPE, LOGIN_CONTENT_TYPE)
        .header(TOKEN_HEADER, token.as_str())
        .body(body)
        .send()?;
    Ok(resp)
}
