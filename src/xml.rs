//! The device's XML dialect.
//!
//! Requests are `<request>…</request>` documents, responses are either
//! `<response>…</response>` or an `<error><code/><message/></error>` document.
//! Most endpoints answer HTTP 200 even on failure, so the root element is the
//! only reliable failure signal.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Declaration the firmware expects in front of login requests.
pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// `<error>` document returned by the firmware.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ErrorDocument {
    #[serde(deserialize_with = "lenient_code")]
    pub code: i64,
    pub message: String,
}

/// An empty `<code/>` reads as 0; any other non-numeric code fails the parse.
fn lenient_code<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    let raw = String::deserialize(deserializer)?;
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse().map_err(de::Error::custom)
}

impl From<ErrorDocument> for Error {
    fn from(doc: ErrorDocument) -> Self {
        Error::Device {
            code: doc.code,
            message: doc.message,
        }
    }
}

/// Serialize `value` as a `<request>` document.
pub fn encode_request<T: Serialize>(value: &T) -> Result<String> {
    quick_xml::se::to_string_with_root("request", value)
        .map_err(|e| Error::protocol(format!("failed to encode request: {e}")))
}

/// Serialize `value` as a `<request>` document preceded by the XML declaration.
pub fn encode_request_with_declaration<T: Serialize>(value: &T) -> Result<String> {
    Ok(format!("{XML_DECLARATION}{}", encode_request(value)?))
}

/// Deserialize a response body. Unknown elements are ignored.
pub fn decode<T: DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    quick_xml::de::from_str(body).map_err(|e| Error::protocol(format!("invalid {what} XML: {e}")))
}

/// Name of the first element in `body`, or `None` if there is none.
pub fn root_element(body: &str) -> Option<String> {
    let mut reader = Reader::from_str(body);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

/// Parse `body` as an `<error>` document. Returns `None` when the root element
/// is anything else or the document does not parse.
pub fn error_document(body: &str) -> Option<ErrorDocument> {
    if root_element(body).as_deref() != Some("error") {
        return None;
    }
    quick_xml::de::from_str(body).ok()
}

/// Fail with [`Error::Device`] if `body` is an `<error>` document.
pub fn check_error(body: &str) -> Result<()> {
    match error_document(body) {
        Some(doc) => Err(doc.into()),
        None => Ok(()),
    }
}
