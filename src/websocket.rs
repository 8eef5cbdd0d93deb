//! WebSocket handshake detection for the protocol-upgrade hand-off.
//!
//! Grounded on the teacher's `server/websocket.rs::get_handshake` (the
//! `Sec-WebSocket-Key` SHA-1/GUID digest) and `websocket/keys.rs::Accept`
//! (the base64 `Display` impl). The teacher's client-side `Key`
//! generator has no counterpart here -- this crate only ever plays the
//! server role -- and is dropped.
use std::fmt;

use sha1::Sha1;

use crate::headers::{self, HeaderMap};

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The `Sec-WebSocket-Accept` header value, base64-encoded.
pub struct Accept([u8; 20]);

impl Accept {
    fn from_key_bytes(key: &[u8]) -> Accept {
        let mut sha1 = Sha1::new();
        sha1.update(key);
        sha1.update(GUID.as_bytes());
        Accept(sha1.digest().bytes())
    }
}

impl fmt::Display for Accept {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ\
                               abcdefghijklmnopqrstuvwxyz\
                               0123456789+/";
        let mut buf = [0u8; 28];
        for i in 0..6 {
            let n = ((self.0[i * 3] as usize) << 16)
                | ((self.0[i * 3 + 1] as usize) << 8)
                | (self.0[i * 3 + 2] as usize);
            buf[i * 4] = CHARS[(n >> 18) & 63];
            buf[i * 4 + 1] = CHARS[(n >> 12) & 63];
            buf[i * 4 + 2] = CHARS[(n >> 6) & 63];
            buf[i * 4 + 3] = CHARS[n & 63];
        }
        let n = ((self.0[18] as usize) << 16) | ((self.0[19] as usize) << 8);
        buf[24] = CHARS[(n >> 18) & 63];
        buf[25] = CHARS[(n >> 12) & 63];
        buf[26] = CHARS[(n >> 6) & 63];
        buf[27] = b'=';
        f.write_str(std::str::from_utf8(&buf).expect("base64 alphabet is ascii"))
    }
}

impl fmt::Debug for Accept {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "websocket::Accept({})", self)
    }
}

/// Fields of a successfully-detected handshake. `spec.md` §4.5's
/// "application's routing layer accepts the request" check happens
/// before this is surrendered to the application; this struct only
/// carries what's needed to build the `101 Switching Protocols`
/// response.
pub struct Handshake {
    pub accept: Accept,
    pub protocols: Vec<String>,
    pub extensions: Vec<String>,
}

/// Returns `Ok(None)` when this isn't a websocket upgrade at all (no
/// `Connection: Upgrade`, or `Upgrade` names something other than
/// `websocket`), `Err(())` when it looks like an attempt but is
/// malformed, and `Ok(Some(..))` on a valid handshake.
pub fn detect(headers: &HeaderMap, has_body: bool) -> Result<Option<Handshake>, ()> {
    let connection_upgrade = headers
        .get("connection")
        .map(|v| headers::token_list_contains(v.as_bytes(), "upgrade"))
        .unwrap_or(false);
    if !connection_upgrade {
        return Ok(None);
    }
    match headers.get("upgrade") {
        Some(v) if headers::token_eq_ignore_ascii_case(v.as_bytes(), "websocket") => {}
        _ => return Ok(None),
    }

    let mut version_ok = false;
    let mut accept = None;
    let mut protocols = Vec::new();
    let mut extensions = Vec::new();

    if let Some(key) = headers.get("sec-websocket-key") {
        accept = Some(Accept::from_key_bytes(key.trim().as_bytes()));
    }
    if let Some(v) = headers.get("sec-websocket-version") {
        version_ok = v.trim() == "13";
    }
    if let Some(v) = headers.get("sec-websocket-protocol") {
        protocols.extend(v.split(',').map(|t| t.trim()).filter(|t| !t.is_empty()).map(String::from));
    }
    if let Some(v) = headers.get("sec-websocket-extensions") {
        extensions.extend(v.split(',').map(|t| t.trim()).filter(|t| !t.is_empty()).map(String::from));
    }

    if has_body {
        debug!("websocket handshake carried a request body");
        return Err(());
    }
    if !version_ok || accept.is_none() {
        debug!("missing or unsupported Sec-WebSocket-Version/Key");
        return Err(());
    }
    Ok(Some(Handshake { accept: accept.unwrap(), protocols, extensions }))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn accept_matches_rfc6455_example() {
        // The example key/accept pair from RFC 6455 §1.3.
        let accept = Accept::from_key_bytes(b"dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(accept.to_string(), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn detects_valid_handshake() {
        let mut h = HeaderMap::new();
        h.append("Connection", "keep-alive, Upgrade");
        h.append("Upgrade", "websocket");
        h.append("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==");
        h.append("Sec-WebSocket-Version", "13");
        let handshake = detect(&h, false).unwrap().unwrap();
        assert_eq!(handshake.accept.to_string(), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn non_upgrade_request_is_not_a_handshake() {
        let h = HeaderMap::new();
        assert!(detect(&h, false).unwrap().is_none());
    }

    #[test]
    fn body_present_is_malformed() {
        let mut h = HeaderMap::new();
        h.append("Connection", "Upgrade");
        h.append("Upgrade", "websocket");
        h.append("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==");
        h.append("Sec-WebSocket-Version", "13");
        assert!(detect(&h, true).is_err());
    }
}
