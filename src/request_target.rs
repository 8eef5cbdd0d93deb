//! Parses the request-target token of the request line, per RFC 7230
//! §5.3. Grounded on the teacher's `server/request_target.rs`, cleaned
//! up (that draft had a dangling `scheme: "http"` typo on the
//! `https://` branch) and reused as-is since the grammar doesn't
//! change for this crate's purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTarget<'a> {
    /// Usual form of `/hello?name=world`.
    Origin(&'a str),
    /// Full URL: `http://example.com:8080/hello`. Note path may not
    /// start with a slash here (unlike `Origin`).
    Absolute { scheme: &'a str, authority: &'a str, path: &'a str },
    /// Only hostname `example.com:8080`; only meaningful for CONNECT.
    Authority(&'a str),
    /// Asterisk `*`, used by `OPTIONS *`.
    Asterisk,
}

fn authority_end_char(&x: &u8) -> bool {
    x == b'/' || x == b'?' || x == b'#' || x == b'@'
}

impl<'a> RequestTarget<'a> {
    pub fn parse(s: &'a str) -> Option<RequestTarget<'a>> {
        use self::RequestTarget::*;

        if s.is_empty() {
            return None;
        }
        if s.starts_with('/') {
            return Some(Origin(s));
        }
        if let Some(rest) = s.strip_prefix("http://") {
            let auth_end = rest.as_bytes().iter()
                .position(authority_end_char)
                .unwrap_or(rest.len());
            return Some(Absolute {
                scheme: "http",
                authority: &rest[..auth_end],
                path: &rest[auth_end..],
            });
        }
        if let Some(rest) = s.strip_prefix("https://") {
            let auth_end = rest.as_bytes().iter()
                .position(authority_end_char)
                .unwrap_or(rest.len());
            return Some(Absolute {
                scheme: "https",
                authority: &rest[..auth_end],
                path: &rest[auth_end..],
            });
        }
        if s == "*" {
            return Some(Asterisk);
        }
        if s.as_bytes().iter().position(authority_end_char).is_none() {
            return Some(Authority(s));
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::RequestTarget::*;
    use super::RequestTarget;

    #[test]
    fn origin_form() {
        assert_eq!(RequestTarget::parse("/hello?a=b"), Some(Origin("/hello?a=b")));
    }

    #[test]
    fn absolute_form() {
        assert_eq!(
            RequestTarget::parse("http://example.com:8080/hello"),
            Some(Absolute { scheme: "http", authority: "example.com:8080", path: "/hello" }),
        );
        assert_eq!(
            RequestTarget::parse("https://example.com/hello"),
            Some(Absolute { scheme: "https", authority: "example.com", path: "/hello" }),
        );
    }

    #[test]
    fn authority_form() {
        assert_eq!(RequestTarget::parse("example.com:443"), Some(Authority("example.com:443")));
    }

    #[test]
    fn asterisk_form() {
        assert_eq!(RequestTarget::parse("*"), Some(Asterisk));
    }
}
