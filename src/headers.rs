//! Request methods, HTTP version, and the case-insensitive header
//! multimap used by both `Request` and `Responder`.
use std::collections::HashMap;
use std::fmt;

/// HTTP request method.
///
/// ```rust
/// use hitchpost::headers::Method;
///
/// match Method::from("GET") {
///     Method::Get => {}
///     Method::Extension(m) => println!("custom method {}", m),
///     _ => {}
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Options,
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Trace,
    Connect,
    /// Any token `httparse` accepted that isn't one of the above.
    Extension(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match *self {
            Method::Options => "OPTIONS",
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
            Method::Extension(ref s) => s,
        }
    }

    /// Bitmask position used by `Router`'s method mask. `CONNECT` has no
    /// bit: it's never routable, per the upgrade hand-off rules.
    pub fn mask_bit(&self) -> u16 {
        match *self {
            Method::Options => 1 << 0,
            Method::Get => 1 << 1,
            Method::Head => 1 << 2,
            Method::Post => 1 << 3,
            Method::Put => 1 << 4,
            Method::Patch => 1 << 5,
            Method::Delete => 1 << 6,
            Method::Trace => 1 << 7,
            Method::Connect => 1 << 8,
            Method::Extension(_) => 1 << 9,
        }
    }
}

impl<'a> From<&'a str> for Method {
    fn from(s: &'a str) -> Method {
        match s {
            "OPTIONS" => Method::Options,
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "PATCH" => Method::Patch,
            "DELETE" => Method::Delete,
            "TRACE" => Method::Trace,
            "CONNECT" => Method::Connect,
            other => Method::Extension(other.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bitmask of methods a `RouterRule` accepts. `Mask::ALL` matches
/// every method including unrecognized extension methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodMask(pub u16);

impl MethodMask {
    pub const ALL: MethodMask = MethodMask(0xffff);

    pub fn of(methods: &[Method]) -> MethodMask {
        let mut bits = 0;
        for m in methods {
            bits |= m.mask_bit();
        }
        MethodMask(bits)
    }

    pub fn matches(&self, m: &Method) -> bool {
        self.0 & m.mask_bit() != 0
    }
}

/// HTTP version on the wire. Requests may arrive as 0.9, 1.0 or 1.1;
/// `hitchpost` always answers with `HTTP/1.1` per `spec.md` §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http09,
    Http10,
    Http11,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Version::Http09 => f.write_str("HTTP/0.9"),
            Version::Http10 => f.write_str("HTTP/1.0"),
            Version::Http11 => f.write_str("HTTP/1.1"),
        }
    }
}

/// Trims ASCII whitespace from both ends and compares case-insensitively
/// to `token`. Generalizes the teacher's hand-rolled `is_close`/
/// `is_chunked` byte scanners (which each duplicated the same
/// trim-then-compare logic for a single literal) into one routine used
/// for every hop-by-hop token this crate inspects.
pub fn token_eq_ignore_ascii_case(val: &[u8], token: &str) -> bool {
    let trimmed = trim_ascii(val);
    trimmed.eq_ignore_ascii_case(token.as_bytes())
}

fn trim_ascii(mut x: &[u8]) -> &[u8] {
    while let [b'\r' | b'\n' | b' ' | b'\t', rest @ ..] = x {
        x = rest;
    }
    while let [rest @ .., b'\r' | b'\n' | b' ' | b'\t'] = x {
        x = rest;
    }
    x
}

/// True if any comma-separated token in `val` equals `token`
/// case-insensitively, e.g. matching `upgrade` inside
/// `Connection: keep-alive, Upgrade`.
pub fn token_list_contains(val: &[u8], token: &str) -> bool {
    val.split(|&b| b == b',').any(|part| token_eq_ignore_ascii_case(part, token))
}

/// Case-insensitive header multimap that preserves insertion order.
///
/// Storage follows `spec.md` §3: a lowercased header name indexes an
/// ordered list of `(original-case name, value)` pairs. The index is a
/// plain `HashMap`, which already hashes with a per-process random
/// seed (`RandomState`), satisfying the collision-resistance
/// requirement without a hand-rolled hasher.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
    index: HashMap<String, Vec<usize>>,
}

impl HeaderMap {
    pub fn new() -> HeaderMap {
        HeaderMap { entries: Vec::new(), index: HashMap::new() }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Appends a header, preserving any prior header of the same name.
    pub fn append<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        let idx = self.entries.len();
        self.entries.push((name, value.into()));
        self.index.entry(key).or_insert_with(Vec::new).push(idx);
    }

    /// First value stored under `name`, case-insensitive.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).next()
    }

    /// All values stored under `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        let key = name.to_ascii_lowercase();
        self.index
            .get(&key)
            .into_iter()
            .flat_map(move |idxs| idxs.iter().map(move |&i| self.entries[i].1.as_str()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_ascii_lowercase())
    }

    /// All headers in the order they were appended, with their
    /// original-case names.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn method_from_str() {
        assert_eq!(Method::from("GET"), Method::Get);
        assert_eq!(Method::from("get"), Method::Extension("get".to_string()));
        assert_eq!(Method::from("PATCH"), Method::Patch);
    }

    #[test]
    fn token_trim_and_case() {
        assert!(token_eq_ignore_ascii_case(b"  Close \r\n", "close"));
        assert!(!token_eq_ignore_ascii_case(b"xclose", "close"));
    }

    #[test]
    fn token_list() {
        assert!(token_list_contains(b"keep-alive, Upgrade", "upgrade"));
        assert!(!token_list_contains(b"keep-alive", "upgrade"));
    }

    #[test]
    fn case_insensitive_lookup_preserves_original_case_and_order() {
        let mut h = HeaderMap::new();
        h.append("X-Foo", "1");
        h.append("x-foo", "2");
        h.append("Content-Type", "text/plain");

        assert_eq!(h.get("x-FOO"), Some("1"));
        assert_eq!(h.get_all("X-Foo").collect::<Vec<_>>(), vec!["1", "2"]);

        let names: Vec<_> = h.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["X-Foo", "x-foo", "Content-Type"]);
    }
}
