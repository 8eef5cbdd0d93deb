extern crate hitchpost;

use hitchpost::{HeaderMap, Method, MethodMask};

#[test]
fn method_from_str() {
    assert_eq!(Method::from("GET"), Method::Get);
    assert_eq!(Method::from("get"), Method::Extension("get".to_string()));
    assert_eq!(Method::from("Get"), Method::Extension("Get".to_string()));

    assert_eq!(Method::from("OPTIONS"), Method::Options);
    assert_eq!(Method::from("HEAD"), Method::Head);
    assert_eq!(Method::from("POST"), Method::Post);
    assert_eq!(Method::from("PUT"), Method::Put);
    assert_eq!(Method::from("PATCH"), Method::Patch);
    assert_eq!(Method::from("DELETE"), Method::Delete);
    assert_eq!(Method::from("TRACE"), Method::Trace);
    assert_eq!(Method::from("CONNECT"), Method::Connect);
}

#[test]
fn method_display_round_trips_through_as_str() {
    assert_eq!(Method::Get.to_string(), "GET");
    assert_eq!(Method::Extension("PROPFIND".to_string()).to_string(), "PROPFIND");
}

#[test]
fn method_mask_of_selects_only_named_methods() {
    let mask = MethodMask::of(&[Method::Get, Method::Head]);
    assert!(mask.matches(&Method::Get));
    assert!(mask.matches(&Method::Head));
    assert!(!mask.matches(&Method::Post));
}

#[test]
fn method_mask_all_matches_extension_methods_too() {
    assert!(MethodMask::ALL.matches(&Method::Extension("PROPFIND".to_string())));
}

#[test]
fn header_lookup_is_case_insensitive_and_preserves_original_case() {
    let mut h = HeaderMap::new();
    h.append("Content-Type", "text/plain");
    h.append("X-Request-Id", "abc123");

    assert_eq!(h.get("content-type"), Some("text/plain"));
    assert_eq!(h.get("CONTENT-TYPE"), Some("text/plain"));

    let names: Vec<_> = h.iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["Content-Type", "X-Request-Id"]);
}

#[test]
fn duplicate_headers_are_all_retained_in_order() {
    let mut h = HeaderMap::new();
    h.append("Set-Cookie", "a=1");
    h.append("Set-Cookie", "b=2");

    assert_eq!(h.get_all("set-cookie").collect::<Vec<_>>(), vec!["a=1", "b=2"]);
    assert_eq!(h.len(), 2);
}

#[test]
fn missing_header_is_absent_not_empty_string() {
    let h = HeaderMap::new();
    assert_eq!(h.get("x-missing"), None);
    assert!(!h.contains("x-missing"));
    assert!(h.is_empty());
}
