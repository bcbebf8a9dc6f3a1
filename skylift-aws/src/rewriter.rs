//! Edge URI rewriter
//!
//! Extensionless routes are served from `<route>.html` objects. The same
//! rewrite runs locally (for `skylift rewrite` and tests) and at the edge
//! through the handler rendered by [`render_handler_source`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// Final path segment without a dot
pub const REWRITE_PATTERN: &str = r"/[^/.]+$";

pub const HTML_SUFFIX: &str = ".html";

static REWRITE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(REWRITE_PATTERN).ok());

/// Rewrite a request URI
///
/// `/about` becomes `/about.html`; anything whose last segment has an
/// extension, or that ends in `/`, is returned unchanged.
pub fn rewrite_uri(uri: &str) -> String {
    match REWRITE_RE.as_ref() {
        Some(re) if re.is_match(uri) => format!("{}{}", uri, HTML_SUFFIX),
        _ => uri.to_string(),
    }
}

/// Origin request as delivered to the edge function
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CloudFrontRequest {
    pub uri: String,
    #[serde(flatten)]
    pub rest: Map<String, Json>,
}

#[derive(Debug, Deserialize)]
struct CloudFrontEvent {
    #[serde(rename = "Records")]
    records: Vec<CloudFrontRecord>,
}

#[derive(Debug, Deserialize)]
struct CloudFrontRecord {
    cf: CloudFrontPayload,
}

#[derive(Debug, Deserialize)]
struct CloudFrontPayload {
    request: Json,
}

/// Handle an origin-request event, returning the request to forward
///
/// Never fails: a request without a usable `uri` is forwarded untouched,
/// and an event without a request is echoed back.
pub fn handle_request(event: &Json) -> Json {
    let request = match serde_json::from_value::<CloudFrontEvent>(event.clone()) {
        Ok(parsed) => parsed.records.into_iter().next().map(|r| r.cf.request),
        Err(_) => None,
    };
    let Some(request) = request else {
        return event.clone();
    };

    match serde_json::from_value::<CloudFrontRequest>(request.clone()) {
        Ok(mut typed) => {
            typed.uri = rewrite_uri(&typed.uri);
            serde_json::to_value(typed).unwrap_or(request)
        }
        Err(_) => request,
    }
}

/// Node.js module deployed as the edge function
pub fn render_handler_source() -> String {
    let pattern = serde_json::to_string(REWRITE_PATTERN).unwrap_or_default();
    let suffix = serde_json::to_string(HTML_SUFFIX).unwrap_or_default();
    format!(
        r#"'use strict';

const PATTERN = new RegExp({pattern});
const SUFFIX = {suffix};

exports.handler = async (event) => {{
  const record = event && event.Records && event.Records[0];
  const request = record && record.cf && record.cf.request;
  if (!request) {{
    return event;
  }}
  try {{
    if (typeof request.uri === 'string' && PATTERN.test(request.uri)) {{
      request.uri = request.uri + SUFFIX;
    }}
  }} catch (err) {{
    console.log('rewrite skipped', err);
  }}
  return request;
}};
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extensionless_route_gets_html() {
        assert_eq!(rewrite_uri("/about"), "/about.html");
        assert_eq!(rewrite_uri("/blog/post-1"), "/blog/post-1.html");
    }

    #[test]
    fn files_and_directories_are_unchanged() {
        for uri in ["/", "/index.html", "/assets/app.js", "/docs/", "", "/a.b/c.css"] {
            assert_eq!(rewrite_uri(uri), uri, "{} should be unchanged", uri);
        }
    }

    #[test]
    fn rewrite_is_idempotent() {
        for uri in ["/about", "/", "/x/y", "/style.css", "/v1.2/notes"] {
            let once = rewrite_uri(uri);
            assert_eq!(rewrite_uri(&once), once);
            assert!(!once.ends_with(".html.html"));
        }
    }

    fn event(request: Json) -> Json {
        json!({ "Records": [{ "cf": { "config": { "eventType": "origin-request" }, "request": request } }] })
    }

    #[test]
    fn handler_rewrites_and_keeps_other_fields() {
        let out = handle_request(&event(json!({
            "uri": "/pricing",
            "method": "GET",
            "headers": { "host": [{ "key": "Host", "value": "dev.example.com" }] }
        })));
        assert_eq!(out["uri"], "/pricing.html");
        assert_eq!(out["method"], "GET");
        assert_eq!(out["headers"]["host"][0]["value"], "dev.example.com");
    }

    #[test]
    fn handler_passes_through_malformed_input() {
        let no_uri = json!({ "method": "GET" });
        assert_eq!(handle_request(&event(no_uri.clone())), no_uri);

        let numeric_uri = json!({ "uri": 42 });
        assert_eq!(handle_request(&event(numeric_uri.clone())), numeric_uri);

        let garbage = json!({ "unexpected": true });
        assert_eq!(handle_request(&garbage), garbage);

        let empty_records = json!({ "Records": [] });
        assert_eq!(handle_request(&empty_records), empty_records);
    }

    #[test]
    fn handler_source_embeds_pattern() {
        let source = render_handler_source();
        assert!(source.contains(r#"new RegExp("/[^/.]+$")"#));
        assert!(source.contains("exports.handler"));
        assert!(source.contains(r#"const SUFFIX = ".html";"#));
    }
}
