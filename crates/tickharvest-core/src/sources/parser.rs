//! Format-specific extraction of `host:port` entries from list bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProxyAddress;

const SCHEME_PREFIXES: [&str; 4] = ["http://", "https://", "socks4://", "socks5://"];
const JSON_LIST_KEYS: [&str; 3] = ["data", "proxies", "result"];

/// Body format of a proxy list source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Text,
    Csv,
    Json,
    #[default]
    Auto,
}

impl SourceFormat {
    /// Resolve `Auto` by sniffing the body.
    pub fn detect(self, body: &str) -> Self {
        if self != Self::Auto {
            return self;
        }

        let Some(first) = body
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && !line.starts_with('#'))
        else {
            return Self::Text;
        };

        if first.starts_with('[') || first.starts_with('{') {
            Self::Json
        } else if first.contains(',') {
            Self::Csv
        } else {
            Self::Text
        }
    }
}

/// Parse a source body into normalized addresses.
///
/// Entries that fail normalization are dropped silently; an unparsable JSON
/// document yields nothing.
pub fn parse_body(body: &str, format: SourceFormat) -> Vec<ProxyAddress> {
    match format.detect(body) {
        SourceFormat::Text | SourceFormat::Auto => parse_text(body),
        SourceFormat::Csv => parse_csv(body),
        SourceFormat::Json => parse_json(body),
    }
}

pub fn parse_text(body: &str) -> Vec<ProxyAddress> {
    body.lines()
        .filter_map(|line| {
            let line = line.split('#').next().unwrap_or_default().trim();
            let token = line.split_whitespace().next()?;
            ProxyAddress::parse(strip_scheme(token)).ok()
        })
        .collect()
}

pub fn parse_csv(body: &str) -> Vec<ProxyAddress> {
    body.lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(|line| {
            let mut columns = line.split(',').map(|column| column.trim().trim_matches('"'));
            let first = strip_scheme(columns.next()?);
            match columns.next().filter(|column| !column.is_empty()) {
                Some(port) => {
                    let port = port.parse::<u16>().ok()?;
                    ProxyAddress::new(first, port).ok()
                }
                None => ProxyAddress::parse(first).ok(),
            }
        })
        .collect()
}

pub fn parse_json(body: &str) -> Vec<ProxyAddress> {
    let Ok(document) = serde_json::from_str::<Value>(body) else {
        return Vec::new();
    };

    let entries = match &document {
        Value::Array(entries) => entries.as_slice(),
        Value::Object(map) => JSON_LIST_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    entries.iter().filter_map(json_entry).collect()
}

fn json_entry(entry: &Value) -> Option<ProxyAddress> {
    match entry {
        Value::String(raw) => ProxyAddress::parse(strip_scheme(raw.trim())).ok(),
        Value::Object(map) => {
            let host = map
                .get("ip")
                .or_else(|| map.get("host"))
                .and_then(Value::as_str)?;
            let port = match map.get("port")? {
                Value::Number(number) => u16::try_from(number.as_u64()?).ok()?,
                Value::String(raw) => raw.trim().parse::<u16>().ok()?,
                _ => return None,
            };
            ProxyAddress::new(host.trim(), port).ok()
        }
        _ => None,
    }
}

fn strip_scheme(token: &str) -> &str {
    SCHEME_PREFIXES
        .iter()
        .find_map(|prefix| {
            token
                .get(..prefix.len())
                .filter(|head| head.eq_ignore_ascii_case(prefix))
                .map(|_| &token[prefix.len()..])
        })
        .unwrap_or(token)
        .trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(addresses: Vec<ProxyAddress>) -> Vec<String> {
        addresses.into_iter().map(|address| address.to_string()).collect()
    }

    #[test]
    fn text_lists_strip_comments_schemes_and_trailing_tokens() {
        let body = "# free list\n\n1.2.3.4:8080\nhttp://5.6.7.8:3128 US elite\nSOCKS5://Proxy.Example.com:1080/\nnot-a-proxy\n";

        assert_eq!(
            rendered(parse_text(body)),
            vec!["1.2.3.4:8080", "5.6.7.8:3128", "proxy.example.com:1080"]
        );
    }

    #[test]
    fn csv_accepts_split_and_joined_columns() {
        let body = "ip,port,country\n9.9.9.9,8000,DE\n\"8.8.4.4:53\"\n10.0.0.1,notaport\n";

        assert_eq!(rendered(parse_csv(body)), vec!["9.9.9.9:8000", "8.8.4.4:53"]);
    }

    #[test]
    fn json_accepts_objects_strings_and_wrapped_arrays() {
        let bare = r#"[{"ip":"1.1.1.1","port":8080},{"host":"2.2.2.2","port":"3128"},"3.3.3.3:80"]"#;
        assert_eq!(
            rendered(parse_json(bare)),
            vec!["1.1.1.1:8080", "2.2.2.2:3128", "3.3.3.3:80"]
        );

        let wrapped = r#"{"total":1,"data":[{"ip":"4.4.4.4","port":1080,"protocols":["http"]}]}"#;
        assert_eq!(rendered(parse_json(wrapped)), vec!["4.4.4.4:1080"]);
    }

    #[test]
    fn json_rejects_bad_ports_and_garbage() {
        let body = r#"[{"ip":"1.1.1.1","port":70000},{"ip":"1.1.1.1"},42]"#;
        assert!(parse_json(body).is_empty());
        assert!(parse_json("<html>").is_empty());
    }

    #[test]
    fn auto_detects_format() {
        assert_eq!(SourceFormat::Auto.detect("  [1]"), SourceFormat::Json);
        assert_eq!(SourceFormat::Auto.detect("a,b\n"), SourceFormat::Csv);
        assert_eq!(SourceFormat::Auto.detect("1.1.1.1:80\n"), SourceFormat::Text);
        assert_eq!(SourceFormat::Text.detect("[1]"), SourceFormat::Text);
    }

    #[test]
    fn detection_ignores_comment_lines() {
        assert_eq!(
            SourceFormat::Auto.detect("# free proxies, updated hourly

1.2.3.4:8080 US elite
"),
            SourceFormat::Text
        );
        assert_eq!(
            SourceFormat::Auto.detect("# export
# generated hourly
1.2.3.4,8080,US
"),
            SourceFormat::Csv
        );
        assert_eq!(SourceFormat::Auto.detect("# only comments

"), SourceFormat::Text);
    }

    #[test]
    fn text_list_with_comma_in_header_keeps_every_entry() {
        let body = "# free proxies, updated hourly
1.2.3.4:8080 US elite
5.6.7.8:3128 DE anonymous
";

        assert_eq!(
            rendered(parse_body(body, SourceFormat::Auto)),
            vec!["1.2.3.4:8080", "5.6.7.8:3128"]
        );
    }

    #[test]
    fn csv_list_behind_comment_header_keeps_every_row() {
        let body = "# proxy export
# columns: ip, port, country
1.2.3.4,8080,US
5.6.7.8,3128,DE
";

        assert_eq!(
            rendered(parse_body(body, SourceFormat::Auto)),
            vec!["1.2.3.4:8080", "5.6.7.8:3128"]
        );
    }
}
