//! Method URLs and request options.
//!
//! [`build`] renders the recognized options of a streaming method into the
//! query string and hands everything else back as residual options for the
//! HTTP transport. No percent-encoding is applied; the service accepts the
//! rendered characters as-is and callers are expected to pass ASCII-safe
//! values.

use std::fmt::Write;
use std::time::Duration;

/// Streaming methods exposed by the service.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamMethod {
    Filter,
    Firehose,
    Links,
    Retweet,
    Sample,
}

impl StreamMethod {
    /// Path segment of the method endpoint.
    pub fn path(self) -> &'static str {
        match self {
            Self::Filter => "filter",
            Self::Firehose => "firehose",
            Self::Links => "links",
            Self::Retweet => "retweet",
            Self::Sample => "sample",
        }
    }
}

/// Full URL of a method endpoint under `base`.
pub fn method_url(base: &str, method: StreamMethod) -> String {
    format!("{base}/{}.json", method.path())
}

/// Options accepted by the per-method switch helpers.
#[derive(Clone, Debug, PartialEq)]
pub enum MethodOption {
    /// Backlog of historical statuses delivered before the live stream.
    /// The service accepts values in `-150000..=150000`.
    Count(i32),
    /// Ask the service to length-delimit statuses.
    Delimited,
    /// Restrict the stream to statuses from the given user ids.
    Follow(Vec<u64>),
    /// Restrict the stream to statuses matching the given terms. Terms are
    /// rendered verbatim, commas and all other bytes unescaped.
    Track(Vec<String>),
    /// Restrict the stream to the given bounding boxes, each
    /// `(west, south, east, north)`.
    Locations(Vec<(f64, f64, f64, f64)>),
    /// Forwarded to the HTTP transport instead of the query string.
    Transport(TransportOption),
}

/// Options applied to the outgoing streaming request itself.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportOption {
    /// Extra request header.
    Header(String, String),
    /// Overall request deadline. A stream that exceeds it ends as if the
    /// server had closed it.
    Timeout(Duration),
}

/// Renders `options` into the query string of `base`.
///
/// Recognized options become query parameters in input order; the first uses
/// `?`, the rest `&`. Transport options are removed from the query and
/// returned in input order for the caller to apply to the request. The
/// function is pure: identical inputs produce identical outputs.
pub fn build(base: &str, options: &[MethodOption]) -> (String, Vec<TransportOption>) {
    let mut url = String::from(base);
    let mut residual = Vec::new();
    let mut first = true;

    for option in options {
        match option {
            MethodOption::Count(count) => {
                separator(&mut url, &mut first);
                let _ = write!(url, "count={count}");
            }
            MethodOption::Delimited => {
                separator(&mut url, &mut first);
                url.push_str("delimited=length");
            }
            MethodOption::Follow(ids) => {
                separator(&mut url, &mut first);
                url.push_str("follow=");
                for (index, id) in ids.iter().enumerate() {
                    if index > 0 {
                        url.push(',');
                    }
                    let _ = write!(url, "{id}");
                }
            }
            MethodOption::Track(terms) => {
                separator(&mut url, &mut first);
                url.push_str("track=");
                url.push_str(&terms.join(","));
            }
            MethodOption::Locations(boxes) => {
                separator(&mut url, &mut first);
                url.push_str("locations=");
                let mut coords = boxes
                    .iter()
                    .flat_map(|(west, south, east, north)| [west, south, east, north]);
                if let Some(coord) = coords.next() {
                    url.push_str(&format_coordinate(*coord));
                }
                for coord in coords {
                    url.push(',');
                    url.push_str(&format_coordinate(*coord));
                }
            }
            MethodOption::Transport(option) => residual.push(option.clone()),
        }
    }

    (url, residual)
}

fn separator(url: &mut String, first: &mut bool) {
    url.push(if *first { '?' } else { '&' });
    *first = false;
}

/// Fixed-point rendering with 5 significant digits, the precision the
/// service documents for bounding-box coordinates.
fn format_coordinate(value: f64) -> String {
    if value == 0.0 {
        return "0.0000".to_string();
    }
    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (4 - magnitude).max(0) as usize;
    format!("{value:.decimals$}")
}
