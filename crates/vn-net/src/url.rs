//! URL handling for intercepted requests.
//!
//! The `extract_*` helpers avoid allocations and work directly on string
//! slices; they run for every request a rule inspects. [`RequestUrl`] is the
//! owned, resolved form stored in a [`NetworkContext`](crate::NetworkContext).

use std::fmt;

use crate::error::NetworkError;

// =============================================================================
// Slice Helpers
// =============================================================================

/// Position right after `://`.
#[inline]
pub fn get_scheme_end(url: &str) -> Option<usize> {
    let bytes = url.as_bytes();
    let colon_pos = bytes.iter().position(|&b| b == b':')?;
    if colon_pos == 0 || !bytes[..colon_pos].iter().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.')) {
        return None;
    }

    if bytes.len() > colon_pos + 2 && bytes[colon_pos + 1] == b'/' && bytes[colon_pos + 2] == b'/' {
        return Some(colon_pos + 3);
    }
    None
}

/// The scheme without `://`, as written.
#[inline]
pub fn extract_scheme(url: &str) -> Option<&str> {
    get_scheme_end(url).map(|end| &url[..end - 3])
}

/// Start and end of the hostname, skipping userinfo and stopping before a port.
/// An IPv6 literal keeps its brackets; one left unclosed yields `None`.
#[inline]
pub fn get_host_position(url: &str) -> Option<(usize, usize)> {
    let scheme_end = get_scheme_end(url)?;
    let bytes = url.as_bytes();
    let authority_end = authority_end(url, scheme_end);

    let mut host_start = scheme_end;
    if let Some(at) = bytes[scheme_end..authority_end].iter().rposition(|&b| b == b'@') {
        host_start = scheme_end + at + 1;
    }

    // colons inside `[...]` belong to the address
    let literal_end = if bytes.get(host_start) == Some(&b'[') {
        let close = bytes[host_start..authority_end].iter().position(|&b| b == b']')?;
        host_start + close + 1
    } else {
        host_start
    };

    let host_end = bytes[literal_end..authority_end]
        .iter()
        .position(|&b| b == b':')
        .map_or(authority_end, |i| literal_end + i);

    Some((host_start, host_end))
}

/// Port slice of an absolute URL, without the `:`; `None` when absent.
#[inline]
pub fn extract_port(url: &str) -> Option<&str> {
    let (_, host_end) = get_host_position(url)?;
    let scheme_end = get_scheme_end(url)?;
    let port = url[host_end..authority_end(url, scheme_end)].strip_prefix(':')?;
    Some(port)
}

fn authority_end(url: &str, scheme_end: usize) -> usize {
    url.as_bytes()[scheme_end..]
        .iter()
        .position(|&b| b == b'/' || b == b'?' || b == b'#')
        .map_or(url.len(), |i| scheme_end + i)
}

/// Hostname slice of an absolute URL.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    let (host_start, host_end) = get_host_position(url)?;
    Some(&url[host_start..host_end])
}

/// Host with port, without userinfo.
#[inline]
pub fn extract_host_with_port(url: &str) -> Option<&str> {
    let scheme_end = get_scheme_end(url)?;
    let authority = &url[scheme_end..authority_end(url, scheme_end)];
    Some(match authority.rfind('@') {
        Some(at_pos) => &authority[at_pos + 1..],
        None => authority,
    })
}

/// Path of an absolute URL; `/` when it has none.
#[inline]
pub fn extract_path(url: &str) -> &str {
    let Some(scheme_end) = get_scheme_end(url) else {
        return "/";
    };
    let path_start = authority_end(url, scheme_end);
    if url.as_bytes().get(path_start) != Some(&b'/') {
        return "/";
    }
    let path_end = url.as_bytes()[path_start..]
        .iter()
        .position(|&b| b == b'?' || b == b'#')
        .map_or(url.len(), |i| path_start + i);
    &url[path_start..path_end]
}

/// Query including the leading `?`, or an empty string.
#[inline]
pub fn extract_search(url: &str) -> &str {
    let end = url.find('#').unwrap_or(url.len());
    match url[..end].find('?') {
        Some(start) => &url[start..end],
        None => "",
    }
}

/// Fragment including the leading `#`, or an empty string.
#[inline]
pub fn extract_hash(url: &str) -> &str {
    url.find('#').map_or("", |start| &url[start..])
}

// =============================================================================
// Resolved URLs
// =============================================================================

/// Absolute, normalized request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUrl {
    pub href: String,
    pub scheme: String,
    /// Lower-cased, without port.
    pub hostname: String,
    pub port: Option<u16>,
    pub pathname: String,
    /// With the leading `?`, empty when absent.
    pub search: String,
    pub hash: String,
}

impl RequestUrl {
    /// Parse an absolute URL.
    pub fn parse(input: &str) -> Result<Self, NetworkError> {
        let input = input.trim();
        let invalid = || NetworkError::InvalidUrl(input.to_string());

        let scheme = extract_scheme(input).ok_or_else(invalid)?.to_ascii_lowercase();
        let hostname = extract_host(input).ok_or_else(invalid)?.to_ascii_lowercase();
        if hostname.is_empty() {
            return Err(invalid());
        }
        let port = match extract_port(input) {
            Some(port) if !port.is_empty() => Some(port.parse::<u16>().map_err(|_| invalid())?),
            _ => None,
        };

        let pathname = remove_dot_segments(extract_path(input));
        let search = extract_search(input).to_string();
        let hash = extract_hash(input).to_string();

        let mut url = Self {
            href: String::new(),
            scheme,
            hostname,
            port,
            pathname,
            search,
            hash,
        };
        url.href = format!("{}{}{}{}", url.origin(), url.pathname, url.search, url.hash);
        Ok(url)
    }

    /// Resolve `input` against `base`, the way `fetch(input)` does inside a page.
    pub fn resolve(input: &str, base: Option<&str>) -> Result<Self, NetworkError> {
        let input = input.trim();
        if get_scheme_end(input).is_some() {
            return Self::parse(input);
        }
        let base = match base {
            Some(base) => Self::parse(base)?,
            None => return Err(NetworkError::InvalidUrl(input.to_string())),
        };

        let href = if let Some(rest) = input.strip_prefix("//") {
            format!("{}://{}", base.scheme, rest)
        } else if input.starts_with('/') {
            format!("{}{}", base.origin(), input)
        } else if input.starts_with('?') {
            format!("{}{}{}", base.origin(), base.pathname, input)
        } else if input.starts_with('#') {
            format!("{}{}{}{}", base.origin(), base.pathname, base.search, input)
        } else if input.is_empty() {
            format!("{}{}{}", base.origin(), base.pathname, base.search)
        } else {
            let dir_end = base.pathname.rfind('/').map_or(0, |i| i + 1);
            format!("{}/{}{}", base.origin(), &base.pathname[1.min(dir_end)..dir_end], input)
        };
        Self::parse(&href)
    }

    /// `scheme://host[:port]`.
    pub fn origin(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}", self.scheme, self.hostname, port),
            None => format!("{}://{}", self.scheme, self.hostname),
        }
    }

    /// Path and query, the part a path rule matches against.
    pub fn path_and_search(&self) -> String {
        format!("{}{}", self.pathname, self.search)
    }
}

impl fmt::Display for RequestUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.href)
    }
}

fn remove_dot_segments(path: &str) -> String {
    if !path.contains("/.") {
        return path.to_string();
    }
    let mut output: Vec<&str> = Vec::new();
    let segments: Vec<&str> = path.split('/').skip(1).collect();
    for (i, segment) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();
        match *segment {
            "." => {
                if last {
                    output.push("");
                }
            }
            ".." => {
                output.pop();
                if last {
                    output.push("");
                }
            }
            other => output.push(other),
        }
    }
    format!("/{}", output.join("/"))
}
