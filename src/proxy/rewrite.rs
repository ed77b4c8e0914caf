//! Request header rewriting for the origin leg.
//!
//! The rewriter is fed the client's raw header lines one at a time and hands
//! back the line to forward, so the caller can stream each one to the origin
//! as soon as it is read. Once the client's block ends, [`HeaderRewriter::finish`]
//! yields whichever canonical headers never appeared, followed by the blank
//! line.

use std::borrow::Cow;

use crate::http::headers::{contains_bytes, line_name};

/// The `User-Agent` sent to origins unless configured otherwise.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:10.0.3) Gecko/20120305 Firefox/10.0.3";

const PROXY_CONNECTION_CLOSE: &[u8] = b"Proxy-Connection: close\r\n";
const CONNECTION_CLOSE: &[u8] = b"Connection: close\r\n";

/// Which canonical header a client line was classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Canonical {
    ProxyConnection,
    Connection,
    UserAgent,
    Host,
}

impl Canonical {
    /// Case-sensitive substring match on the header name. `Proxy-Connection`
    /// is tested before `Connection`, which it contains.
    fn classify(line: &[u8]) -> Option<Self> {
        let name = line_name(line);
        if contains_bytes(name, b"Proxy-Connection") {
            Some(Self::ProxyConnection)
        } else if contains_bytes(name, b"Connection") {
            Some(Self::Connection)
        } else if contains_bytes(name, b"User-Agent") {
            Some(Self::UserAgent)
        } else if contains_bytes(name, b"Host") {
            Some(Self::Host)
        } else {
            None
        }
    }
}

/// Streaming header rewriter for one forwarded request.
#[derive(Debug)]
pub struct HeaderRewriter<'a> {
    host: &'a str,
    port: u16,
    user_agent_line: Vec<u8>,
    seen_proxy_connection: bool,
    seen_connection: bool,
    seen_user_agent: bool,
    seen_host: bool,
}

impl<'a> HeaderRewriter<'a> {
    /// Creates a rewriter that injects `Host: host:port` and `User-Agent: user_agent`
    /// when the client omits them.
    pub fn new(host: &'a str, port: u16, user_agent: &str) -> Self {
        Self {
            host,
            port,
            user_agent_line: format!("User-Agent: {user_agent}\r\n").into_bytes(),
            seen_proxy_connection: false,
            seen_connection: false,
            seen_user_agent: false,
            seen_host: false,
        }
    }

    /// Returns the line to forward in place of the client's `line`.
    ///
    /// `Proxy-Connection` and `Connection` are forced to `close`, `User-Agent`
    /// is replaced, and everything else (including `Host`) passes through.
    pub fn rewrite_line<'l>(&mut self, line: &'l [u8]) -> Cow<'l, [u8]> {
        match Canonical::classify(line) {
            Some(Canonical::ProxyConnection) => {
                self.seen_proxy_connection = true;
                Cow::Borrowed(PROXY_CONNECTION_CLOSE)
            }
            Some(Canonical::Connection) => {
                self.seen_connection = true;
                Cow::Borrowed(CONNECTION_CLOSE)
            }
            Some(Canonical::UserAgent) => {
                self.seen_user_agent = true;
                Cow::Owned(self.user_agent_line.clone())
            }
            Some(Canonical::Host) => {
                self.seen_host = true;
                Cow::Borrowed(line)
            }
            None => Cow::Borrowed(line),
        }
    }

    /// Consumes the rewriter and returns the trailing lines: every canonical
    /// header not yet seen, in fixed order, then the terminating blank line.
    pub fn finish(self) -> Vec<Vec<u8>> {
        let mut lines = Vec::with_capacity(5);
        if !self.seen_proxy_connection {
            lines.push(PROXY_CONNECTION_CLOSE.to_vec());
        }
        if !self.seen_connection {
            lines.push(CONNECTION_CLOSE.to_vec());
        }
        if !self.seen_host {
            lines.push(format!("Host: {}:{}\r\n", self.host, self.port).into_bytes());
        }
        if !self.seen_user_agent {
            lines.push(self.user_agent_line);
        }
        lines.push(b"\r\n".to_vec());
        lines
    }
}

/// Rewrites a complete header block at once.
///
/// `header_lines` excludes the terminating blank line; the output includes it.
pub fn rewrite<'l, I>(header_lines: I, host: &str, port: u16, user_agent: &str) -> Vec<Vec<u8>>
where
    I: IntoIterator<Item = &'l [u8]>,
{
    let mut rewriter = HeaderRewriter::new(host, port, user_agent);
    let mut out: Vec<Vec<u8>> = header_lines
        .into_iter()
        .map(|line| rewriter.rewrite_line(line).into_owned())
        .collect();
    out.extend(rewriter.finish());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_text(lines: &[Vec<u8>]) -> Vec<String> {
        lines
            .iter()
            .map(|l| String::from_utf8(l.clone()).unwrap())
            .collect()
    }

    #[test]
    fn empty_input_yields_all_canonical_headers_in_order() {
        let out = rewrite(Vec::<&[u8]>::new(), "example.com", 80, DEFAULT_USER_AGENT);
        assert_eq!(
            as_text(&out),
            vec![
                "Proxy-Connection: close\r\n".to_owned(),
                "Connection: close\r\n".to_owned(),
                "Host: example.com:80\r\n".to_owned(),
                format!("User-Agent: {DEFAULT_USER_AGENT}\r\n"),
                "\r\n".to_owned(),
            ]
        );
    }

    #[test]
    fn client_headers_are_rewritten_in_place() {
        let input: Vec<&[u8]> = vec![
            b"Host: www.cmu.edu\r\n",
            b"User-Agent: curl/8.0\r\n",
            b"Connection: keep-alive\r\n",
            b"Proxy-Connection: keep-alive\r\n",
            b"Accept: */*\r\n",
        ];
        let out = rewrite(input, "www.cmu.edu", 80, "agent/1");
        assert_eq!(
            as_text(&out),
            vec![
                "Host: www.cmu.edu\r\n",
                "User-Agent: agent/1\r\n",
                "Connection: close\r\n",
                "Proxy-Connection: close\r\n",
                "Accept: */*\r\n",
                "\r\n",
            ]
        );
    }

    #[test]
    fn only_missing_headers_are_appended() {
        let input: Vec<&[u8]> = vec![b"Host: a:1\r\n", b"Connection: close\r\n"];
        let out = rewrite(input, "a", 1, "ua");
        assert_eq!(
            as_text(&out),
            vec![
                "Host: a:1\r\n",
                "Connection: close\r\n",
                "Proxy-Connection: close\r\n",
                "User-Agent: ua\r\n",
                "\r\n",
            ]
        );
    }

    #[test]
    fn matching_is_case_sensitive() {
        let input: Vec<&[u8]> = vec![b"connection: keep-alive\r\n", b"host: a\r\n"];
        let out = rewrite(input, "a", 80, "ua");
        let text = as_text(&out);
        assert_eq!(text[0], "connection: keep-alive\r\n");
        assert_eq!(text[1], "host: a\r\n");
        assert!(text.contains(&"Connection: close\r\n".to_owned()));
        assert!(text.contains(&"Host: a:80\r\n".to_owned()));
    }

    #[test]
    fn values_do_not_trigger_classification() {
        let input: Vec<&[u8]> = vec![b"Referer: http://Host/Connection\r\n"];
        let out = rewrite(input, "a", 80, "ua");
        assert_eq!(out[0], b"Referer: http://Host/Connection\r\n");
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn streaming_matches_batch() {
        let mut rw = HeaderRewriter::new("h", 8080, "ua");
        assert_eq!(
            rw.rewrite_line(b"Proxy-Connection: keep-alive\r\n").as_ref(),
            PROXY_CONNECTION_CLOSE
        );
        assert_eq!(rw.rewrite_line(b"X-A: 1\r\n").as_ref(), b"X-A: 1\r\n");
        let tail = as_text(&rw.finish());
        assert_eq!(
            tail,
            vec![
                "Connection: close\r\n",
                "Host: h:8080\r\n",
                "User-Agent: ua\r\n",
                "\r\n",
            ]
        );
    }
}
