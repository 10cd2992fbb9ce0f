use regex::Regex;

/// Compiled endpoint-scope entry.
///
/// An entry without wildcards is an exact match. An entry whose only
/// wildcards form a trailing `*` run is a prefix match. Anything else is a
/// glob: `*` spans one path segment, `**` spans any number, `?` is one
/// non-separator character.
#[derive(Debug, Clone)]
pub enum EndpointMatcher {
    Exact(String),
    Prefix(String),
    Glob { source: String, regex: Regex },
}

impl EndpointMatcher {
    /// Compile a single endpoint entry.
    pub fn compile(entry: &str) -> Result<Self, regex::Error> {
        if !has_wildcard(entry) {
            return Ok(EndpointMatcher::Exact(entry.to_string()));
        }

        let stem = entry.trim_end_matches('*');
        if stem.len() < entry.len() && !has_wildcard(stem) {
            return Ok(EndpointMatcher::Prefix(stem.to_string()));
        }

        let regex = Regex::new(&glob_to_regex(entry))?;
        Ok(EndpointMatcher::Glob {
            source: entry.to_string(),
            regex,
        })
    }

    #[inline]
    pub fn matches(&self, endpoint: &str) -> bool {
        match self {
            EndpointMatcher::Exact(path) => endpoint == path,
            EndpointMatcher::Prefix(prefix) => endpoint.starts_with(prefix.as_str()),
            EndpointMatcher::Glob { regex, .. } => regex.is_match(endpoint),
        }
    }

    /// The entry as written in the rule definition.
    pub fn source(&self) -> String {
        match self {
            EndpointMatcher::Exact(path) => path.clone(),
            EndpointMatcher::Prefix(prefix) => format!("{}*", prefix),
            EndpointMatcher::Glob { source, .. } => source.clone(),
        }
    }
}

fn has_wildcard(s: &str) -> bool {
    s.contains(['*', '?'])
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');

    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }

    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact() {
        let m = EndpointMatcher::compile("/v1/chat").unwrap();
        assert!(matches!(m, EndpointMatcher::Exact(_)));
        assert!(m.matches("/v1/chat"));
        assert!(!m.matches("/v1/chat/completions"));
    }

    #[test]
    fn test_prefix_wildcard() {
        let m = EndpointMatcher::compile("/v1/chat/*").unwrap();
        assert!(matches!(m, EndpointMatcher::Prefix(_)));
        assert!(m.matches("/v1/chat/completions"));
        assert!(m.matches("/v1/chat/completions/stream"));
        assert!(!m.matches("/v1/other"));
        assert_eq!(m.source(), "/v1/chat/*");
    }

    #[test]
    fn test_glob_single_segment() {
        let m = EndpointMatcher::compile("/v1/*/completions").unwrap();
        assert!(matches!(m, EndpointMatcher::Glob { .. }));
        assert!(m.matches("/v1/chat/completions"));
        assert!(!m.matches("/v1/chat/x/completions"));
    }

    #[test]
    fn test_glob_double_star_and_question() {
        let m = EndpointMatcher::compile("/v?/**/tools").unwrap();
        assert!(m.matches("/v1/agents/a/b/tools"));
        assert!(!m.matches("/v10/agents/tools"));
    }

    #[test]
    fn test_glob_escapes_regex_metacharacters() {
        let m = EndpointMatcher::compile("/api/v1.0/*/run").unwrap();
        assert!(m.matches("/api/v1.0/jobs/run"));
        assert!(!m.matches("/api/v1x0/jobs/run"));
    }
}
