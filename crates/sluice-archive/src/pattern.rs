//! Path globs compiled to anchored regular expressions.
//!
//! Supported syntax: `*` (any run inside one segment), `**` (any number of
//! whole segments, including none), `?`, `[abc]` / `[!abc]` / `[a-z]` classes
//! and `{a,b}` alternation. A pattern without `/` matches the last segment of
//! a path, so `*.log` matches `var/app/x.log`.

use regex::Regex;

use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct Glob {
    source: String,
    regex: Regex,
    basename_only: bool,
}

impl Glob {
    pub fn new(pattern: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };
        if pattern.is_empty() {
            return Err(invalid("empty pattern"));
        }

        let trimmed = pattern.trim_start_matches("./");
        let basename_only = !trimmed.contains('/');
        let body = translate(trimmed).map_err(invalid)?;
        let regex = Regex::new(&format!("^{body}$")).map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            basename_only,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a normalized, `/`-separated path. A trailing `/` is ignored.
    pub fn is_match(&self, path: &str) -> bool {
        let path = path.trim_end_matches('/');
        if self.basename_only {
            let name = path.rsplit('/').next().unwrap_or(path);
            self.regex.is_match(name)
        } else {
            self.regex.is_match(path)
        }
    }
}

fn translate(pattern: &str) -> std::result::Result<String, &'static str> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut in_group = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' => {
                let double = chars.get(i + 1) == Some(&'*');
                if double {
                    let at_start = i == 0 || chars[i - 1] == '/';
                    let slash_after = chars.get(i + 2) == Some(&'/');
                    let at_end = i + 2 == chars.len();
                    if at_start && slash_after {
                        // `**/` also matches zero directories.
                        out.push_str("(?:.*/)?");
                        i += 3;
                        continue;
                    }
                    if at_start && at_end {
                        out.push_str(".*");
                        i += 2;
                        continue;
                    }
                    return Err("`**` must be a whole path segment");
                }
                out.push_str("[^/]*");
            }
            '?' => out.push_str("[^/]"),
            '[' => {
                let mut j = i + 1;
                let mut class = String::from("[");
                if matches!(chars.get(j), Some('!') | Some('^')) {
                    class.push('^');
                    j += 1;
                }
                let first = j;
                while j < chars.len() && (chars[j] != ']' || j == first) {
                    let cc = chars[j];
                    if cc == '\\' || cc == '[' {
                        class.push('\\');
                    }
                    class.push(cc);
                    j += 1;
                }
                if j >= chars.len() {
                    return Err("unclosed character class");
                }
                class.push(']');
                out.push_str(&class);
                i = j;
            }
            '{' => {
                if in_group {
                    return Err("nested alternation is not supported");
                }
                in_group = true;
                out.push_str("(?:");
            }
            '}' if in_group => {
                in_group = false;
                out.push(')');
            }
            ',' if in_group => out.push('|'),
            other => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
        i += 1;
    }

    if in_group {
        return Err("unclosed alternation");
    }
    Ok(out)
}

/// An ordered set of globs.
#[derive(Clone, Debug, Default)]
pub struct GlobSet {
    globs: Vec<Glob>,
}

impl GlobSet {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let globs = patterns
            .into_iter()
            .map(|p| Glob::new(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { globs })
    }

    pub fn is_empty(&self) -> bool {
        self.globs.is_empty()
    }

    /// The first glob matching `path`.
    pub fn first_match(&self, path: &str) -> Option<&Glob> {
        self.globs.iter().find(|g| g.is_match(path))
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.first_match(path).is_some()
    }
}
