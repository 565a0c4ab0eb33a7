use crate::error::ValidationError;

/// One step from a container to a child.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

impl From<&str> for PathStep {
    fn from(key: &str) -> Self {
        PathStep::Key(key.to_string())
    }
}

impl From<usize> for PathStep {
    fn from(index: usize) -> Self {
        PathStep::Index(index)
    }
}

/// Parse a JSON pointer (`/a/0/b`). Numeric tokens become indices; `~1` and
/// `~0` unescape to `/` and `~`.
pub fn parse_pointer(pointer: &str) -> Result<Vec<PathStep>, ValidationError> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(ValidationError::InvalidPath(pointer.to_string()));
    };
    let mut out = Vec::new();
    for token in rest.split('/') {
        let token = unescape(token).ok_or_else(|| ValidationError::InvalidPath(pointer.to_string()))?;
        match token.parse::<usize>() {
            Ok(index) if !token.starts_with('+') => out.push(PathStep::Index(index)),
            _ => out.push(PathStep::Key(token)),
        }
    }
    Ok(out)
}

fn unescape(token: &str) -> Option<String> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

pub fn format_pointer(path: &[PathStep]) -> String {
    let mut out = String::new();
    for step in path {
        out.push('/');
        match step {
            PathStep::Key(key) => out.push_str(&key.replace('~', "~0").replace('/', "~1")),
            PathStep::Index(index) => out.push_str(&index.to_string()),
        }
    }
    out
}
