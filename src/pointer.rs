//! JSON Pointer paths (RFC 6901) over model state.
use std::fmt;

/// One step of a resolved path. Whether a token is a field or an index is
/// only known once the container type is known, so raw tokens stay strings
/// until then.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Seg {
    Field(String),
    Index(usize),
}

impl fmt::Display for Seg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seg::Field(name) => f.write_str(&escape(name)),
            Seg::Index(i) => write!(f, "{i}"),
        }
    }
}

/// `[]` → `""`, `[items, 0]` → `"/items/0"`.
pub fn format(path: &[Seg]) -> String {
    let mut out = String::new();
    for seg in path {
        out.push('/');
        out.push_str(&seg.to_string());
    }
    out
}

/// Split a pointer into unescaped reference tokens. `""` addresses the whole
/// target and yields no tokens.
pub fn split(pointer: &str) -> Option<Vec<String>> {
    if pointer.is_empty() {
        return Some(Vec::new());
    }
    let rest = pointer.strip_prefix('/')?;
    Some(rest.split('/').map(unescape).collect())
}

pub fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

pub fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Navigate a JSON tree along an already-typed path.
pub fn get<'a>(mut node: &'a serde_json::Value, path: &[Seg]) -> Option<&'a serde_json::Value> {
    for seg in path {
        node = match seg {
            Seg::Field(name) => node.as_object()?.get(name)?,
            Seg::Index(i) => node.as_array()?.get(*i)?,
        };
    }
    Some(node)
}

pub fn get_mut<'a>(
    mut node: &'a mut serde_json::Value,
    path: &[Seg],
) -> Option<&'a mut serde_json::Value> {
    for seg in path {
        node = match seg {
            Seg::Field(name) => node.as_object_mut()?.get_mut(name)?,
            Seg::Index(i) => node.as_array_mut()?.get_mut(*i)?,
        };
    }
    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn split_unescapes_tokens() {
        assert_eq!(split(""), Some(vec![]));
        assert_eq!(split("/a~1b/~0c/-"), Some(vec!["a/b".into(), "~c".into(), "-".into()]));
        assert_eq!(split("count"), None);
    }

    #[test]
    fn format_escapes_fields() {
        let path = vec![Seg::Field("a/b".into()), Seg::Index(3)];
        assert_eq!(format(&path), "/a~1b/3");
        assert_eq!(format(&[]), "");
    }

    #[test]
    fn get_follows_fields_and_indices() {
        let doc = json!({"items": [{"name": "x"}, {"name": "y"}]});
        let path = vec![Seg::Field("items".into()), Seg::Index(1), Seg::Field("name".into())];
        assert_eq!(get(&doc, &path), Some(&json!("y")));
        assert_eq!(get(&doc, &[Seg::Field("items".into()), Seg::Index(5)]), None);
    }
}
