//! Performance-oriented JSON aliases and the response path type.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// A JSON object.
pub type Object = serde_json_bytes::Map<serde_json_bytes::ByteString, serde_json_bytes::Value>;

/// A JSON value.
pub type Value = serde_json_bytes::Value;

/// One element of a [`Path`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash)]
#[serde(untagged)]
pub enum PathElement {
    /// An index within a list.
    Index(usize),

    /// A key within an object.
    Key(String),
}

/// A path into the response data, as found in the `path` of a GraphQL error.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Hash)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    pub fn empty() -> Path {
        Path(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<PathElement>> for Path {
    fn from(elements: Vec<PathElement>) -> Self {
        Path(elements)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in self.0.iter() {
            write!(f, "/")?;
            match element {
                PathElement::Index(index) => write!(f, "{index}")?,
                PathElement::Key(key) => write!(f, "{key}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_serializes_as_mixed_array() {
        let path = Path::from(vec![
            PathElement::Key("topProducts".to_string()),
            PathElement::Index(2),
            PathElement::Key("name".to_string()),
        ]);
        let serialized = serde_json::to_string(&path).unwrap();
        assert_eq!(serialized, r#"["topProducts",2,"name"]"#);

        let roundtripped: Path = serde_json::from_str(&serialized).unwrap();
        assert_eq!(roundtripped, path);
    }

    #[test]
    fn path_displays_with_slashes() {
        let path = Path::from(vec![
            PathElement::Key("topProducts".to_string()),
            PathElement::Index(2),
        ]);
        assert_eq!(path.to_string(), "/topProducts/2");
    }
}
