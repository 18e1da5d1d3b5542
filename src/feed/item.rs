//! Minimal element tree for a single `<item>` / `<entry>` fragment.
//!
//! The parser streams the document with `quick-xml` and materialises only
//! the item subtrees, which the normaliser then queries by element name.

/// A node inside an item fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element with its qualified name (e.g. `media:content`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// Value of the attribute with the given qualified name.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Direct child elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// Direct children whose qualified name equals `name`.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.elements().filter(move |el| el.name == name)
    }

    /// First direct child whose qualified name is any of `names`, tried in order.
    pub fn first_of(&self, names: &[&str]) -> Option<&Element> {
        names
            .iter()
            .find_map(|name| self.elements().find(|el| el.name == *name))
    }

    /// Concatenated text of this element and all descendants, like DOM `textContent`.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    /// Trimmed text of the first child named any of `names`, if non-empty.
    pub fn child_text(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| {
            self.children_named(name)
                .map(|el| el.text().trim().to_string())
                .find(|text| !text.is_empty())
        })
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Element(el) => el.collect_text(out),
            }
        }
    }
}

pub fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}
