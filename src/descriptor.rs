//! Content descriptor handed over by the extraction step.
//!
//! The shape mirrors the JSON produced by the reader-mode extractor, so field
//! names are camelCase and most fields are optional. Everything here is raw
//! input; [`crate::epub::Book::build`] is where defaults and validation live.

use serde::Deserialize;

/// Everything the extractor knows about a captured page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDescriptor {
    /// Book title. Required.
    #[serde(default)]
    pub title: String,

    /// Two letter language code.
    #[serde(default)]
    pub language: Option<String>,

    /// Book identifier. Generated when absent.
    #[serde(default)]
    pub guid: Option<String>,

    /// Creators, in order.
    #[serde(default)]
    pub creators: Option<OneOrMany<CreatorInput>>,

    /// Single creator or list, as some extractors emit it.
    #[serde(default)]
    pub creator: Option<OneOrMany<CreatorInput>>,

    /// Author shorthand.
    #[serde(default)]
    pub author: Option<OneOrMany<CreatorInput>>,

    /// Authors shorthand.
    #[serde(default)]
    pub authors: Option<OneOrMany<CreatorInput>>,

    /// Book description.
    #[serde(default)]
    pub description: Option<Description>,

    /// Publication time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub published: Option<i64>,

    /// Documents making up the reading order.
    #[serde(default)]
    pub chapters: Vec<ChapterInput>,

    /// Images and other assets referenced by the chapters.
    #[serde(default)]
    pub resources: Vec<ResourceInput>,

    /// Name of the chapter acting as cover page.
    #[serde(default)]
    pub cover: Option<String>,

    /// Name of the chapter acting as table of contents.
    #[serde(default)]
    pub nav: Option<String>,

    /// Tag the nav chapter with the EPUB 3 `nav` property.
    #[serde(default)]
    pub mark_nav: bool,

    /// Package document override: `false` omits it, an object is used verbatim.
    #[serde(default)]
    pub opf: Option<DocumentOverride>,

    /// Navigation document override, same rules as `opf`.
    #[serde(default)]
    pub ncx: Option<DocumentOverride>,

    /// Output file name.
    #[serde(default)]
    pub name: Option<String>,
}

/// A field that may hold one value or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// A list of values.
    Many(Vec<T>),
    /// A single value.
    One(T),
}

impl<T> OneOrMany<T> {
    /// Flatten into a list.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

/// A creator as given by the extractor.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CreatorInput {
    /// Just a name.
    Name(String),
    /// Full record.
    Full {
        /// Display name.
        #[serde(default)]
        name: String,
        /// MARC relator, e.g. `author`.
        #[serde(default)]
        role: Option<String>,
        /// Sort name.
        #[serde(default, rename = "as")]
        file_as: Option<String>,
        /// Short biography.
        #[serde(default)]
        bio: Option<String>,
    },
}

/// Book description, either plain text or a long/short pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Description {
    /// Plain text.
    Text(String),
    /// Long and short variants.
    Detailed {
        /// Long form.
        #[serde(default)]
        full: Option<String>,
        /// Short form.
        #[serde(default)]
        short: Option<String>,
    },
}

impl Description {
    /// Text used in the package document, preferring the long form.
    pub fn text(&self) -> Option<&str> {
        let text = match self {
            Description::Text(text) => Some(text.as_str()),
            Description::Detailed { full, short } => full
                .as_deref()
                .filter(|s| !s.is_empty())
                .or(short.as_deref()),
        };
        text.filter(|s| !s.is_empty())
    }
}

/// A chapter as given by the extractor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterInput {
    /// Relative path inside the package.
    #[serde(default)]
    pub name: Option<String>,
    /// Title for the table of contents.
    #[serde(default)]
    pub title: String,
    /// Body markup.
    #[serde(default)]
    pub content: String,
    /// Media type or file extension.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Whether the chapter is part of the linear reading order.
    #[serde(default)]
    pub linear: Option<bool>,
}

/// A resource as given by the extractor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInput {
    /// Locator to fetch the content from.
    #[serde(default)]
    pub src: Option<String>,
    /// Inline content, UTF-8 text or base64 when `options.base64` is set.
    #[serde(default)]
    pub content: Option<String>,
    /// Path the chapters reference the resource by.
    #[serde(default)]
    pub name: Option<String>,
    /// Media type or file extension.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Encoding flags.
    #[serde(default)]
    pub options: Option<ContentOptions>,
}

/// Encoding flags attached to inline content.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ContentOptions {
    /// Content is base64 encoded binary.
    #[serde(default)]
    pub base64: bool,
}

/// Caller override for a derived document.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DocumentOverride {
    /// `false` omits the document, `true` keeps the generated one.
    Flag(bool),
    /// A pre-built document used verbatim.
    Document(DocumentInput),
}

/// A pre-built document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInput {
    /// File name under `OEBPS/`.
    pub name: String,
    /// Media type.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Full document text.
    pub content: String,
}

impl ContentDescriptor {
    /// Parse a descriptor from JSON.
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_extractor_output() {
        let json = r#"{
            "title": "Article",
            "description": "Offline reader version of https://example.com/a",
            "language": "en",
            "creator": [{"name": "Jane Doe", "role": "author"}],
            "chapters": [{
                "name": "content.xhtml",
                "title": "Article",
                "content": "<div>hi</div>",
                "mimeType": "application/xhtml+xml",
                "linear": true
            }],
            "resources": [{"src": "https://example.com/a.png", "name": "abc/a.png"}]
        }"#;

        let descriptor = ContentDescriptor::from_json(json).unwrap();
        assert_eq!(descriptor.title, "Article");
        assert_eq!(descriptor.chapters.len(), 1);
        assert_eq!(descriptor.chapters[0].linear, Some(true));
        assert_eq!(
            descriptor.resources[0].src.as_deref(),
            Some("https://example.com/a.png")
        );

        let creators = descriptor.creator.unwrap().into_vec();
        assert!(matches!(
            &creators[0],
            CreatorInput::Full { name, role, .. } if name == "Jane Doe" && role.as_deref() == Some("author")
        ));
    }

    #[test]
    fn document_override_accepts_false_and_objects() {
        let descriptor = ContentDescriptor::from_json(
            r#"{"title": "T", "ncx": false, "opf": {"name": "book.opf", "content": "<package/>"}}"#,
        )
        .unwrap();

        assert!(matches!(descriptor.ncx, Some(DocumentOverride::Flag(false))));
        assert!(matches!(
            descriptor.opf,
            Some(DocumentOverride::Document(ref doc)) if doc.name == "book.opf"
        ));
    }

    #[test]
    fn description_prefers_full_text() {
        let detailed = Description::Detailed {
            full: Some("long".to_string()),
            short: Some("short".to_string()),
        };
        assert_eq!(detailed.text(), Some("long"));

        let short_only = Description::Detailed {
            full: None,
            short: Some("short".to_string()),
        };
        assert_eq!(short_only.text(), Some("short"));

        assert_eq!(Description::Text(String::new()).text(), None);
    }

    #[test]
    fn single_author_string() {
        let descriptor =
            ContentDescriptor::from_json(r#"{"title": "T", "author": "Jane"}"#).unwrap();
        let authors = descriptor.author.unwrap().into_vec();
        assert!(matches!(&authors[0], CreatorInput::Name(n) if n == "Jane"));
    }
}
