//! Book model and package assembly.

use crate::descriptor::{
    ContentDescriptor, CreatorInput, Description, DocumentInput, DocumentOverride, ResourceInput,
};
use crate::epub::loader::{LoadOptions, ResourceLoader, fallback_name, name_from_src};
use crate::epub::{
    EPUB_MIME_TYPE, NCX_MIME_TYPE, OPF_MIME_TYPE, XHTML_MIME_TYPE, clean_path,
    mime_type_for_name, normalize_mime_type, templates,
};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

/// Name used when the descriptor names no author.
pub const UNKNOWN_AUTHOR: &str = "<unknown>";

/// Role marking the main author.
pub const AUTHOR_ROLE: &str = "author";

/// Generate a fresh book identifier (UUID v4).
pub fn new_guid() -> String {
    Uuid::new_v4().to_string()
}

/// A person credited for the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creator {
    /// Display name.
    pub name: String,
    /// MARC relator such as `author` or `edt`.
    pub role: Option<String>,
    /// Sort name.
    pub file_as: Option<String>,
    /// Short biography.
    pub bio: Option<String>,
}

impl Creator {
    /// Whether this creator is an author.
    pub fn is_author(&self) -> bool {
        self.role.as_deref() == Some(AUTHOR_ROLE)
    }
}

/// A content document in the reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// Path relative to `OEBPS/`.
    pub name: String,
    /// Title shown in the table of contents.
    pub title: String,
    /// Complete XHTML document.
    pub content: String,
    /// Media type.
    pub mime_type: String,
    /// Part of the linear reading order.
    pub linear: bool,
}

/// How resource content is stored in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentEncoding {
    /// UTF-8 text, written as-is.
    #[default]
    Utf8,
    /// Base64 encoded binary, decoded when archived.
    Base64,
}

/// A non-chapter asset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resource {
    /// Where the content comes from.
    pub src: Option<String>,
    /// Path relative to `OEBPS/`.
    pub name: Option<String>,
    /// Media type.
    pub mime_type: Option<String>,
    /// Loaded or inline content.
    pub content: Option<String>,
    /// Encoding of `content`.
    pub encoding: ContentEncoding,
}

impl Resource {
    /// Whether the resource has everything it needs to be packaged.
    pub fn is_embeddable(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.is_empty())
            && self.name.as_deref().is_some_and(|n| !n.is_empty())
    }

    /// Whether the loader still has to fetch this resource.
    pub fn needs_loading(&self) -> bool {
        self.src.is_some() && self.content.as_deref().is_none_or(str::is_empty)
    }
}

/// A derived document (package or navigation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path relative to `OEBPS/`.
    pub name: String,
    /// Media type.
    pub mime_type: String,
    /// Full text.
    pub content: String,
}

/// Where a derived document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSlot {
    /// Rendered from the book, refreshed when the book changes.
    Generated(Document),
    /// Supplied by the caller, used verbatim.
    Provided(Document),
    /// Left out of the package.
    Omitted,
}

impl DocumentSlot {
    /// The document, unless omitted.
    pub fn document(&self) -> Option<&Document> {
        match self {
            DocumentSlot::Generated(doc) | DocumentSlot::Provided(doc) => Some(doc),
            DocumentSlot::Omitted => None,
        }
    }

    /// Whether the document is rendered from the book.
    pub fn is_generated(&self) -> bool {
        matches!(self, DocumentSlot::Generated(_))
    }

    fn from_override(value: Option<DocumentOverride>, default_name: &str, mime_type: &str) -> Self {
        match value {
            Some(DocumentOverride::Flag(false)) => DocumentSlot::Omitted,
            Some(DocumentOverride::Document(DocumentInput {
                name,
                mime_type: declared,
                content,
            })) => DocumentSlot::Provided(Document {
                name: clean_path(&name).unwrap_or_else(|| default_name.to_string()),
                mime_type: declared.unwrap_or_else(|| mime_type.to_string()),
                content,
            }),
            Some(DocumentOverride::Flag(true)) | None => DocumentSlot::Generated(Document {
                name: default_name.to_string(),
                mime_type: mime_type.to_string(),
                content: String::new(),
            }),
        }
    }
}

/// A file ready to be written into the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Full path inside the archive.
    pub path: String,
    /// Text, or base64 when `is_binary` is set.
    pub content: String,
    /// Content must be base64-decoded before writing.
    pub is_binary: bool,
}

impl FileEntry {
    fn text(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            is_binary: false,
        }
    }
}

/// The book being packaged.
#[derive(Debug, Clone)]
pub struct Book {
    /// Book title.
    pub title: String,
    /// Language code.
    pub language: String,
    /// Unique identifier.
    pub guid: String,
    /// Creators, at least one of them an author.
    pub creators: Vec<Creator>,
    /// Reading order.
    pub chapters: Vec<Chapter>,
    /// Assets referenced by the chapters.
    pub resources: Vec<Resource>,
    /// Name of the cover chapter.
    pub cover: Option<String>,
    /// Name of the table-of-contents chapter.
    pub nav: Option<String>,
    /// Tag the nav chapter with the `nav` property.
    pub mark_nav: bool,
    /// Publication time.
    pub published: Option<DateTime<Utc>>,
    /// Description.
    pub description: Option<Description>,
    /// Suggested file name of the package.
    pub name: String,
    /// Package document.
    pub opf: DocumentSlot,
    /// Navigation document.
    pub ncx: DocumentSlot,
}

impl Book {
    /// Build a book from an extractor descriptor.
    ///
    /// Validates the descriptor, fills in defaults, frames every chapter and
    /// renders the package and navigation documents that were not overridden.
    pub fn build(descriptor: ContentDescriptor) -> Result<Self> {
        let ContentDescriptor {
            title,
            language,
            guid,
            creators,
            creator,
            author,
            authors,
            description,
            published,
            chapters,
            resources,
            cover,
            nav,
            mark_nav,
            opf,
            ncx,
            name,
        } = descriptor;

        if title.trim().is_empty() {
            return Err(AppError::Validation("title is required".to_string()));
        }
        if chapters.is_empty() {
            return Err(AppError::Validation(
                "at least one chapter is required".to_string(),
            ));
        }

        let language = language
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| "en".to_string());

        let guid = guid
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .unwrap_or_else(new_guid);

        let mut creators = flatten_creators([
            (creators, false),
            (creator, false),
            (author, true),
            (authors, true),
        ]);
        if !creators.iter().any(Creator::is_author) {
            creators.push(Creator {
                name: UNKNOWN_AUTHOR.to_string(),
                role: Some(AUTHOR_ROLE.to_string()),
                file_as: None,
                bio: None,
            });
        }

        let mut names = HashSet::new();
        let mut framed = Vec::with_capacity(chapters.len());
        for (i, chapter) in chapters.into_iter().enumerate() {
            let chapter_name = chapter
                .name
                .as_deref()
                .and_then(clean_path)
                .unwrap_or_else(|| format!("chapter{}.xhtml", i + 1));
            if !names.insert(chapter_name.clone()) {
                return Err(AppError::Validation(format!(
                    "duplicate chapter name: {}",
                    chapter_name
                )));
            }

            framed.push(Chapter {
                content: templates::render_xhtml_frame(&chapter.title, &language, &chapter.content),
                name: chapter_name,
                title: chapter.title,
                mime_type: chapter
                    .mime_type
                    .as_deref()
                    .map(normalize_mime_type)
                    .unwrap_or_else(|| XHTML_MIME_TYPE.to_string()),
                linear: chapter.linear.unwrap_or(true),
            });
        }

        for (field, reference) in [("cover", &cover), ("nav", &nav)] {
            if let Some(reference) = reference
                && !names.contains(reference)
            {
                return Err(AppError::Validation(format!(
                    "{} refers to unknown chapter: {}",
                    field, reference
                )));
            }
        }

        let published = match published {
            Some(ms) => Some(DateTime::from_timestamp_millis(ms).ok_or_else(|| {
                AppError::Validation(format!("published timestamp out of range: {}", ms))
            })?),
            None => None,
        };

        let opf = DocumentSlot::from_override(opf, "content.opf", OPF_MIME_TYPE);
        let ncx = DocumentSlot::from_override(ncx, "content.ncx", NCX_MIME_TYPE);
        for doc in [opf.document(), ncx.document()].into_iter().flatten() {
            if !names.insert(doc.name.clone()) {
                return Err(AppError::Validation(format!(
                    "package path used twice: {}",
                    doc.name
                )));
            }
        }

        let resources = normalize_resources(resources, &names)?;

        let author_name = creators
            .iter()
            .find(|c| c.is_author())
            .map(|c| c.name.clone())
            .unwrap_or_default();
        let name = name.filter(|n| !n.is_empty()).unwrap_or_else(|| {
            if author_name.is_empty() {
                format!("{}.epub", title)
            } else {
                format!("{} - {}.epub", author_name, title)
            }
        });

        let mut book = Book {
            title,
            language,
            guid,
            creators,
            chapters: framed,
            resources,
            cover,
            nav,
            mark_nav,
            published,
            description,
            name,
            opf,
            ncx,
        };
        book.render_navigation();
        book.render_package();

        tracing::debug!(
            title = %book.title,
            guid = %book.guid,
            chapters = book.chapters.len(),
            resources = book.resources.len(),
            "Built book"
        );

        Ok(book)
    }

    /// The main author.
    pub fn author(&self) -> Option<&Creator> {
        self.creators.iter().find(|c| c.is_author())
    }

    /// Look up a chapter by name.
    pub fn chapter(&self, name: &str) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.name == name)
    }

    /// Resources that will end up in the package.
    pub fn embeddable_resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(|r| r.is_embeddable())
    }

    /// Fetch resource content and refresh the package document.
    pub async fn load_resources(
        &mut self,
        loader: &ResourceLoader,
        options: &LoadOptions,
    ) -> Result<()> {
        self.resources = loader
            .load_reserving(&self.resources, &self.reserved_names(), options)
            .await?;
        self.render_package();
        Ok(())
    }

    /// Package paths owned by chapters and the package documents.
    pub fn reserved_names(&self) -> HashSet<String> {
        self.chapters
            .iter()
            .map(|c| c.name.clone())
            .chain(
                [self.opf.document(), self.ncx.document()]
                    .into_iter()
                    .flatten()
                    .map(|doc| doc.name.clone()),
            )
            .collect()
    }

    /// Re-render the package document if it is generated.
    pub fn render_package(&mut self) {
        if self.opf.is_generated() {
            let content = templates::render_package(self);
            if let DocumentSlot::Generated(doc) = &mut self.opf {
                doc.content = content;
            }
        }
    }

    /// Re-render the navigation document if it is generated.
    pub fn render_navigation(&mut self) {
        if self.ncx.is_generated() {
            let content = templates::render_nav(self);
            if let DocumentSlot::Generated(doc) = &mut self.ncx {
                doc.content = content;
            }
        }
    }

    /// Flatten the book into the files of the archive, in write order.
    ///
    /// Resources without content are left out.
    pub fn assemble_file_list(&self) -> Vec<FileEntry> {
        let mut files = vec![
            FileEntry::text("mimetype", EPUB_MIME_TYPE),
            FileEntry::text("META-INF/container.xml", templates::render_container(self)),
        ];

        let documents = [self.opf.document(), self.ncx.document()]
            .into_iter()
            .flatten()
            .map(|doc| FileEntry::text(oebps_path(&doc.name), doc.content.clone()));
        let chapters = self
            .chapters
            .iter()
            .map(|c| FileEntry::text(oebps_path(&c.name), c.content.clone()));
        let resources = self.embeddable_resources().filter_map(|r| {
            Some(FileEntry {
                path: oebps_path(r.name.as_deref()?),
                content: r.content.clone()?,
                is_binary: r.encoding == ContentEncoding::Base64,
            })
        });

        let mut seen: HashSet<String> = files.iter().map(|f| f.path.clone()).collect();
        for entry in documents.chain(chapters).chain(resources) {
            if seen.insert(entry.path.clone()) {
                files.push(entry);
            } else {
                tracing::warn!(path = %entry.path, "Skipping duplicate package entry");
            }
        }

        files
    }
}

fn oebps_path(name: &str) -> String {
    format!("OEBPS/{}", name.trim_start_matches('/'))
}

/// Merge the creator fields into one list, dropping nameless entries.
///
/// The flag marks fields whose bare names are authors.
fn flatten_creators<const N: usize>(
    fields: [(Option<crate::descriptor::OneOrMany<CreatorInput>>, bool); N],
) -> Vec<Creator> {
    fields
        .into_iter()
        .flat_map(|(field, authors)| {
            field
                .map(|f| f.into_vec())
                .unwrap_or_default()
                .into_iter()
                .map(move |input| match input {
                    CreatorInput::Name(name) => Creator {
                        name,
                        role: authors.then(|| AUTHOR_ROLE.to_string()),
                        file_as: None,
                        bio: None,
                    },
                    CreatorInput::Full {
                        name,
                        role,
                        file_as,
                        bio,
                    } => Creator {
                        name,
                        role: role.filter(|r| !r.is_empty()),
                        file_as: file_as.filter(|s| !s.is_empty()),
                        bio: bio.filter(|s| !s.is_empty()),
                    },
                })
        })
        .filter(|c| !c.name.trim().is_empty())
        .collect()
}

/// Collapse duplicate sources and fill in names and media types.
///
/// Resource names must be unique and may not reuse a `reserved` path.
fn normalize_resources(
    inputs: Vec<ResourceInput>,
    reserved: &HashSet<String>,
) -> Result<Vec<Resource>> {
    let mut sources = HashSet::new();
    let mut taken = reserved.clone();
    let mut resources = Vec::with_capacity(inputs.len());

    for input in inputs {
        if let Some(src) = &input.src
            && !sources.insert(src.clone())
        {
            tracing::debug!(src = %src, "Dropping duplicate resource");
            continue;
        }

        let encoding = if input.options.is_some_and(|o| o.base64) {
            ContentEncoding::Base64
        } else {
            ContentEncoding::Utf8
        };
        let content = input.content.filter(|c| !c.is_empty());

        let mut name = input.name.as_deref().and_then(clean_path);
        if name.is_none() && content.is_some() {
            name = input.src.as_deref().and_then(name_from_src);
        }

        let mime_type = input
            .mime_type
            .as_deref()
            .filter(|m| !m.is_empty())
            .map(normalize_mime_type)
            .or_else(|| name.as_deref().and_then(mime_type_for_name));

        if name.is_none() && content.is_some() {
            name = Some(fallback_name(resources.len(), mime_type.as_deref()));
        }

        if let Some(name) = &name
            && !taken.insert(name.clone())
        {
            return Err(AppError::Validation(format!("duplicate resource name: {}", name)));
        }

        resources.push(Resource {
            src: input.src,
            name,
            mime_type,
            content,
            encoding,
        });
    }

    Ok(resources)
}
