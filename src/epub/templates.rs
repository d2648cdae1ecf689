//! XML templates of the package.
//!
//! Every value taken from the book is escaped. Chapter bodies are the only
//! markup inserted verbatim.

use crate::epub::book::{Book, UNKNOWN_AUTHOR};
use crate::epub::OPF_MIME_TYPE;
use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::Writer;
use quick_xml::escape::escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::Cursor;

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Render `META-INF/container.xml`.
pub fn render_container(book: &Book) -> String {
    let (name, mime_type) = book
        .opf
        .document()
        .map(|doc| (doc.name.as_str(), doc.mime_type.as_str()))
        .unwrap_or(("content.opf", OPF_MIME_TYPE));

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
	<rootfiles>
		<rootfile full-path="OEBPS/{}" media-type="{}"/>
	</rootfiles>
</container>"#,
        escape(name),
        escape(mime_type)
    )
}

/// Render the EPUB 3 package document, stamped with the current time.
pub fn render_package(book: &Book) -> String {
    render_package_at(book, Utc::now())
}

/// Render the EPUB 3 package document with a given modification time.
pub fn render_package_at(book: &Book, modified: DateTime<Utc>) -> String {
    let mut writer = new_writer();

    let mut package = BytesStart::new("package");
    package.push_attribute(("version", "3.0"));
    package.push_attribute(("xmlns:dc", "http://purl.org/dc/elements/1.1/"));
    package.push_attribute(("xmlns:opf", "http://www.idpf.org/2007/opf"));
    package.push_attribute(("xmlns", "http://www.idpf.org/2007/opf"));
    package.push_attribute(("unique-identifier", "Id"));
    let _ = writer.write_event(Event::Start(package));

    write_metadata(&mut writer, book, modified);
    write_manifest(&mut writer, book);
    write_spine(&mut writer, book);
    write_guide(&mut writer, book);

    let _ = writer.write_event(Event::End(BytesEnd::new("package")));
    finish(writer)
}

fn write_metadata(writer: &mut XmlWriter, book: &Book, modified: DateTime<Utc>) {
    let lang = book.language.as_str();
    let _ = writer.write_event(Event::Start(BytesStart::new("metadata")));

    write_text_element(writer, "dc:identifier", &[("id", "Id")], &book.guid);
    write_text_element(
        writer,
        "meta",
        &[("property", "identifier-type"), ("refines", "#Id")],
        "UUID",
    );
    write_text_element(
        writer,
        "meta",
        &[("property", "dcterms:modified")],
        &modified.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    write_text_element(writer, "dc:language", &[], lang);
    write_text_element(writer, "dc:title", &[("xml:lang", lang)], &book.title);

    if let Some(description) = book.description.as_ref().and_then(|d| d.text()) {
        write_text_element(writer, "dc:description", &[("xml:lang", lang)], description);
    }

    for (i, creator) in book.creators.iter().enumerate() {
        let id = format!("author{}", i);
        let refines = format!("#{}", id);
        write_text_element(
            writer,
            "dc:creator",
            &[("id", id.as_str()), ("xml:lang", lang)],
            &creator.name,
        );
        if let Some(file_as) = &creator.file_as {
            write_text_element(
                writer,
                "meta",
                &[("refines", refines.as_str()), ("property", "file-as")],
                file_as,
            );
        }
        if let Some(role) = &creator.role {
            write_text_element(
                writer,
                "meta",
                &[
                    ("refines", refines.as_str()),
                    ("property", "role"),
                    ("scheme", "marc:relators"),
                ],
                role,
            );
        }
    }

    if let Some(published) = book.published {
        write_text_element(
            writer,
            "meta",
            &[("property", "dcterms:created")],
            &published.format("%Y-%m-%d").to_string(),
        );
    }

    let _ = writer.write_event(Event::End(BytesEnd::new("metadata")));
}

fn write_manifest(writer: &mut XmlWriter, book: &Book) {
    let _ = writer.write_event(Event::Start(BytesStart::new("manifest")));

    if let Some(ncx) = book.ncx.document() {
        write_empty_element(
            writer,
            "item",
            &[
                ("id", "ncx"),
                ("href", ncx.name.as_str()),
                ("media-type", ncx.mime_type.as_str()),
            ],
        );
    }

    for (i, chapter) in book.chapters.iter().enumerate() {
        let id = format!("chapter{}", i);
        let mut attrs = vec![
            ("id", id.as_str()),
            ("href", chapter.name.as_str()),
            ("media-type", chapter.mime_type.as_str()),
        ];
        if book.mark_nav && book.nav.as_deref() == Some(chapter.name.as_str()) {
            attrs.push(("properties", "nav"));
        }
        write_empty_element(writer, "item", &attrs);
    }

    for (i, resource) in book.embeddable_resources().enumerate() {
        let id = format!("resource{}", i);
        write_empty_element(
            writer,
            "item",
            &[
                ("id", id.as_str()),
                ("href", resource.name.as_deref().unwrap_or_default()),
                (
                    "media-type",
                    resource
                        .mime_type
                        .as_deref()
                        .unwrap_or("application/octet-stream"),
                ),
            ],
        );
    }

    let _ = writer.write_event(Event::End(BytesEnd::new("manifest")));
}

fn write_spine(writer: &mut XmlWriter, book: &Book) {
    let mut spine = BytesStart::new("spine");
    if book.ncx.document().is_some() {
        spine.push_attribute(("toc", "ncx"));
    }
    let _ = writer.write_event(Event::Start(spine));

    for (i, chapter) in book.chapters.iter().enumerate() {
        let id = format!("chapter{}", i);
        let mut attrs = vec![("idref", id.as_str())];
        if !chapter.linear {
            attrs.push(("linear", "no"));
        }
        write_empty_element(writer, "itemref", &attrs);
    }

    let _ = writer.write_event(Event::End(BytesEnd::new("spine")));
}

fn write_guide(writer: &mut XmlWriter, book: &Book) {
    let cover = book.cover.as_deref().and_then(|name| book.chapter(name));
    let nav = book.nav.as_deref().and_then(|name| book.chapter(name));
    if cover.is_none() && nav.is_none() {
        return;
    }

    let _ = writer.write_event(Event::Start(BytesStart::new("guide")));
    for (chapter, kind) in [(cover, "cover"), (nav, "toc")] {
        if let Some(chapter) = chapter {
            write_empty_element(
                writer,
                "reference",
                &[
                    ("href", chapter.name.as_str()),
                    ("title", chapter.title.as_str()),
                    ("type", kind),
                ],
            );
        }
    }
    let _ = writer.write_event(Event::End(BytesEnd::new("guide")));
}

/// Render the NCX navigation document.
pub fn render_nav(book: &Book) -> String {
    let mut writer = new_writer();

    let mut ncx = BytesStart::new("ncx");
    ncx.push_attribute(("xmlns", "http://www.daisy.org/z3986/2005/ncx/"));
    ncx.push_attribute(("version", "2005-1"));
    ncx.push_attribute(("xml:lang", book.language.as_str()));
    let _ = writer.write_event(Event::Start(ncx));

    let _ = writer.write_event(Event::Start(BytesStart::new("head")));
    write_empty_element(
        &mut writer,
        "meta",
        &[("name", "dtb:uid"), ("content", book.guid.as_str())],
    );
    let _ = writer.write_event(Event::End(BytesEnd::new("head")));

    let author = book.author().map(|c| c.name.as_str()).unwrap_or(UNKNOWN_AUTHOR);
    write_labelled(&mut writer, "docTitle", &book.title);
    write_labelled(&mut writer, "docAuthor", author);

    let _ = writer.write_event(Event::Start(BytesStart::new("navMap")));
    for (i, chapter) in book.chapters.iter().enumerate() {
        let order = (i + 1).to_string();
        let id = format!("chapter{}", i + 1);
        let mut point = BytesStart::new("navPoint");
        point.push_attribute(("playOrder", order.as_str()));
        point.push_attribute(("id", id.as_str()));
        let _ = writer.write_event(Event::Start(point));

        write_labelled(&mut writer, "navLabel", &chapter.title);
        write_empty_element(&mut writer, "content", &[("src", chapter.name.as_str())]);

        let _ = writer.write_event(Event::End(BytesEnd::new("navPoint")));
    }
    let _ = writer.write_event(Event::End(BytesEnd::new("navMap")));

    let _ = writer.write_event(Event::End(BytesEnd::new("ncx")));
    finish(writer)
}

/// Wrap a body fragment in a standalone XHTML document.
pub fn render_xhtml_frame(title: &str, language: &str, content: &str) -> String {
    let lang = escape(language);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="{lang}" lang="{lang}">
	<head>
		<title>{}</title>
	</head>
	<body>{}</body>
</html>"#,
        escape(title),
        content
    )
}

fn new_writer() -> XmlWriter {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b'\t', 1);
    // Writing to a Vec can't fail
    let _ = writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)));
    writer
}

fn finish(writer: XmlWriter) -> String {
    String::from_utf8(writer.into_inner().into_inner()).unwrap_or_default()
}

/// Write an element holding escaped text.
fn write_text_element(writer: &mut XmlWriter, name: &str, attrs: &[(&str, &str)], text: &str) {
    let mut elem = BytesStart::new(name);
    for &attr in attrs {
        elem.push_attribute(attr);
    }
    let _ = writer.write_event(Event::Start(elem));
    let _ = writer.write_event(Event::Text(BytesText::from_escaped(escape(text))));
    let _ = writer.write_event(Event::End(BytesEnd::new(name)));
}

fn write_empty_element(writer: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) {
    let mut elem = BytesStart::new(name);
    for &attr in attrs {
        elem.push_attribute(attr);
    }
    let _ = writer.write_event(Event::Empty(elem));
}

/// Write `<name><text>label</text></name>`.
fn write_labelled(writer: &mut XmlWriter, name: &str, label: &str) {
    let _ = writer.write_event(Event::Start(BytesStart::new(name)));
    write_text_element(writer, "text", &[], label);
    let _ = writer.write_event(Event::End(BytesEnd::new(name)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ChapterInput, ContentDescriptor, ResourceInput};
    use chrono::TimeZone;

    fn book() -> Book {
        Book::build(ContentDescriptor {
            title: "T".to_string(),
            chapters: vec![
                ChapterInput {
                    name: Some("cover.xhtml".to_string()),
                    title: "Cover".to_string(),
                    content: "<img src=\"img/c.png\"/>".to_string(),
                    ..Default::default()
                },
                ChapterInput {
                    name: Some("c1.xhtml".to_string()),
                    title: "One".to_string(),
                    content: "<p>one</p>".to_string(),
                    linear: Some(false),
                    ..Default::default()
                },
            ],
            resources: vec![ResourceInput {
                name: Some("img/c.png".to_string()),
                content: Some("iVBORw0KGgo=".to_string()),
                ..Default::default()
            }],
            cover: Some("cover.xhtml".to_string()),
            nav: Some("c1.xhtml".to_string()),
            mark_nav: true,
            published: Some(0),
            ..Default::default()
        })
        .unwrap()
    }

    fn modified() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn container_points_at_package() {
        let xml = render_container(&book());
        assert!(xml.contains(
            r#"<rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>"#
        ));
    }

    #[test]
    fn package_lists_manifest_and_spine() {
        let book = book();
        let xml = render_package_at(&book, modified());
        let doc = roxmltree::Document::parse(&xml).unwrap();

        let items: Vec<(&str, &str)> = doc
            .descendants()
            .filter(|n| n.has_tag_name("item"))
            .map(|n| (n.attribute("id").unwrap(), n.attribute("href").unwrap()))
            .collect();
        assert_eq!(
            items,
            [
                ("ncx", "content.ncx"),
                ("chapter0", "cover.xhtml"),
                ("chapter1", "c1.xhtml"),
                ("resource0", "img/c.png"),
            ]
        );

        let nav_item = doc
            .descendants()
            .find(|n| n.attribute("id") == Some("chapter1"))
            .unwrap();
        assert_eq!(nav_item.attribute("properties"), Some("nav"));

        let itemrefs: Vec<_> = doc
            .descendants()
            .filter(|n| n.has_tag_name("itemref"))
            .collect();
        assert_eq!(itemrefs.len(), 2);
        assert_eq!(itemrefs[1].attribute("linear"), Some("no"));

        let guide: Vec<_> = doc
            .descendants()
            .filter(|n| n.has_tag_name("reference"))
            .map(|n| n.attribute("type").unwrap())
            .collect();
        assert_eq!(guide, ["cover", "toc"]);

        assert!(xml.contains("2024-05-01T12:30:00Z"));
        assert!(xml.contains(r#"<meta property="dcterms:created">1970-01-01</meta>"#));
        assert!(xml.contains(r#"media-type="image/png""#));
    }

    #[test]
    fn package_rendering_is_stable() {
        let book = book();
        assert_eq!(
            render_package_at(&book, modified()),
            render_package_at(&book, modified())
        );
        assert_eq!(render_nav(&book), render_nav(&book));
        assert_eq!(render_container(&book), render_container(&book));
    }

    #[test]
    fn title_is_escaped() {
        let mut book = book();
        book.title = r#"Fish & "Chips" <deluxe>"#.to_string();

        let xml = render_package_at(&book, modified());
        assert!(xml.contains("Fish &amp; &quot;Chips&quot; &lt;deluxe&gt;"));
        assert!(!xml.contains("<deluxe>"));

        let ncx = render_nav(&book);
        assert!(ncx.contains("Fish &amp;"));

        let frame = render_xhtml_frame(&book.title, "en", "<p>raw & kept</p>");
        assert!(frame.contains("<title>Fish &amp; &quot;Chips&quot; &lt;deluxe&gt;</title>"));
        assert!(frame.contains("<body><p>raw & kept</p></body>"));
    }

    #[test]
    fn nav_lists_chapters_in_order() {
        let xml = render_nav(&book());
        let doc = roxmltree::Document::parse(&xml).unwrap();

        let points: Vec<(&str, &str)> = doc
            .descendants()
            .filter(|n| n.has_tag_name("navPoint"))
            .map(|n| {
                let src = n
                    .children()
                    .find(|c| c.has_tag_name("content"))
                    .and_then(|c| c.attribute("src"))
                    .unwrap();
                (n.attribute("playOrder").unwrap(), src)
            })
            .collect();
        assert_eq!(points, [("1", "cover.xhtml"), ("2", "c1.xhtml")]);
        assert!(xml.contains("<text>&lt;unknown&gt;</text>"));
    }

    #[test]
    fn spine_without_ncx_has_no_toc() {
        let mut book = book();
        book.ncx = crate::epub::DocumentSlot::Omitted;
        let xml = render_package_at(&book, modified());
        assert!(xml.contains("<spine>"));
        assert!(!xml.contains(r#"id="ncx""#));
    }
}
