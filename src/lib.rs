//! web2epub: package captured web articles into EPUB files.
//!
//! This crate takes the output of a reader-mode extractor (title, author,
//! article markup and the images it references) and turns it into an EPUB 3
//! package ready to be sent to an e-reader sync service.
//!
//! # Features
//!
//! - Typed content descriptor with eager validation
//! - OPF package, NCX navigation and XHTML chapter rendering
//! - Concurrent image loading with a fallback fetcher and a global deadline
//! - Tolerant mode that drops unreachable images instead of failing
//! - ZIP serialization with the `mimetype` entry stored first

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Configuration and CLI.
pub mod config;
/// Content descriptor.
pub mod descriptor;
/// EPUB model, rendering, loading and packaging.
pub mod epub;
/// Error types.
pub mod error;


pub use config::{Cli, Command, Config};
pub use descriptor::ContentDescriptor;
pub use epub::{Blob, Book, LoadOptions, ResourceLoader};
pub use error::{AppError, Result};
