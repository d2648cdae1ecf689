//! Concurrent resource loading under a global deadline.

use crate::epub::book::{ContentEncoding, Resource};
use crate::epub::fetch::{FetchRequest, FetchResponse, ResourceFetchDelegate};
use crate::epub::{clean_path, extension_of, mime_type_for_name};
use crate::error::{AppError, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Time budget of a whole batch when none is given.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(120_000);

/// Failure policy and time budget of one load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadOptions {
    /// Keep going when a resource fails or the batch times out.
    pub allow_errors: bool,
    /// Budget for the whole batch. Zero means [`DEFAULT_TIMEOUT`].
    pub timeout: Duration,
}

impl LoadOptions {
    /// The budget actually applied.
    pub fn effective_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            self.timeout
        }
    }
}

/// Fetches resources that have a source but no content yet.
#[derive(Clone)]
pub struct ResourceLoader {
    direct: Arc<dyn ResourceFetchDelegate>,
    delegate: Option<Arc<dyn ResourceFetchDelegate>>,
}

impl ResourceLoader {
    /// Create a loader around a direct fetcher.
    pub fn new(direct: Arc<dyn ResourceFetchDelegate>) -> Self {
        Self {
            direct,
            delegate: None,
        }
    }

    /// Add a fallback used when the direct fetch fails.
    pub fn with_delegate(mut self, delegate: Arc<dyn ResourceFetchDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Load every distinct source once and return the updated resources.
    ///
    /// The input is left untouched. Resources sharing a source all receive
    /// the same name and content. Failed resources come back without content
    /// when `allow_errors` is set; otherwise the first failure aborts the
    /// batch. Fetches still running when the batch ends are cancelled.
    pub async fn load(&self, resources: &[Resource], options: &LoadOptions) -> Result<Vec<Resource>> {
        self.load_reserving(resources, &HashSet::new(), options).await
    }

    /// Like [`ResourceLoader::load`], but loaded resources never take one of
    /// the `reserved` names (chapters and package documents).
    pub async fn load_reserving(
        &self,
        resources: &[Resource],
        reserved: &HashSet<String>,
        options: &LoadOptions,
    ) -> Result<Vec<Resource>> {
        let mut seen = HashSet::new();
        let pending: Vec<&str> = resources
            .iter()
            .filter(|r| r.needs_loading())
            .filter_map(|r| r.src.as_deref())
            .filter(|src| seen.insert(*src))
            .collect();

        if pending.is_empty() {
            return Ok(resources.to_vec());
        }

        let timeout = options.effective_timeout();
        let deadline = Instant::now() + timeout;
        tracing::debug!(
            count = pending.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Loading resources"
        );

        let mut tasks: FuturesUnordered<_> =
            pending.iter().map(|src| self.fetch_one(src)).collect();
        let mut loaded: HashMap<String, FetchResponse> = HashMap::new();
        let mut failed = 0usize;

        loop {
            let next = tokio::time::timeout_at(deadline, tasks.next()).await;
            match next {
                Ok(Some((src, Ok(response)))) => {
                    tracing::debug!(src = %src, bytes = response.content.len(), "Loaded resource");
                    loaded.insert(src, response);
                }
                Ok(Some((src, Err(e)))) => {
                    if !options.allow_errors {
                        return Err(e);
                    }
                    failed += 1;
                    tracing::warn!(src = %src, error = %e, "Skipping resource");
                }
                Ok(None) => break,
                Err(_) => {
                    let outstanding = tasks.len();
                    drop(tasks);
                    let err = AppError::Timeout(timeout);
                    if !options.allow_errors {
                        return Err(err);
                    }
                    tracing::warn!(outstanding, error = %err, "Continuing with loaded resources");
                    break;
                }
            }
        }

        tracing::info!(
            loaded = loaded.len(),
            failed,
            total = pending.len(),
            "Resource loading finished"
        );

        Ok(apply_loaded(resources, reserved, &loaded))
    }

    async fn fetch_one(&self, src: &str) -> (String, Result<FetchResponse>) {
        let request = FetchRequest {
            url: src.to_string(),
        };

        let result = match self.direct.fetch(&request).await {
            Ok(response) => Ok(response),
            Err(direct_err) => match &self.delegate {
                Some(delegate) => {
                    tracing::debug!(src = %src, error = %direct_err, "Direct fetch failed, trying delegate");
                    delegate.fetch(&request).await
                }
                None => Err(direct_err),
            },
        };

        let result = result
            .and_then(|response| {
                if response.content.is_empty() {
                    Err(AppError::ResourceLoad {
                        src: src.to_string(),
                        reason: "empty response".to_string(),
                    })
                } else {
                    Ok(response)
                }
            })
            .map_err(|e| match e {
                AppError::ResourceLoad { .. } => e,
                other => AppError::ResourceLoad {
                    src: src.to_string(),
                    reason: other.to_string(),
                },
            });

        (request.url, result)
    }
}

/// Build new resource records from the fetched responses.
fn apply_loaded(
    resources: &[Resource],
    reserved: &HashSet<String>,
    loaded: &HashMap<String, FetchResponse>,
) -> Vec<Resource> {
    let mut taken: HashSet<String> = resources
        .iter()
        .filter(|r| r.is_embeddable())
        .filter_map(|r| r.name.clone())
        .chain(reserved.iter().cloned())
        .collect();
    let mut resolved: HashMap<&str, Resource> = HashMap::new();

    resources
        .iter()
        .enumerate()
        .map(|(index, resource)| {
            let Some(src) = resource.src.as_deref().filter(|_| resource.needs_loading()) else {
                return resource.clone();
            };
            if let Some(done) = resolved.get(src) {
                return done.clone();
            }
            let Some(response) = loaded.get(src) else {
                return resource.clone();
            };

            let mime_type = response
                .mime_header
                .as_deref()
                .and_then(strip_mime_parameters)
                .or_else(|| resource.mime_type.clone())
                .or_else(|| resource.name.as_deref().and_then(mime_type_for_name))
                .or_else(|| name_from_src(src).as_deref().and_then(mime_type_for_name));

            let name = resource
                .name
                .as_deref()
                .and_then(clean_path)
                .or_else(|| name_from_src(src))
                .unwrap_or_else(|| fallback_name(index, mime_type.as_deref()));
            let name = unique_name(name, &mut taken);

            let record = Resource {
                src: resource.src.clone(),
                name: Some(name),
                mime_type,
                content: Some(STANDARD.encode(&response.content)),
                encoding: ContentEncoding::Base64,
            };
            resolved.insert(src, record.clone());
            record
        })
        .collect()
}

fn strip_mime_parameters(header: &str) -> Option<String> {
    header
        .split(';')
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
}

/// Package path derived from a resource locator: the URL path without the
/// leading slash, query or fragment.
pub(crate) fn name_from_src(src: &str) -> Option<String> {
    if src.starts_with("data:") {
        return None;
    }

    let path = match reqwest::Url::parse(src) {
        Ok(url) => urlencoding::decode(url.path())
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| url.path().to_string()),
        Err(_) => src.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    if path.ends_with('/') {
        None
    } else {
        clean_path(&path)
    }
}

/// Name for a resource whose locator has no usable path.
pub(crate) fn fallback_name(index: usize, mime_type: Option<&str>) -> String {
    let ext = match mime_type.unwrap_or_default() {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "text/css" => "css",
        _ => "bin",
    };
    format!("resource{}.{}", index, ext)
}

/// Make `name` unique among `taken` by numbering the file stem.
fn unique_name(name: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.clone()) {
        return name;
    }

    let (stem, ext) = match extension_of(&name) {
        Some(ext) => (&name[..name.len() - ext.len() - 1], Some(ext)),
        None => (name.as_str(), None),
    };
    let mut n = 1;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{}-{}.{}", stem, n, ext),
            None => format!("{}-{}", stem, n),
        };
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
