//! Content negotiation
//!
//! The output format is picked from the `Accept` header among the configured
//! formats, honouring q-values and `type/*` or `*/*` wildcards. Without an
//! `Accept` header the first configured format is used. Operations reading
//! a body also require its `Content-Type` to be a configured format.

use crate::core::error::{PlatformResult, RequestError};
use crate::core::operation::Operation;
use crate::state::{Format, Provider, ProviderNext, StateContext, UriVariables};
use async_trait::async_trait;
use indexmap::IndexMap;

pub struct NegotiateProvider {
    /// Format name => MIME types
    formats: IndexMap<String, Vec<String>>,
}

struct MediaRange {
    mime: String,
    quality: f32,
}

/// Parse an `Accept` header into media ranges, best first
fn media_ranges(accept: &str) -> Vec<MediaRange> {
    let mut ranges: Vec<MediaRange> = accept
        .split(',')
        .filter_map(|part| {
            let mut params = part.split(';');
            let mime = params.next()?.trim().to_ascii_lowercase();
            if mime.is_empty() {
                return None;
            }
            let quality = params
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|q| q.parse::<f32>().ok())
                .unwrap_or(1.0);
            Some(MediaRange { mime, quality })
        })
        .filter(|range| range.quality > 0.0)
        .collect();
    // stable: equal weights keep header order
    ranges.sort_by(|a, b| b.quality.total_cmp(&a.quality));
    ranges
}

fn mime_matches(range: &str, mime: &str) -> bool {
    if range == "*/*" {
        return true;
    }
    match range.strip_suffix("/*") {
        Some(kind) => mime.split('/').next() == Some(kind),
        None => range == mime,
    }
}

impl NegotiateProvider {
    pub fn new(formats: IndexMap<String, Vec<String>>) -> Self {
        Self { formats }
    }

    fn supported(&self) -> String {
        self.formats
            .values()
            .flatten()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn format_for(&self, mime: &str) -> Option<Format> {
        self.formats.iter().find_map(|(name, mimes)| {
            mimes.iter().find(|m| *m == mime).map(|m| Format {
                name: name.clone(),
                mime_type: m.clone(),
            })
        })
    }

    fn default_format(&self) -> Option<Format> {
        self.formats.iter().find_map(|(name, mimes)| {
            mimes.first().map(|m| Format {
                name: name.clone(),
                mime_type: m.clone(),
            })
        })
    }

    /// Pick the output format for an `Accept` header
    pub fn negotiate(&self, accept: Option<&str>) -> PlatformResult<Format> {
        let accept = accept.map(str::trim).filter(|a| !a.is_empty());
        let Some(accept) = accept else {
            return self.default_format().ok_or_else(|| {
                RequestError::NotAcceptable {
                    accept: String::new(),
                    supported: self.supported(),
                }
                .into()
            });
        };

        for range in media_ranges(accept) {
            let found = self.formats.iter().find_map(|(name, mimes)| {
                mimes
                    .iter()
                    .find(|mime| mime_matches(&range.mime, mime))
                    .map(|mime| Format {
                        name: name.clone(),
                        mime_type: mime.clone(),
                    })
            });
            if let Some(format) = found {
                return Ok(format);
            }
        }

        Err(RequestError::NotAcceptable {
            accept: accept.to_string(),
            supported: self.supported(),
        }
        .into())
    }

    /// Check the request body's content type
    pub fn input_format(&self, content_type: Option<&str>) -> PlatformResult<Format> {
        let mime = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default();
        self.format_for(&mime).ok_or_else(|| {
            RequestError::UnsupportedMediaType {
                content_type: mime,
                supported: self.supported(),
            }
            .into()
        })
    }
}

#[async_trait]
impl Provider for NegotiateProvider {
    async fn provide(
        &self,
        operation: &Operation,
        uri_variables: &UriVariables,
        context: &mut StateContext,
        next: ProviderNext<'_>,
    ) -> PlatformResult<()> {
        let format = self.negotiate(context.request.header("accept"))?;
        tracing::debug!(format = %format.name, "negotiated output format");
        context.format = Some(format);

        if operation.can_deserialize() && context.request.body.is_some() {
            self.input_format(context.request.header("content-type"))?;
        }

        next.run(operation, uri_variables, context).await
    }
}
