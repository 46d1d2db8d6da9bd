//! Content negotiation
//!
//! The response format is the first entry of the Accept list the model
//! supports. Entries may be mime types or short format names; parameters such
//! as `q=` are ignored and list order alone decides.

use indirector_core::{Format, IndirectorError, ModelSpec, Result};

/// Pick the response format for an Accept header
///
/// A missing header, or `*/*`, selects the model's preferred format.
pub fn response_format(accept: Option<&str>, model: &ModelSpec) -> Result<Format> {
    let Some(accept) = accept.map(str::trim).filter(|a| !a.is_empty()) else {
        return Ok(model.default_format());
    };

    for entry in accept.split(',') {
        let mime = entry.split(';').next().unwrap_or("").trim();
        if mime == "*/*" {
            return Ok(model.default_format());
        }
        if let Some(format) = Format::from_mime(mime) {
            if model.supports(format) {
                return Ok(format);
            }
        }
    }

    Err(IndirectorError::NotAcceptable(format!(
        "No supported formats are acceptable (Accept: {}); {} supports {}",
        accept,
        model.name,
        supported(model)
    )))
}

/// Pick the deserializer for a request body
pub fn request_format(content_type: Option<&str>, model: &ModelSpec) -> Result<Format> {
    let content_type = content_type.map(str::trim).filter(|c| !c.is_empty()).ok_or_else(|| {
        IndirectorError::UnsupportedMediaType("No Content-Type header was received".into())
    })?;

    match Format::from_mime(content_type) {
        Some(format) if model.supports(format) => Ok(format),
        _ => Err(IndirectorError::UnsupportedMediaType(format!(
            "Client sent a mime-type ({}) that doesn't correspond to a format we support; {} supports {}",
            content_type,
            model.name,
            supported(model)
        ))),
    }
}

fn supported(model: &ModelSpec) -> String {
    model
        .formats
        .iter()
        .map(|f| f.mime())
        .collect::<Vec<_>>()
        .join(", ")
}
