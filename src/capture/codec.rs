/// Pick the first candidate the recorder supports
///
/// Returns `None` when nothing matches so the platform default is used.
pub fn select_mime_type<F>(candidates: &[String], is_supported: F) -> Option<String>
where
    F: Fn(&str) -> bool,
{
    candidates
        .iter()
        .map(|c| c.trim())
        .find(|c| !c.is_empty() && is_supported(c))
        .map(str::to_string)
}

/// File extension for a negotiated content type
pub fn extension_for(mime_type: &str) -> &'static str {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    match essence {
        "video/mp4" => "mp4",
        "video/x-matroska" => "mkv",
        _ => "webm",
    }
}
