use crate::error::AppError;

/// Sanitizes user-supplied free text with ammonia's default allow-list.
///
/// Safe formatting tags (`<b>`, `<p>`) survive; `<script>` and `<iframe>` are
/// removed together with their content, as are event-handler attributes.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Trims and sanitizes a message, then enforces `max_chars` on the stored form.
/// Escaping can grow the text (`<` becomes `&lt;`), so the limit is checked
/// after cleaning.
pub fn clean_message(input: &str, max_chars: u64) -> Result<String, AppError> {
    let cleaned = clean_html(input.trim());
    if cleaned.chars().count() as u64 > max_chars {
        return Err(AppError::BadRequest(format!(
            "Message cannot exceed {} characters",
            max_chars
        )));
    }
    Ok(cleaned)
}
