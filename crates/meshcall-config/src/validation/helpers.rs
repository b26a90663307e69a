//! Shared range-validation helpers.

/// Push an error if `value` is outside `[min, max]`.
pub(crate) fn validate_range<T>(errors: &mut Vec<String>, name: &str, value: T, min: T, max: T)
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

/// Push an error if `url` does not use a WebSocket scheme.
pub(crate) fn validate_ws_url(errors: &mut Vec<String>, name: &str, url: &str) {
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        errors.push(format!("{name} = {url:?} must start with ws:// or wss://"));
    }
}
