//! Pure parameter validation.
//!
//! One stateless function per parameter class. Each accepts a raw value,
//! returns a coerced typed value, or fails with a `Validation` error that
//! names the violated constraint. All parameters for an operation are
//! validated before any external resource is acquired.

use framecast_common::error::{FramecastError, FramecastResult};

/// Upper bound for output dimensions (8K width).
pub const MAX_DIMENSION: u32 = 7680;

/// Upper bound for frame rates.
pub const MAX_FPS: f64 = 120.0;

/// Upper bound for the render scale factor.
pub const MAX_SCALE: f64 = 10.0;

/// Inclusive bounds of the generic quality factor (CRF) domain.
pub const CRF_RANGE: (u32, u32) = (0, 51);

/// Parse and validate a CRF quality factor. Accepted domain is `[0, 51]`.
pub fn parse_quality_factor(raw: &str) -> FramecastResult<u32> {
    let value: i64 = raw.trim().parse().map_err(|_| {
        FramecastError::validation(format!("quality factor must be a number, got '{raw}'"))
    })?;
    ensure_quality_factor(value)
}

/// Validate an already-numeric CRF quality factor.
pub fn ensure_quality_factor(value: i64) -> FramecastResult<u32> {
    let (lo, hi) = CRF_RANGE;
    if value < lo as i64 || value > hi as i64 {
        return Err(FramecastError::validation(format!(
            "quality factor must be in [{lo}, {hi}], got {value}"
        )));
    }
    Ok(value as u32)
}

/// Parse and validate a TCP port (1-65535).
pub fn parse_port(raw: &str) -> FramecastResult<u16> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| FramecastError::validation(format!("port must be a number, got '{raw}'")))?;
    if !(1..=65535).contains(&value) {
        return Err(FramecastError::validation(format!(
            "port must be in [1, 65535], got {value}"
        )));
    }
    Ok(value as u16)
}

/// Parse and validate an output dimension (1-7680 pixels).
pub fn parse_dimension(raw: &str) -> FramecastResult<u32> {
    let value: i64 = raw.trim().parse().map_err(|_| {
        FramecastError::validation(format!("dimension must be a number, got '{raw}'"))
    })?;
    ensure_dimension(value)
}

/// Validate an already-numeric output dimension.
pub fn ensure_dimension(value: i64) -> FramecastResult<u32> {
    if value < 1 || value > MAX_DIMENSION as i64 {
        return Err(FramecastError::validation(format!(
            "dimension must be in [1, {MAX_DIMENSION}], got {value}"
        )));
    }
    Ok(value as u32)
}

/// Parse and validate a frame rate in `(0, 120]`.
pub fn parse_frame_rate(raw: &str) -> FramecastResult<f64> {
    let value: f64 = raw.trim().parse().map_err(|_| {
        FramecastError::validation(format!("frame rate must be a number, got '{raw}'"))
    })?;
    ensure_frame_rate(value)
}

/// Validate an already-numeric frame rate.
pub fn ensure_frame_rate(value: f64) -> FramecastResult<f64> {
    if !value.is_finite() || value <= 0.0 || value > MAX_FPS {
        return Err(FramecastError::validation(format!(
            "frame rate must be in (0, {MAX_FPS}], got {value}"
        )));
    }
    Ok(value)
}

/// Parse and validate an image quality percentage (0-100).
pub fn parse_image_quality(raw: &str) -> FramecastResult<u8> {
    let value: i64 = raw.trim().parse().map_err(|_| {
        FramecastError::validation(format!("image quality must be a number, got '{raw}'"))
    })?;
    ensure_image_quality(value)
}

/// Validate an already-numeric image quality percentage.
pub fn ensure_image_quality(value: i64) -> FramecastResult<u8> {
    if !(0..=100).contains(&value) {
        return Err(FramecastError::validation(format!(
            "image quality must be in [0, 100], got {value}"
        )));
    }
    Ok(value as u8)
}

/// Parse and validate a render scale factor in `(0, 10]`.
pub fn parse_scale(raw: &str) -> FramecastResult<f64> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| FramecastError::validation(format!("scale must be a number, got '{raw}'")))?;
    ensure_scale(value)
}

/// Validate an already-numeric render scale factor.
pub fn ensure_scale(value: f64) -> FramecastResult<f64> {
    if !value.is_finite() || value <= 0.0 || value > MAX_SCALE {
        return Err(FramecastError::validation(format!(
            "scale must be in (0, {MAX_SCALE}], got {value}"
        )));
    }
    Ok(value)
}

/// Validate a frontend URL.
///
/// Only `http`/`https` schemes are accepted, the host must be local
/// unless `allow_remote` is set, and an explicit port must be valid.
pub fn validate_frontend_url(raw: &str, allow_remote: bool) -> FramecastResult<String> {
    let trimmed = raw.trim();
    let rest = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .ok_or_else(|| {
            FramecastError::validation(format!(
                "frontend URL must use http or https, got '{trimmed}'"
            ))
        })?;

    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if authority.is_empty() {
        return Err(FramecastError::validation(format!(
            "frontend URL has no host: '{trimmed}'"
        )));
    }

    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) if !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()) => (h, Some(p)),
        _ => (authority, None),
    };

    if let Some(port) = port {
        parse_port(port)?;
    }

    if !allow_remote && !is_local_host(host) {
        return Err(FramecastError::validation(format!(
            "frontend host '{host}' is not local; pass --allow-remote to target it"
        )));
    }

    Ok(trimmed.trim_end_matches('/').to_string())
}

fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "0.0.0.0" | "[::1]" | "::1") || host.starts_with("127.")
}

/// Validate a frame range against a composition duration.
///
/// Requires `0 <= start <= end < duration`.
pub fn validate_frame_range(start: u32, end: u32, duration_in_frames: u32) -> FramecastResult<()> {
    if start > end {
        return Err(FramecastError::validation(format!(
            "start frame {start} must be <= end frame {end}"
        )));
    }
    if end >= duration_in_frames {
        return Err(FramecastError::validation(format!(
            "end frame {end} must be < duration {duration_in_frames}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(result: FramecastResult<impl std::fmt::Debug>) -> String {
        result.unwrap_err().to_string()
    }

    #[test]
    fn test_quality_factor_domain_is_exact() {
        assert_eq!(parse_quality_factor("0").unwrap(), 0);
        assert_eq!(parse_quality_factor("51").unwrap(), 51);
        assert!(message(parse_quality_factor("-1")).contains("[0, 51]"));
        assert!(message(parse_quality_factor("52")).contains("[0, 51]"));
    }

    #[test]
    fn test_quality_factor_rejects_non_numeric() {
        assert!(message(parse_quality_factor("fast")).contains("must be a number"));
    }

    #[test]
    fn test_quality_factor_is_idempotent() {
        let once = parse_quality_factor("23").unwrap();
        let twice = parse_quality_factor(&once.to_string()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_port_bounds() {
        assert_eq!(parse_port("3000").unwrap(), 3000);
        assert!(parse_port("0").is_err());
        assert!(parse_port("65536").is_err());
        assert!(parse_port("web").is_err());
    }

    #[test]
    fn test_dimension_bounds() {
        assert_eq!(parse_dimension("1920").unwrap(), 1920);
        assert_eq!(parse_dimension("7680").unwrap(), 7680);
        assert!(parse_dimension("0").is_err());
        assert!(parse_dimension("7681").is_err());
    }

    #[test]
    fn test_frame_rate_bounds() {
        assert_eq!(parse_frame_rate("29.97").unwrap(), 29.97);
        assert!(parse_frame_rate("0").is_err());
        assert!(parse_frame_rate("121").is_err());
        assert!(parse_frame_rate("NaN").is_err());
    }

    #[test]
    fn test_image_quality_bounds() {
        assert_eq!(parse_image_quality("0").unwrap(), 0);
        assert_eq!(parse_image_quality("100").unwrap(), 100);
        assert!(parse_image_quality("101").is_err());
    }

    #[test]
    fn test_scale_bounds() {
        assert_eq!(parse_scale("0.5").unwrap(), 0.5);
        assert_eq!(parse_scale("10").unwrap(), 10.0);
        assert!(parse_scale("0").is_err());
        assert!(parse_scale("10.5").is_err());
    }

    #[test]
    fn test_frontend_url_local_only_by_default() {
        assert_eq!(
            validate_frontend_url("http://localhost:3000/", false).unwrap(),
            "http://localhost:3000"
        );
        assert!(validate_frontend_url("http://render.example.com", false).is_err());
        assert!(validate_frontend_url("http://render.example.com", true).is_ok());
    }

    #[test]
    fn test_frontend_url_rejects_bad_scheme_and_port() {
        assert!(validate_frontend_url("ftp://localhost", true).is_err());
        assert!(validate_frontend_url("http://localhost:99999", true).is_err());
    }

    #[test]
    fn test_frame_range() {
        assert!(validate_frame_range(0, 299, 300).is_ok());
        assert!(message(validate_frame_range(0, 300, 300)).contains("must be <"));
        assert!(message(validate_frame_range(100, 50, 300)).contains("must be <="));
    }
}
