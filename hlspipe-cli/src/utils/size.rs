use crate::error::AppError;

/// Parse a byte count or rate such as `625KB`, `625k` (wget style) or `1.5MB`.
/// Units are binary (1 KB = 1024 B); a bare number is bytes.
pub fn parse_size(size_str: &str) -> Result<u64, AppError> {
    let size_str = size_str.trim().to_lowercase();
    if size_str.is_empty() {
        return Err(AppError::ParseError("Invalid size: empty string".to_string()));
    }

    let split = size_str
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(size_str.len());
    let (numeric_part, unit_part) = size_str.split_at(split);

    if unit_part.is_empty() {
        return numeric_part
            .parse::<u64>()
            .map_err(|_| AppError::ParseError(format!("Invalid number '{numeric_part}'")));
    }

    let value = numeric_part
        .parse::<f64>()
        .map_err(|_| AppError::ParseError(format!("Invalid number '{numeric_part}'")))?;

    let multiplier = match unit_part.trim() {
        "b" => 1.0,
        "k" | "kb" => 1024.0,
        "m" | "mb" => 1024.0 * 1024.0,
        "g" | "gb" => 1024.0 * 1024.0 * 1024.0,
        unit => return Err(AppError::ParseError(format!("Invalid unit '{unit}'"))),
    };
    Ok((value * multiplier) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wget_style_rates() {
        assert_eq!(parse_size("625k").unwrap(), 640_000);
        assert_eq!(parse_size("625KB").unwrap(), 640_000);
        assert_eq!(parse_size(" 1.5mb ").unwrap(), 1_572_864);
        assert_eq!(parse_size("640000").unwrap(), 640_000);
        assert_eq!(parse_size("0").unwrap(), 0);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("fast").is_err());
        assert!(parse_size("10 parsecs").is_err());
    }
}
