use crate::error::AppError;
use std::time::Duration;

/// Parse an interval such as `10`, `10s`, `1.5m` or `1h`. A bare number is seconds.
pub fn parse_time(time_str: &str) -> Result<Duration, AppError> {
    let time_str = time_str.trim();
    if time_str.is_empty() {
        return Err(AppError::ParseError("Invalid interval: empty string".to_string()));
    }

    let split = time_str
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(time_str.len());
    let (numeric_part, unit_part) = time_str.split_at(split);

    let value = numeric_part
        .parse::<f64>()
        .map_err(|_| AppError::ParseError(format!("Invalid number '{numeric_part}'")))?;

    let seconds = match unit_part.trim().to_lowercase().as_str() {
        "" | "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        unit => return Err(AppError::ParseError(format!("Invalid unit '{unit}'"))),
    };
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| AppError::ParseError(format!("Invalid interval '{time_str}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_are_converted() {
        assert_eq!(parse_time("10").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_time("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_time("1.5m").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_time("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_time("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn rejects_unknown_units() {
        assert!(parse_time("10d").is_err());
        assert!(parse_time("").is_err());
        assert!(parse_time("s").is_err());
    }
}
