mod headers;
mod size;
mod time;

// Export utility functions
pub use self::headers::parse_headers;
pub use self::size::parse_size;
pub use self::time::parse_time;
