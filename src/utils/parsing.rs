/// Trait for parsing the device frontend's string-typed values.
pub trait DeviceValueParser {
    /// Parse a numeric string into a float, defaulting to 0.0 if parsing fails
    fn parse_float(s: &str) -> f64 {
        s.parse::<f64>().unwrap_or(0.0)
    }

    /// Parse a numeric string into an integer, defaulting to 0 if parsing fails
    fn parse_int(s: &str) -> i32 {
        s.parse::<i32>().unwrap_or(0)
    }

    /// Parse a boolean string, treating "true" (case-sensitive) as true
    fn parse_bool(s: &str) -> bool {
        s == "true"
    }
}

impl DeviceValueParser for str {}
