use clap::ValueEnum;

/// Rendering of query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable listing grouped by PR
    #[default]
    #[value(alias = "stdout")]
    Text,
    /// Pretty-printed JSON array of rows
    Json,
    /// Nine-column CSV with a header row
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_names() {
        assert_eq!(OutputFormat::from_str("stdout", true).unwrap(), OutputFormat::Text);
        assert_eq!(OutputFormat::from_str("csv", true).unwrap(), OutputFormat::Csv);
        assert!(OutputFormat::from_str("xml", true).is_err());
        assert_eq!(OutputFormat::default().to_string(), "text");
    }
}
