//! Human-readable sizes and the compression savings line.

const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Formats a byte count with 1024-based units, two decimals at most.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut exponent = 0;
    let mut unit = 1u64;
    while exponent < UNITS.len() - 1 && bytes >= unit * 1024 {
        unit *= 1024;
        exponent += 1;
    }
    let scaled = (bytes as f64 / unit as f64 * 100.0).round() / 100.0;
    format!("{} {}", scaled, UNITS[exponent])
}

/// Input and output sizes of one compression run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavingsReport {
    pub original: u64,
    pub compressed: u64,
}

impl SavingsReport {
    pub fn new(original: u64, compressed: u64) -> Self {
        Self {
            original,
            compressed,
        }
    }

    /// Bytes saved, never negative: a larger output reports zero.
    pub fn saved_bytes(&self) -> u64 {
        self.original.saturating_sub(self.compressed)
    }

    pub fn saved_percent(&self) -> u64 {
        if self.original == 0 {
            return 0;
        }
        (self.saved_bytes() as f64 / self.original as f64 * 100.0).round() as u64
    }

    pub fn saved_label(&self) -> String {
        let saved = self.saved_bytes();
        if saved == 0 {
            return "0 Bytes (0%)".to_string();
        }
        format!("{} ({}%)", format_file_size(saved), self.saved_percent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024 * 1024), "3072 GB");
    }

    #[test]
    fn test_savings_label() {
        let report = SavingsReport::new(2048, 1024);
        assert_eq!(report.saved_bytes(), 1024);
        assert_eq!(report.saved_label(), "1 KB (50%)");
    }

    #[test]
    fn test_growth_reports_zero() {
        let report = SavingsReport::new(1000, 1200);
        assert_eq!(report.saved_bytes(), 0);
        assert_eq!(report.saved_percent(), 0);
        assert_eq!(report.saved_label(), "0 Bytes (0%)");

        let unchanged = SavingsReport::new(1000, 1000);
        assert_eq!(unchanged.saved_label(), "0 Bytes (0%)");
    }
}
