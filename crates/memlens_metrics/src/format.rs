//! Human-readable byte counts

const SUFFIXES: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Turns a signed byte count into display text.
pub trait FormatBytes {
    fn format_bytes(&self, bytes: i64) -> String;
}

/// Default formatter: `1536 -> "1.5KB"`, `-2048 -> "-2KB"`, `0 -> "0B"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFormatter {
    precision: usize,
}

impl DataFormatter {
    pub const DEFAULT_PRECISION: usize = 2;

    pub fn new(precision: usize) -> Self {
        Self { precision }
    }

    pub fn precision(&self) -> usize {
        self.precision
    }
}

impl Default for DataFormatter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PRECISION)
    }
}

impl FormatBytes for DataFormatter {
    fn format_bytes(&self, bytes: i64) -> String {
        if bytes == 0 {
            return "0B".to_string();
        }
        let sign = if bytes < 0 { "-" } else { "" };
        let size = bytes.unsigned_abs();

        let mut exponent = 0;
        while exponent + 1 < SUFFIXES.len() && size >= 1u64 << (10 * (exponent + 1)) {
            exponent += 1;
        }

        let value = size as f64 / (1u64 << (10 * exponent)) as f64;
        let factor = 10f64.powi(self.precision as i32);
        let rounded = (value * factor).round() / factor;
        format!("{sign}{rounded}{}", SUFFIXES[exponent])
    }
}
