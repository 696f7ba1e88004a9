//! Compression quality tiers.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;

/// Page geometry factor applied by the `Low` tier.
pub const LOW_TIER_PAGE_SCALE: f32 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum QualityTier {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityTier {
    /// Image re-encode quality factor in `0.0..=1.0`.
    pub fn image_quality(self) -> f32 {
        match self {
            QualityTier::Low => 0.3,
            QualityTier::Medium => 0.6,
            QualityTier::High => 0.85,
        }
    }

    pub fn jpeg_quality(self) -> u8 {
        (self.image_quality() * 100.0).round() as u8
    }

    /// Uniform scale for page geometry, if this tier changes it.
    ///
    /// Only `Low` shrinks pages. `Medium` and `High` leave geometry alone and
    /// rely on object-stream packing alone.
    pub fn page_scale(self) -> Option<f32> {
        match self {
            QualityTier::Low => Some(LOW_TIER_PAGE_SCALE),
            QualityTier::Medium | QualityTier::High => None,
        }
    }

    /// Lenient parse used by the browser surface: unknown labels fall back
    /// to `Medium`.
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or_default()
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(QualityTier::Low),
            "medium" => Ok(QualityTier::Medium),
            "high" => Ok(QualityTier::High),
            other => Err(format!("unknown quality tier: {}", other)),
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_factors() {
        assert_eq!(QualityTier::Low.image_quality(), 0.3);
        assert_eq!(QualityTier::Medium.image_quality(), 0.6);
        assert_eq!(QualityTier::High.image_quality(), 0.85);
        assert_eq!(QualityTier::Low.jpeg_quality(), 30);
        assert_eq!(QualityTier::High.jpeg_quality(), 85);
    }

    #[test]
    fn test_only_low_scales_pages() {
        assert_eq!(QualityTier::Low.page_scale(), Some(0.75));
        assert_eq!(QualityTier::Medium.page_scale(), None);
        assert_eq!(QualityTier::High.page_scale(), None);
    }

    #[test]
    fn test_label_parsing() {
        assert_eq!("LOW".parse::<QualityTier>(), Ok(QualityTier::Low));
        assert!("ultra".parse::<QualityTier>().is_err());
        assert_eq!(QualityTier::from_label("ultra"), QualityTier::Medium);
        assert_eq!(QualityTier::from_label("high"), QualityTier::High);
    }
}
