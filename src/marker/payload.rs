//! Decoded content of a QR code.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::geometry::modules_per_side;

/// Largest QR code version.
pub const MAX_VERSION: u32 = 40;

/// Error-correction level of a QR code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCorrection {
    /// ~7% recovery capacity.
    Low,
    /// ~15% recovery capacity.
    Medium,
    /// ~25% recovery capacity.
    Quartile,
    /// ~30% recovery capacity.
    High,
}

/// Identity and content of a decoded marker.
///
/// `modules` holds the raw module bits row by row (`true` = dark) and may be
/// empty when the decoder does not report them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerPayload {
    pub version: u32,
    pub error_correction: ErrorCorrection,
    pub mask: u8,
    pub data: Vec<u8>,
    pub modules: Vec<bool>,
}

impl MarkerPayload {
    pub fn new(version: u32, error_correction: ErrorCorrection, data: impl Into<Vec<u8>>) -> Self {
        Self {
            version,
            error_correction,
            mask: 0,
            data: data.into(),
            modules: Vec::new(),
        }
    }

    pub fn with_mask(mut self, mask: u8) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_modules(mut self, modules: Vec<bool>) -> Self {
        self.modules = modules;
        self
    }

    pub fn is_valid(&self) -> bool {
        if !(1..=MAX_VERSION).contains(&self.version) || self.mask > 7 {
            return false;
        }
        let side = modules_per_side(self.version) as usize;
        self.modules.is_empty() || self.modules.len() == side * side
    }

    pub fn modules_per_side(&self) -> u32 {
        modules_per_side(self.version)
    }

    /// True if both payloads encode the same content.
    ///
    /// With `ignore_modules` the raw module bits are not compared, so two
    /// reads of the same code with a few misread modules still match.
    pub fn is_same(&self, other: &MarkerPayload, ignore_modules: bool) -> bool {
        self.version == other.version
            && self.error_correction == other.error_correction
            && self.mask == other.mask
            && self.data == other.data
            && (ignore_modules || self.modules == other.modules)
    }

    /// Payload data as text, with invalid UTF-8 replaced.
    pub fn data_string(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

impl fmt::Display for MarkerPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QR v{} {:?} \"{}\"", self.version, self.error_correction, self.data_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_same_ignores_modules_when_asked() {
        let a = MarkerPayload::new(2, ErrorCorrection::Medium, "hello").with_modules(vec![true; 625]);
        let mut b = a.clone();
        b.modules[10] = false;

        assert!(a.is_same(&b, true));
        assert!(!a.is_same(&b, false));
    }

    #[test]
    fn test_is_same_compares_content() {
        let a = MarkerPayload::new(2, ErrorCorrection::Medium, "hello");

        assert!(!a.is_same(&MarkerPayload::new(2, ErrorCorrection::Medium, "world"), true));
        assert!(!a.is_same(&MarkerPayload::new(3, ErrorCorrection::Medium, "hello"), true));
        assert!(!a.is_same(&MarkerPayload::new(2, ErrorCorrection::High, "hello"), true));
    }

    #[test]
    fn test_validity() {
        assert!(MarkerPayload::new(1, ErrorCorrection::Low, "x").is_valid());
        assert!(!MarkerPayload::new(0, ErrorCorrection::Low, "x").is_valid());
        assert!(!MarkerPayload::new(41, ErrorCorrection::Low, "x").is_valid());
        assert!(!MarkerPayload::new(1, ErrorCorrection::Low, "x").with_modules(vec![false; 20]).is_valid());
        assert!(!MarkerPayload::new(1, ErrorCorrection::Low, "x").with_mask(8).is_valid());
    }

    #[test]
    fn test_display() {
        let payload = MarkerPayload::new(1, ErrorCorrection::Low, "abc");
        assert_eq!(payload.to_string(), "QR v1 Low \"abc\"");
    }
}
