//! Quality search under a byte budget.
//!
//! Ad networks cap creative backup images at a fixed weight, so exports
//! pick the highest JPEG quality whose output still fits. The search has
//! two phases:
//!
//! 1. Probe at [`PROBE_QUALITY`]. Most banners fit here and return at once.
//! 2. Otherwise bisect `[MIN_QUALITY, PROBE_QUALITY]` for at most
//!    [`MAX_ITERATIONS`] steps, remembering the last in-budget result.
//!
//! If nothing fits, the image is encoded at [`MIN_QUALITY`] and returned
//! anyway, flagged as over budget. An unreachable budget is never an error.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::jpeg::{encode_rgb, EncodeError};

/// Quality tried before any bisection.
pub const PROBE_QUALITY: f32 = 0.95;
/// Lowest quality the search will go to.
pub const MIN_QUALITY: f32 = 0.35;
/// Bisection steps after a failed probe.
pub const MAX_ITERATIONS: u32 = 8;

/// Maximum acceptable size of an encoded image, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ByteBudget(u64);

impl ByteBudget {
    /// Budget used by the preview tool's screenshot button.
    pub const DEFAULT: ByteBudget = ByteBudget::from_kib(48);

    pub const fn from_bytes(bytes: u64) -> Self {
        ByteBudget(bytes)
    }

    pub const fn from_kib(kib: u64) -> Self {
        ByteBudget(kib * 1024)
    }

    pub fn bytes(self) -> u64 {
        self.0
    }

    pub fn admits(self, len: usize) -> bool {
        len as u64 <= self.0
    }
}

impl Default for ByteBudget {
    fn default() -> Self {
        ByteBudget::DEFAULT
    }
}

/// Something that can be encoded at a canvas-style quality (`0.0..=1.0`).
pub trait QualityEncoder {
    fn encode_at(&self, quality: f32) -> Result<Vec<u8>, EncodeError>;
}

impl QualityEncoder for RgbImage {
    fn encode_at(&self, quality: f32) -> Result<Vec<u8>, EncodeError> {
        encode_rgb(self, quality)
    }
}

/// Result of a budgeted encode.
#[derive(Debug, Clone)]
pub struct BudgetedJpeg {
    pub bytes: Vec<u8>,
    /// Quality the returned bytes were encoded at.
    pub quality: f32,
    /// False when even [`MIN_QUALITY`] exceeded the budget.
    pub within_budget: bool,
    /// Number of encoder invocations.
    pub attempts: u32,
}

/// Encode at the highest quality that fits `budget`.
///
/// # Errors
///
/// Returns [`EncodeError::NoOutput`] only when the final encode at
/// [`MIN_QUALITY`] produces nothing.
pub fn encode_under_budget<E>(encoder: &E, budget: ByteBudget) -> Result<BudgetedJpeg, EncodeError>
where
    E: QualityEncoder + ?Sized,
{
    let mut attempts = 0;
    let mut attempt = |quality: f32| {
        attempts += 1;
        match encoder.encode_at(quality) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) => {
                warn!(quality, error = %e, "encoder produced no output");
                None
            }
        }
    };

    if let Some(bytes) = attempt(PROBE_QUALITY) {
        if budget.admits(bytes.len()) {
            debug!(size = bytes.len(), budget = budget.bytes(), "probe fits");
            return Ok(BudgetedJpeg {
                bytes,
                quality: PROBE_QUALITY,
                within_budget: true,
                attempts: 1,
            });
        }
    }

    let mut lo = MIN_QUALITY;
    let mut hi = PROBE_QUALITY;
    let mut best: Option<(Vec<u8>, f32)> = None;

    for _ in 0..MAX_ITERATIONS {
        let mid = (lo + hi) / 2.0;
        let Some(bytes) = attempt(mid) else { break };

        if budget.admits(bytes.len()) {
            debug!(quality = mid, size = bytes.len(), "fits, searching higher");
            best = Some((bytes, mid));
            lo = mid;
        } else {
            debug!(quality = mid, size = bytes.len(), "too large, searching lower");
            hi = mid;
        }
    }

    if let Some((bytes, quality)) = best {
        return Ok(BudgetedJpeg {
            bytes,
            quality,
            within_budget: true,
            attempts,
        });
    }

    let bytes = attempt(MIN_QUALITY).ok_or(EncodeError::NoOutput)?;
    let within_budget = budget.admits(bytes.len());
    if !within_budget {
        warn!(
            size = bytes.len(),
            budget = budget.bytes(),
            "budget unreachable, returning minimum quality"
        );
    }
    Ok(BudgetedJpeg {
        bytes,
        quality: MIN_QUALITY,
        within_budget,
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Encoder whose output size is a function of quality; records every call.
    struct SizedEncoder<F: Fn(f32) -> Option<usize>> {
        size_at: F,
        calls: RefCell<Vec<f32>>,
    }

    impl<F: Fn(f32) -> Option<usize>> SizedEncoder<F> {
        fn new(size_at: F) -> Self {
            Self {
                size_at,
                calls: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<f32> {
            self.calls.borrow().clone()
        }
    }

    impl<F: Fn(f32) -> Option<usize>> QualityEncoder for SizedEncoder<F> {
        fn encode_at(&self, quality: f32) -> Result<Vec<u8>, EncodeError> {
            self.calls.borrow_mut().push(quality);
            match (self.size_at)(quality) {
                Some(len) => Ok(vec![0xAB; len]),
                None => Err(EncodeError::EncodingFailed("no blob".into())),
            }
        }
    }

    const KB: usize = 1024;

    /// 30 KB at 0.35 rising linearly to 200 KB at 0.95.
    fn linear(q: f32) -> Option<usize> {
        let t = ((q - MIN_QUALITY) / (PROBE_QUALITY - MIN_QUALITY)).clamp(0.0, 1.0);
        Some(30 * KB + (t * (170 * KB) as f32) as usize)
    }

    #[test]
    fn test_byte_budget_units() {
        assert_eq!(ByteBudget::from_kib(50).bytes(), 51_200);
        assert_eq!(ByteBudget::default().bytes(), 48 * 1024);
        assert!(ByteBudget::from_bytes(10).admits(10));
        assert!(!ByteBudget::from_bytes(10).admits(11));
    }

    #[test]
    fn test_probe_fits_returns_immediately() {
        let encoder = SizedEncoder::new(|_| Some(40 * KB));
        let out = encode_under_budget(&encoder, ByteBudget::from_kib(50)).unwrap();

        assert_eq!(out.quality, PROBE_QUALITY);
        assert!(out.within_budget);
        assert_eq!(out.attempts, 1);
        assert_eq!(encoder.calls(), vec![PROBE_QUALITY]);
    }

    #[test]
    fn test_search_converges_under_budget() {
        let encoder = SizedEncoder::new(linear);
        let budget = ByteBudget::from_kib(50);
        let out = encode_under_budget(&encoder, budget).unwrap();

        assert!(out.within_budget);
        assert!(budget.admits(out.bytes.len()));
        assert!(out.quality > MIN_QUALITY && out.quality < PROBE_QUALITY);

        let calls = encoder.calls();
        assert_eq!(calls.len() as u32, 1 + MAX_ITERATIONS);
        assert_eq!(out.attempts, 1 + MAX_ITERATIONS);

        // The returned quality is the best of all sampled in-budget qualities
        let best_sampled = calls
            .iter()
            .copied()
            .filter(|q| budget.admits(linear(*q).unwrap()))
            .fold(f32::MIN, f32::max);
        assert_eq!(out.quality, best_sampled);
    }

    #[test]
    fn test_unreachable_budget_degrades_to_minimum() {
        let encoder = SizedEncoder::new(linear);
        let out = encode_under_budget(&encoder, ByteBudget::from_kib(10)).unwrap();

        assert_eq!(out.quality, MIN_QUALITY);
        assert!(!out.within_budget);
        assert_eq!(out.bytes.len(), 30 * KB);
        assert_eq!(*encoder.calls().last().unwrap(), MIN_QUALITY);
    }

    #[test]
    fn test_probe_failure_enters_search() {
        let encoder = SizedEncoder::new(|q| if q >= PROBE_QUALITY { None } else { Some(KB) });
        let out = encode_under_budget(&encoder, ByteBudget::from_kib(50)).unwrap();

        assert!(out.within_budget);
        assert!(out.quality > 0.9);
    }

    #[test]
    fn test_search_failure_stops_early_and_falls_back() {
        // Fails at every bisection step but works at the minimum
        let encoder = SizedEncoder::new(|q| {
            if q == MIN_QUALITY {
                Some(KB)
            } else if q >= PROBE_QUALITY {
                Some(100 * KB)
            } else {
                None
            }
        });
        let out = encode_under_budget(&encoder, ByteBudget::from_kib(50)).unwrap();

        assert_eq!(out.quality, MIN_QUALITY);
        assert_eq!(encoder.calls().len(), 3);
    }

    #[test]
    fn test_no_output_at_all_is_an_error() {
        let encoder = SizedEncoder::new(|_| None);
        let err = encode_under_budget(&encoder, ByteBudget::from_kib(50)).unwrap_err();
        assert!(matches!(err, EncodeError::NoOutput));
    }

    #[test]
    fn test_real_image_respects_budget() {
        let img = RgbImage::from_fn(300, 250, |x, y| {
            image::Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x ^ y) % 256) as u8])
        });
        let min_size = img.encode_at(MIN_QUALITY).unwrap().len();
        let budget = ByteBudget::from_bytes(min_size as u64 + 2048);

        let out = encode_under_budget(&img, budget).unwrap();
        assert!(out.within_budget);
        assert!(budget.admits(out.bytes.len()));
        assert_eq!(&out.bytes[0..2], &[0xFF, 0xD8]);
    }
}
