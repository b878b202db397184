//! Maps `Box<dyn Error>` from trait boundaries to typed `AdcError`.
//!
//! The traits in `adcmon_traits` use `Box<dyn Error + Send + Sync>` for
//! maximum flexibility; this module converts those to our typed error enum,
//! with an optional feature-gated path for `adcmon_hardware::HwError`
//! downcasting.

use crate::error::AdcError;

/// Map a trait-boundary error to a typed `AdcError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error_dyn(e: &(dyn std::error::Error + 'static)) -> AdcError {
    // Feature-gated: try to downcast to HwError for precise mapping
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<adcmon_hardware::error::HwError>() {
            return match hw {
                adcmon_hardware::error::HwError::Unresolved(name) => {
                    AdcError::ConfigUnresolved(name.clone())
                }
                other => AdcError::Hardware(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("unresolved") {
        AdcError::ConfigUnresolved(s)
    } else {
        AdcError::Hardware(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_errors_map_to_hardware() {
        let e = std::io::Error::other("bus fell over");
        match map_hw_error_dyn(&e) {
            AdcError::Hardware(s) => assert!(s.contains("bus fell over")),
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn unresolved_register_downcasts_precisely() {
        let e = adcmon_hardware::error::HwError::Unresolved("scope_snap0_ctrl".into());
        match map_hw_error_dyn(&e) {
            AdcError::ConfigUnresolved(name) => assert_eq!(name, "scope_snap0_ctrl"),
            other => panic!("unexpected mapping: {other:?}"),
        }
    }
}
