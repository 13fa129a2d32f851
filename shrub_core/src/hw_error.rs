//! Maps `Box<dyn Error>` from the actuator traits to typed `ShrubError`.
//!
//! The traits in `shrub_traits` use `Box<dyn Error + Send + Sync>` so any
//! driver can plug in; this module converts those to our typed error enum,
//! with an optional feature-gated path for `shrub_hardware::HwError`.

use crate::error::ShrubError;

/// Map a trait-boundary actuator error to a typed `ShrubError`.
///
/// Known hardware error types are downcast first; anything else is carried
/// as its display string.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ShrubError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<shrub_hardware::error::HwError>() {
            return match hw {
                shrub_hardware::error::HwError::Gpio(_) | shrub_hardware::error::HwError::I2c(_) => {
                    ShrubError::ActuatorFault(hw.to_string())
                }
                other => ShrubError::Actuator(other.to_string()),
            };
        }
    }

    ShrubError::Actuator(e.to_string())
}
