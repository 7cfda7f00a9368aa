//! The furnace decision itself: a fixed precedence chain over the current
//! temperature, occupancy, override, and the previous furnace state.

/// Threshold to hold when nobody is home, used when the setting is missing
/// or unreadable.
pub const DEFAULT_IDLE_TEMP: f64 = 12.5;

/// Threshold to hold while someone is home, used when the setting is
/// missing or unreadable.
pub const DEFAULT_ACTIVE_TEMP: f64 = 15.5;

/// A furnace that is already running keeps running until the temperature
/// clears the governing threshold by this factor. Stops the furnace from
/// short-cycling right at the threshold.
pub const HYSTERESIS_BAND: f64 = 1.05;

/// Everything one decision needs, resolved by the caller.
#[derive(Debug, Clone, Copy)]
pub struct PolicyInputs {
    pub current_temp: f64,
    pub idle_temp: f64,
    pub active_temp: f64,
    pub occupied: bool,
    pub override_active: bool,
    pub furnace_was_on: bool,
}

/// First matching rule wins:
///
/// 1. below the idle floor, always burn;
/// 2. somebody home and below the active threshold, burn;
/// 3. override active, burn;
/// 4. already burning and still inside the hysteresis band of whichever
///    threshold governs right now, keep burning;
/// 5. otherwise, off.
///
/// Rule 4 only holds a running furnace on; it never starts one. A cold
/// start has to come from rules 1-3.
pub fn should_burn(inputs: &PolicyInputs) -> bool {
    if inputs.current_temp < inputs.idle_temp {
        return true;
    }

    if inputs.occupied && inputs.current_temp < inputs.active_temp {
        return true;
    }

    if inputs.override_active {
        return true;
    }

    if inputs.furnace_was_on {
        let threshold = if inputs.occupied {
            inputs.active_temp
        } else {
            inputs.idle_temp
        };
        if inputs.current_temp < threshold * HYSTERESIS_BAND {
            return true;
        }
    }

    false
}
