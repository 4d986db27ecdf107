//! License evaluation: allow/deny from a device snapshot and today's date.

use crate::device::{Device, DeviceStatus, LicenseType};
use crate::period::end_date_for;
use chrono::NaiveDate;

/// Outcome of evaluating a device's license.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Whether the installation may run.
    pub allow: bool,
    /// Human-readable reason, suitable for end-user display.
    pub message: String,
    /// The effective end date after self-healing, if any.
    pub effective_end: Option<NaiveDate>,
}

/// Evaluates a device snapshot. Pure: same `(device, today)` in, same
/// result out.
///
/// Order matters: blocked wins over everything, expiry is checked before
/// pending so an expired pending license reports expiry, and a missing end
/// date on a non-lifetime license is recomputed from the start date before
/// the expiry check (self-healing for legacy records).
#[must_use]
pub fn evaluate(device: &Device, today: NaiveDate) -> Evaluation {
    if device.status == DeviceStatus::Blocked {
        return Evaluation {
            allow: false,
            message: "License blocked.".to_string(),
            effective_end: device.end_date,
        };
    }

    let mut effective_end = device.end_date;
    if device.license_type != LicenseType::Lifetime && effective_end.is_none() {
        effective_end = end_date_for(device.license_type, device.start_date);
    }

    if device.license_type != LicenseType::Lifetime {
        if let Some(end) = effective_end {
            if today > end {
                return Evaluation {
                    allow: false,
                    message: format!("License expired on {}.", end.format("%d/%m/%Y")),
                    effective_end,
                };
            }
        }
    }

    if device.status == DeviceStatus::Pending {
        return Evaluation {
            allow: false,
            message: "License awaiting approval.".to_string(),
            effective_end,
        };
    }

    Evaluation {
        allow: true,
        message: "License active.".to_string(),
        effective_end,
    }
}
