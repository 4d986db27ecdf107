//! Clone-usage detection: the anti-piracy signal.
//!
//! Flags one device id being used from materially different origins within
//! a short window. The request being verified counts as a member of the
//! window alongside the logged accesses — it is an access inside the
//! window, just not yet recorded. Two rules:
//!
//! 1. More distinct IPs among the window's allowed accesses (current
//!    request included) than the configured maximum.
//! 2. Current (ip, hostname) both differ from the device's last-seen pair —
//!    catches a hot swap whose previous origin never made it into the
//!    allowed-access window (e.g. its attempts were denied), so it is
//!    intentionally broader than rule 1, not redundant with it.
//!
//! This is a heuristic, not a consistency guarantee: near-simultaneous
//! requests can double-fire or lag by one request. Detection is advisory;
//! the orchestrator owns enforcement (blocking and re-evaluation).

use crate::access::AccessLogEntry;
use std::collections::BTreeSet;

/// Inspects the trailing window of allowed accesses for clone usage.
///
/// `recent` must already be filtered to allowed entries for this device
/// within the detection window (the store query does that). Returns the
/// clone message on detection, `None` when the signal is clean or the
/// window holds no prior access at all.
#[must_use]
pub fn detect_clone(
    recent: &[AccessLogEntry],
    last_seen_ip: Option<&str>,
    last_seen_hostname: Option<&str>,
    current_ip: &str,
    current_hostname: &str,
    max_simultaneous_ips: usize,
) -> Option<String> {
    if recent.is_empty() {
        return None;
    }

    // BTreeSet so the offending IPs list is stable in the message
    let mut unique_ips: BTreeSet<&str> = recent
        .iter()
        .map(|entry| entry.ip.as_str())
        .filter(|ip| !ip.is_empty())
        .collect();
    if !current_ip.is_empty() {
        unique_ips.insert(current_ip);
    }

    if unique_ips.len() > max_simultaneous_ips {
        let count = unique_ips.len();
        let ips = unique_ips.into_iter().collect::<Vec<_>>().join(", ");
        return Some(format!(
            "Simultaneous use detected from {count} different IPs: {ips}. License blocked for possible cloning."
        ));
    }

    let last_ip = last_seen_ip.unwrap_or("");
    let last_hostname = last_seen_hostname.unwrap_or("");
    if !last_ip.is_empty()
        && current_ip != last_ip
        && current_hostname != last_hostname
        && !last_hostname.is_empty()
        && !current_hostname.is_empty()
    {
        return Some(format!(
            "Suspicious change detected: IP {last_ip} -> {current_ip}, hostname {last_hostname} -> {current_hostname}. Possible cloning."
        ));
    }

    None
}
