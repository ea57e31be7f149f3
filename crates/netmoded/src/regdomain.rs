//! Regulatory domain detection
//!
//! Runs once per arbitration flow. When the radio still carries the
//! unconfigured default domain, nearby beacons are scanned for country codes
//! and the most frequent one is applied and persisted for the next boot.

use crate::platform::Platform;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Domains meaning "never configured"
const UNSET_DOMAINS: &[&str] = &["00", "0099", ""];

pub fn is_unset(domain: &str) -> bool {
    UNSET_DOMAINS.contains(&domain.trim())
}

/// Only two-letter codes can be applied
pub fn is_valid(domain: &str) -> bool {
    domain.len() == 2
}

/// Most frequent code; ties go to the code seen first
pub fn most_frequent_country<S: AsRef<str>>(codes: &[S]) -> Option<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (index, code) in codes.iter().enumerate() {
        let code = code.as_ref().trim();
        if code.is_empty() {
            continue;
        }
        counts.entry(code).or_insert((0, index)).0 += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(code, _)| code.to_string())
}

/// Detect and apply the regulatory domain
///
/// Best-effort: every failure is logged and the radio keeps its current
/// domain.
pub async fn detect_and_apply(platform: &dyn Platform, iface: &str, crda_config: &Path) {
    let current = match platform.regdomain(iface).await {
        Ok(domain) => domain,
        Err(e) => {
            info!("Failed to determine most appropriate reg domain: {}", e);
            return;
        }
    };
    debug!("CURRENT REG DOMAIN: {}", current);

    if !is_unset(&current) {
        info!("Regdomain already set to: {}, skipping scan", current);
        return;
    }

    debug!("Current regdomain is default, scanning for appropriate regdomain...");
    let codes = match platform.beacon_countries(iface).await {
        Ok(codes) => codes,
        Err(e) => {
            info!("Failed to determine most appropriate reg domain: {}", e);
            return;
        }
    };

    let Some(best) = most_frequent_country(&codes) else {
        debug!("No country codes advertised nearby");
        return;
    };
    debug!("APPROPRIATE REG DOMAIN: {}", best);

    if !is_valid(&best) || best == current {
        return;
    }

    info!("SETTING APPROPRIATE REG DOMAIN: {}", best);
    if let Err(e) = platform.set_regdomain(iface, &best).await {
        warn!("Failed to set new reg domain: {}", e);
        return;
    }
    match fs::write(crda_config, format!("REGDOMAIN={}", best)) {
        Ok(()) => info!("SUCCESSFULLY SET NEW REGDOMAIN: {}", best),
        Err(e) => warn!("Failed to persist reg domain to {}: {}", crda_config.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_frequent() {
        assert_eq!(
            most_frequent_country(&["DE", "FR", "DE", "IT"]).as_deref(),
            Some("DE")
        );
        assert_eq!(most_frequent_country::<&str>(&[]), None);
        assert_eq!(most_frequent_country(&["", " "]), None);
    }

    #[test]
    fn test_tie_goes_to_first_seen() {
        assert_eq!(
            most_frequent_country(&["FR", "DE", "DE", "FR"]).as_deref(),
            Some("FR")
        );
        assert_eq!(
            most_frequent_country(&["US", "CA", "CA", "US", "GB"]).as_deref(),
            Some("US")
        );
    }

    #[test]
    fn test_unset_and_valid() {
        assert!(is_unset("00"));
        assert!(is_unset("0099"));
        assert!(is_unset(""));
        assert!(!is_unset("IT"));

        assert!(is_valid("IT"));
        assert!(!is_valid("0099"));
    }
}
