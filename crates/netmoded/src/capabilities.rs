//! Wireless hardware capabilities from the `iw list` report.

use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterCapabilities {
    pub supports_ap: bool,
    pub supports_station: bool,
    /// AP and station can run at the same time
    pub supports_concurrent: bool,
    pub chipset: String,
}

impl AdapterCapabilities {
    pub fn parse(report: &str, chipset: Option<String>) -> Self {
        let modes = section(report, "Supported interface modes:");
        Self {
            supports_ap: modes.map(|m| m.contains("AP")).unwrap_or(false),
            supports_station: modes
                .map(|m| m.contains("managed") || m.contains("station"))
                .unwrap_or(true),
            supports_concurrent: supports_concurrent(report),
            chipset: chipset.unwrap_or_else(|| "unknown".to_string()),
        }
    }

    pub fn known_issue(&self) -> Option<&'static ChipsetIssue> {
        chipset_issue(&self.chipset)
    }

    pub fn log(&self) {
        info!("USB WiFi Capabilities:");
        info!("  Chipset: {}", self.chipset);
        info!("  AP mode: {}", if self.supports_ap { "Yes" } else { "No" });
        info!("  Concurrent: {}", if self.supports_concurrent { "Yes" } else { "No" });
        if let Some(issue) = self.known_issue() {
            info!("  Known issue: {}", issue.issue);
            info!("  {}", issue.recommendation);
        }
        if !self.supports_ap {
            info!("USB adapter does not support hotspot mode");
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ChipsetIssue {
    pub chipset: &'static str,
    pub issue: &'static str,
    pub recommendation: &'static str,
}

const KNOWN_ISSUES: &[ChipsetIssue] = &[ChipsetIssue {
    chipset: "RTL8822BU",
    issue: "AP mode beacon transmission fails",
    recommendation: "Use station mode only",
}];

pub fn chipset_issue(chipset: &str) -> Option<&'static ChipsetIssue> {
    KNOWN_ISSUES.iter().find(|k| chipset.contains(k.chipset))
}

/// AP+station combination advertised in the interface combinations block
pub fn supports_concurrent(report: &str) -> bool {
    let Some(block) = section(report, "valid interface combinations") else {
        return false;
    };
    block.contains("AP")
        && (block.contains("station") || block.contains("STA") || block.contains("managed"))
}

/// Text following `header` up to the next blank line
fn section<'a>(report: &'a str, header: &str) -> Option<&'a str> {
    let start = report.find(header)? + header.len();
    let rest = &report[start..];
    let end = rest.find("\n\n").unwrap_or(rest.len());
    Some(&rest[..end])
}
