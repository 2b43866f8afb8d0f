//! Per-platform CLI conventions.
//!
//! Command syntax is deliberately limited to what a backup tool needs:
//! capturing the running configuration, disabling the pager, entering and
//! leaving configuration mode, and saving.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Firmware family of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Cisco IOS / IOS-XE
    #[serde(alias = "cisco_ios_telnet", alias = "cisco_xe")]
    CiscoIos,
    /// Cisco NX-OS
    CiscoNxos,
    /// Cisco ASA
    CiscoAsa,
    /// Huawei VRP
    Huawei,
    /// HP / H3C Comware
    HpComware,
    /// HP ProCurve / Aruba-OS switch
    HpProcurve,
    /// Juniper Junos
    #[serde(alias = "juniper_junos")]
    Juniper,
    /// Anything else: Cisco-like conventions
    #[default]
    #[serde(other)]
    Generic,
}

impl Platform {
    /// All known platforms.
    pub const ALL: [Platform; 8] = [
        Platform::CiscoIos,
        Platform::CiscoNxos,
        Platform::CiscoAsa,
        Platform::Huawei,
        Platform::HpComware,
        Platform::HpProcurve,
        Platform::Juniper,
        Platform::Generic,
    ];

    /// Registry tag for this platform.
    pub fn tag(&self) -> &'static str {
        match self {
            Platform::CiscoIos => "cisco_ios",
            Platform::CiscoNxos => "cisco_nxos",
            Platform::CiscoAsa => "cisco_asa",
            Platform::Huawei => "huawei",
            Platform::HpComware => "hp_comware",
            Platform::HpProcurve => "hp_procurve",
            Platform::Juniper => "juniper",
            Platform::Generic => "generic",
        }
    }

    /// Command that prints the running configuration.
    pub fn capture_command(&self) -> &'static str {
        match self {
            Platform::Huawei | Platform::HpComware => "display current-configuration",
            Platform::Juniper => "show configuration | display set",
            _ => "show running-config",
        }
    }

    /// Command that disables output paging for the session.
    pub fn pager_command(&self) -> Option<&'static str> {
        match self {
            Platform::CiscoIos | Platform::CiscoNxos | Platform::Generic => {
                Some("terminal length 0")
            }
            Platform::CiscoAsa => Some("terminal pager 0"),
            Platform::Huawei | Platform::HpComware => Some("screen-length 0 temporary"),
            Platform::HpProcurve => Some("no page"),
            Platform::Juniper => Some("set cli screen-length 0"),
        }
    }

    /// Command that persists the configuration.
    pub fn save_command(&self) -> &'static str {
        match self {
            Platform::Huawei | Platform::HpComware | Platform::HpProcurve => "save",
            Platform::Juniper => "commit",
            _ => "write memory",
        }
    }

    /// Whether the save command must be issued inside configuration mode.
    pub fn saves_in_config_mode(&self) -> bool {
        matches!(self, Platform::Juniper)
    }

    /// Command that enters configuration mode.
    pub fn config_enter(&self) -> &'static str {
        match self {
            Platform::Huawei | Platform::HpComware => "system-view",
            Platform::Juniper => "configure",
            _ => "configure terminal",
        }
    }

    /// Command that leaves configuration mode.
    pub fn config_exit(&self) -> &'static str {
        match self {
            Platform::Huawei | Platform::HpComware => "return",
            Platform::Juniper => "exit configuration-mode",
            _ => "end",
        }
    }

    /// Characters a CLI prompt ends with.
    pub fn prompt_terminators(&self) -> &'static [char] {
        match self {
            Platform::Huawei | Platform::HpComware => &['>', ']', '#'],
            Platform::Juniper => &['>', '#', '%'],
            _ => &['#', '>', '$'],
        }
    }

    /// Prefixes that mark a configuration line as a comment.
    pub fn comment_prefixes(&self) -> &'static [char] {
        match self {
            Platform::Huawei | Platform::HpComware | Platform::Juniper => &['#', '!'],
            _ => &['!'],
        }
    }

    /// Turn stored configuration text into lines that can be replayed in
    /// configuration mode.
    ///
    /// Blank lines, comments and the banners printed ahead of the
    /// configuration are dropped; the remaining lines are trimmed. A final
    /// `end` (or `return`) would leave configuration mode early, so it is
    /// dropped too.
    pub fn restorable_lines(&self, content: &str) -> Vec<String> {
        let comments = self.comment_prefixes();
        let mut lines: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| !line.starts_with(comments))
            .filter(|line| {
                !line.starts_with("Building configuration")
                    && !line.starts_with("Current configuration")
            })
            .map(str::to_string)
            .collect();
        if lines.last().is_some_and(|last| last == self.config_exit()) {
            lines.pop();
        }
        lines
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_lowercase();
        match tag.as_str() {
            "cisco_ios" | "cisco_ios_telnet" | "cisco_xe" => Ok(Platform::CiscoIos),
            "cisco_nxos" => Ok(Platform::CiscoNxos),
            "cisco_asa" => Ok(Platform::CiscoAsa),
            "huawei" => Ok(Platform::Huawei),
            "hp_comware" => Ok(Platform::HpComware),
            "hp_procurve" => Ok(Platform::HpProcurve),
            "juniper" | "juniper_junos" => Ok(Platform::Juniper),
            "generic" => Ok(Platform::Generic),
            other => Err(format!(
                "unknown platform '{other}' (expected one of: {})",
                Platform::ALL
                    .iter()
                    .map(Platform::tag)
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}
