//! Command definitions organized by protocol domain.
//!
//! Commands follow the protocol's `Domain.methodName` format.
//!
//! # Command Domains
//!
//! | Domain | Commands |
//! |--------|----------|
//! | `Network` | enable, setCacheDisabled, emulateNetworkConditions, getResponseBody |
//! | `Page` | enable |
//! | `Runtime` | enable, runIfWaitingForDebugger |
//! | `Target` | setAutoAttach |
//!
//! Every command the engine issues uses fixed parameters; the constructors
//! below are the only way the rest of the crate builds them.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::identifiers::NetworkRequestId;

// ============================================================================
// Command Wrapper
// ============================================================================

/// All protocol commands organized by domain.
///
/// This enum wraps domain-specific command enums for unified serialization.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Command {
    /// Network domain commands.
    Network(NetworkCommand),
    /// Page domain commands.
    Page(PageCommand),
    /// Runtime domain commands.
    Runtime(RuntimeCommand),
    /// Target domain commands.
    Target(TargetCommand),
}

impl Command {
    /// Returns the protocol method name, for logging and error context.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::Network(NetworkCommand::Enable { .. }) => "Network.enable",
            Self::Network(NetworkCommand::SetCacheDisabled { .. }) => "Network.setCacheDisabled",
            Self::Network(NetworkCommand::EmulateNetworkConditions { .. }) => {
                "Network.emulateNetworkConditions"
            }
            Self::Network(NetworkCommand::GetResponseBody { .. }) => "Network.getResponseBody",
            Self::Page(PageCommand::Enable) => "Page.enable",
            Self::Runtime(RuntimeCommand::Enable) => "Runtime.enable",
            Self::Runtime(RuntimeCommand::RunIfWaitingForDebugger) => {
                "Runtime.runIfWaitingForDebugger"
            }
            Self::Target(TargetCommand::SetAutoAttach { .. }) => "Target.setAutoAttach",
        }
    }
}

// ============================================================================
// Network Commands
// ============================================================================

/// Network domain commands for traffic observation and emulation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum NetworkCommand {
    /// Enable network event reporting.
    #[serde(rename = "Network.enable")]
    Enable {
        /// Deliver extra-info header events inline with the stream.
        #[serde(rename = "includeExtraInfo")]
        include_extra_info: bool,
        /// Captured request body size limit (-1 = unlimited).
        #[serde(rename = "maxPostDataSize")]
        max_post_data_size: i64,
    },

    /// Toggle cache bypass for the target.
    #[serde(rename = "Network.setCacheDisabled")]
    SetCacheDisabled {
        /// Whether the browser cache is bypassed.
        #[serde(rename = "cacheDisabled")]
        cache_disabled: bool,
    },

    /// Emulate network conditions on the target.
    #[serde(rename = "Network.emulateNetworkConditions")]
    EmulateNetworkConditions {
        /// Condition tuple to apply.
        #[serde(flatten)]
        conditions: NetworkConditions,
    },

    /// Fetch the response body for a finished request.
    #[serde(rename = "Network.getResponseBody")]
    GetResponseBody {
        /// Request whose body to fetch.
        #[serde(rename = "requestId")]
        request_id: NetworkRequestId,
    },
}

impl NetworkCommand {
    /// Network observation with inline extra-info and unlimited captured
    /// body size. The engine always enables the domain this way.
    #[inline]
    #[must_use]
    pub fn enable() -> Self {
        Self::Enable {
            include_extra_info: true,
            max_post_data_size: -1,
        }
    }
}

// ============================================================================
// Page Commands
// ============================================================================

/// Page domain commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum PageCommand {
    /// Enable page event reporting.
    #[serde(rename = "Page.enable")]
    Enable,
}

// ============================================================================
// Runtime Commands
// ============================================================================

/// Runtime domain commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum RuntimeCommand {
    /// Enable script-runtime event reporting.
    #[serde(rename = "Runtime.enable")]
    Enable,

    /// Resume a target paused by `waitForDebuggerOnStart`.
    #[serde(rename = "Runtime.runIfWaitingForDebugger")]
    RunIfWaitingForDebugger,
}

// ============================================================================
// Target Commands
// ============================================================================

/// Target domain commands for child-session management.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum TargetCommand {
    /// Configure auto-attach to child targets.
    #[serde(rename = "Target.setAutoAttach")]
    SetAutoAttach {
        /// Automatically attach to related targets.
        #[serde(rename = "autoAttach")]
        auto_attach: bool,
        /// Pause new targets until explicitly resumed.
        #[serde(rename = "waitForDebuggerOnStart")]
        wait_for_debugger_on_start: bool,
        /// Route child sessions over the root connection.
        flatten: bool,
    },
}

impl TargetCommand {
    /// Auto-attach with pause-until-resumed and flattened session routing.
    #[inline]
    #[must_use]
    pub fn auto_attach() -> Self {
        Self::SetAutoAttach {
            auto_attach: true,
            wait_for_debugger_on_start: true,
            flatten: true,
        }
    }
}

// ============================================================================
// NetworkConditions
// ============================================================================

/// A network-condition tuple for `Network.emulateNetworkConditions`.
///
/// Throughputs are bytes per second; -1 disables the limit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NetworkConditions {
    /// Whether the target is taken offline.
    pub offline: bool,
    /// Added round-trip latency in milliseconds.
    pub latency: f64,
    /// Download throughput in bytes/s (-1 = unlimited).
    #[serde(rename = "downloadThroughput")]
    pub download_throughput: f64,
    /// Upload throughput in bytes/s (-1 = unlimited).
    #[serde(rename = "uploadThroughput")]
    pub upload_throughput: f64,
    /// Emulated connection type.
    #[serde(rename = "connectionType")]
    pub connection_type: &'static str,
}

// ============================================================================
// ThrottleProfile
// ============================================================================

/// Named, fixed network-condition profiles.
///
/// Process-wide, not per-tab: the manager reapplies the current profile to
/// every attached root when it changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrottleProfile {
    /// No throttling.
    #[default]
    None,
    /// 3G-like conditions.
    Moderate,
    /// Slower 3G-like conditions.
    Degraded,
}

impl ThrottleProfile {
    /// Returns the literal condition tuple for this profile.
    #[must_use]
    pub fn conditions(self) -> NetworkConditions {
        match self {
            Self::None => NetworkConditions {
                offline: false,
                latency: 0.0,
                download_throughput: -1.0,
                upload_throughput: -1.0,
                connection_type: "none",
            },
            Self::Moderate => NetworkConditions {
                offline: false,
                latency: 150.0,
                download_throughput: 1.6 * 1024.0 * 1024.0 / 8.0,
                upload_throughput: 750.0 * 1024.0 / 8.0,
                connection_type: "cellular3g",
            },
            Self::Degraded => NetworkConditions {
                offline: false,
                latency: 400.0,
                download_throughput: 780.0 * 1024.0 / 8.0,
                upload_throughput: 330.0 * 1024.0 / 8.0,
                connection_type: "cellular3g",
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_enable_fixed_params() {
        let cmd = NetworkCommand::enable();
        let json = serde_json::to_value(&cmd).expect("serialize");

        assert_eq!(json["method"], "Network.enable");
        assert_eq!(json["params"]["includeExtraInfo"], true);
        assert_eq!(json["params"]["maxPostDataSize"], -1);
    }

    #[test]
    fn test_page_enable_no_params() {
        let cmd = Command::Page(PageCommand::Enable);
        let json = serde_json::to_value(&cmd).expect("serialize");

        assert_eq!(json["method"], "Page.enable");
        assert!(json.get("params").is_none());
    }

    #[test]
    fn test_auto_attach_params() {
        let cmd = TargetCommand::auto_attach();
        let json = serde_json::to_value(&cmd).expect("serialize");

        assert_eq!(json["method"], "Target.setAutoAttach");
        assert_eq!(json["params"]["autoAttach"], true);
        assert_eq!(json["params"]["waitForDebuggerOnStart"], true);
        assert_eq!(json["params"]["flatten"], true);
    }

    #[test]
    fn test_get_response_body_request_id() {
        let cmd = NetworkCommand::GetResponseBody {
            request_id: NetworkRequestId::from("req-9"),
        };
        let json = serde_json::to_value(&cmd).expect("serialize");

        assert_eq!(json["params"]["requestId"], "req-9");
    }

    #[test]
    fn test_command_method_names() {
        assert_eq!(
            Command::Network(NetworkCommand::enable()).method(),
            "Network.enable"
        );
        assert_eq!(
            Command::Runtime(RuntimeCommand::RunIfWaitingForDebugger).method(),
            "Runtime.runIfWaitingForDebugger"
        );
    }

    #[test]
    fn test_throttle_profile_tuples() {
        let none = ThrottleProfile::None.conditions();
        assert_eq!(none.latency, 0.0);
        assert_eq!(none.download_throughput, -1.0);
        assert_eq!(none.connection_type, "none");

        let moderate = ThrottleProfile::Moderate.conditions();
        assert_eq!(moderate.latency, 150.0);
        assert_eq!(moderate.download_throughput, 209_715.2);
        assert_eq!(moderate.upload_throughput, 96_000.0);
        assert_eq!(moderate.connection_type, "cellular3g");

        let degraded = ThrottleProfile::Degraded.conditions();
        assert_eq!(degraded.latency, 400.0);
        assert_eq!(degraded.download_throughput, 99_840.0);
        assert_eq!(degraded.upload_throughput, 42_240.0);
    }

    #[test]
    fn test_throttle_profile_serde_names() {
        assert_eq!(
            serde_json::to_string(&ThrottleProfile::Degraded).unwrap(),
            "\"degraded\""
        );
        let parsed: ThrottleProfile = serde_json::from_str("\"moderate\"").unwrap();
        assert_eq!(parsed, ThrottleProfile::Moderate);
    }
}
