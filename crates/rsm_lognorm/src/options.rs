//! Context feature toggles.

use serde::{Deserialize, Serialize};

use rsm_lognorm_sys::OptionsStruct;

/// Feature toggles applied to a context before any rule is loaded.
///
/// All toggles are off by default. The set is fixed by the native record
/// layout; see `OptionsStruct`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LognormOptions {
    /// Allow regular expressions in rule patterns.
    pub allow_regex: bool,
    /// Add the rule execution path to each result.
    pub add_exec_path: bool,
    /// Add the original message as `originalmsg`.
    pub add_original_msg: bool,
    /// Add the matched rule under `metadata.rule`.
    pub add_rule: bool,
    /// Add the matched rule's source location under `metadata.rule`.
    pub add_rule_location: bool,
}

impl LognormOptions {
    /// Options with every toggle disabled.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allow_regex(mut self, enabled: bool) -> Self {
        self.allow_regex = enabled;
        self
    }

    pub fn with_exec_path(mut self, enabled: bool) -> Self {
        self.add_exec_path = enabled;
        self
    }

    pub fn with_original_msg(mut self, enabled: bool) -> Self {
        self.add_original_msg = enabled;
        self
    }

    pub fn with_rule(mut self, enabled: bool) -> Self {
        self.add_rule = enabled;
        self
    }

    pub fn with_rule_location(mut self, enabled: bool) -> Self {
        self.add_rule_location = enabled;
        self
    }

    /// The native record for `setCtxOpts()`.
    pub fn to_native(self) -> OptionsStruct {
        OptionsStruct {
            allow_regex: self.allow_regex.into(),
            add_exec_path: self.add_exec_path.into(),
            add_original_msg: self.add_original_msg.into(),
            add_rule: self.add_rule.into(),
            add_rule_location: self.add_rule_location.into(),
        }
    }
}

impl From<LognormOptions> for OptionsStruct {
    fn from(options: LognormOptions) -> Self {
        options.to_native()
    }
}
