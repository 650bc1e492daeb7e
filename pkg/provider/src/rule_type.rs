use pkg_constants::annotations::{
    RULE_TYPE_PATH, RULE_TYPE_PATH_PREFIX, RULE_TYPE_PATH_PREFIX_STRIP, RULE_TYPE_PATH_STRIP,
};
use std::fmt;

/// Path-matching strategy applied to a path route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RuleType {
    Path,
    PathStrip,
    #[default]
    PathPrefix,
    PathPrefixStrip,
}

impl RuleType {
    const ALL: [RuleType; 4] = [
        RuleType::Path,
        RuleType::PathStrip,
        RuleType::PathPrefix,
        RuleType::PathPrefixStrip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Path => RULE_TYPE_PATH,
            RuleType::PathStrip => RULE_TYPE_PATH_STRIP,
            RuleType::PathPrefix => RULE_TYPE_PATH_PREFIX,
            RuleType::PathPrefixStrip => RULE_TYPE_PATH_PREFIX_STRIP,
        }
    }

    /// Resolve an annotation value, ignoring case.
    ///
    /// Absent, empty or unrecognized values fall back to [`RuleType::PathPrefix`].
    pub fn from_annotation(value: Option<&str>) -> Self {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            return RuleType::default();
        };
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value))
            .unwrap_or_default()
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
