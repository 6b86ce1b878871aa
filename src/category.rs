//! Call category enumeration and the per-context active-category mask.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of call categories the detector can reason about.
///
/// Order matters: it is the canonical order used for checkpoint columns and
/// for iterating a per-category feature vector (`ALL` below).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallType {
    International,
    Mobile,
    Premium,
    Service,
    Domestic,
    Emergency,
}

impl CallType {
    /// Canonical order, matching the checkpoint column layout.
    pub const ALL: [CallType; 6] = [
        CallType::International,
        CallType::Mobile,
        CallType::Premium,
        CallType::Service,
        CallType::Domestic,
        CallType::Emergency,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Parse a CDR `calltype` column value (uppercase category name).
    pub fn parse(s: &str) -> Option<CallType> {
        match s.to_ascii_uppercase().as_str() {
            "INTERNATIONAL" => Some(CallType::International),
            "MOBILE" => Some(CallType::Mobile),
            "PREMIUM" => Some(CallType::Premium),
            "SERVICE" => Some(CallType::Service),
            "DOMESTIC" => Some(CallType::Domestic),
            "EMERGENCY" => Some(CallType::Emergency),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallType::International => "INTERNATIONAL",
            CallType::Mobile => "MOBILE",
            CallType::Premium => "PREMIUM",
            CallType::Service => "SERVICE",
            CallType::Domestic => "DOMESTIC",
            CallType::Emergency => "EMERGENCY",
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which categories are part of the detection feature vector for this
/// institution. This is a runtime mask, deliberately kept off `CallType`
/// itself so the enum stays value-semantic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActiveSet {
    mask: u8,
}

impl ActiveSet {
    pub fn empty() -> Self {
        ActiveSet { mask: 0 }
    }

    pub fn all() -> Self {
        let mut set = ActiveSet::empty();
        for c in CallType::ALL {
            set.activate(c);
        }
        set
    }

    pub fn activate(&mut self, c: CallType) {
        self.mask |= 1 << c.index();
    }

    pub fn is_active(&self, c: CallType) -> bool {
        self.mask & (1 << c.index()) != 0
    }

    pub fn active_iter(&self) -> impl Iterator<Item = CallType> + '_ {
        CallType::ALL.into_iter().filter(move |c| self.is_active(*c))
    }

    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    /// Parse the `call-type` config value: a comma list of names, or "All".
    pub fn parse(spec: &str) -> Result<ActiveSet, String> {
        if spec.trim().eq_ignore_ascii_case("all") {
            return Ok(ActiveSet::all());
        }
        let mut set = ActiveSet::empty();
        for token in spec.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let ct = CallType::parse(token)
                .ok_or_else(|| format!("unknown call-type category '{token}'"))?;
            set.activate(ct);
        }
        if set.is_empty() {
            return Err("call-type must name at least one category".to_string());
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order_matches_checkpoint_columns() {
        assert_eq!(
            CallType::ALL.map(|c| c.as_str()),
            ["INTERNATIONAL", "MOBILE", "PREMIUM", "SERVICE", "DOMESTIC", "EMERGENCY"]
        );
    }

    #[test]
    fn parse_all_activates_every_category() {
        let set = ActiveSet::parse("All").unwrap();
        for c in CallType::ALL {
            assert!(set.is_active(c));
        }
    }

    #[test]
    fn parse_comma_list_is_case_insensitive() {
        let set = ActiveSet::parse("mobile, International").unwrap();
        assert!(set.is_active(CallType::Mobile));
        assert!(set.is_active(CallType::International));
        assert!(!set.is_active(CallType::Premium));
    }

    #[test]
    fn parse_empty_list_is_an_error() {
        assert!(ActiveSet::parse("").is_err());
        assert!(ActiveSet::parse(",  ,").is_err());
    }

    #[test]
    fn parse_unknown_category_is_an_error() {
        assert!(ActiveSet::parse("CARRIER_PIGEON").is_err());
    }
}
