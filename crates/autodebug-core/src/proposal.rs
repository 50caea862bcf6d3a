//! Parsing of completion-service replies into repair proposals.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Token separating the explanation from the code in a reply.
pub const CODE_MARKER: &str = "CODE:";

/// Where a proposal's code came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalOrigin {
    /// Parsed from a completion-service reply.
    Service,
    /// Typed in by the operator from the recovery menu.
    Manual,
    /// Restored from the `.backup` file.
    Backup,
}

/// A candidate replacement for the target source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairProposal {
    /// Advisory rationale; never drives control flow.
    pub explanation: Option<String>,
    pub code: String,
    pub origin: ProposalOrigin,
}

impl RepairProposal {
    pub fn manual(code: impl Into<String>) -> Self {
        Self {
            explanation: None,
            code: code.into(),
            origin: ProposalOrigin::Manual,
        }
    }

    pub fn from_backup(code: impl Into<String>) -> Self {
        Self {
            explanation: None,
            code: code.into(),
            origin: ProposalOrigin::Backup,
        }
    }

    /// Whether there is any code worth reviewing.
    pub fn is_usable(&self) -> bool {
        !self.code.trim().is_empty()
    }
}

fn explanation_label() -> &'static Regex {
    static LABEL: OnceLock<Regex> = OnceLock::new();
    LABEL.get_or_init(|| Regex::new(r"(?i)^\s*explanation\s*:").expect("static regex"))
}

/// Split a raw reply into explanation and candidate code.
///
/// Never fails: a reply without [`CODE_MARKER`] is treated as all code, and
/// prose that ends up in `code` is surfaced by the next execution.
pub fn parse_proposal(raw: &str) -> RepairProposal {
    let Some((before, after)) = raw.split_once(CODE_MARKER) else {
        return RepairProposal {
            explanation: None,
            code: raw.to_string(),
            origin: ProposalOrigin::Service,
        };
    };

    let explanation = explanation_label().replace(before, "").trim().to_string();
    let code = after.trim_start_matches([' ', '\t']).trim_end().to_string();

    RepairProposal {
        explanation: (!explanation.is_empty()).then_some(explanation),
        code,
        origin: ProposalOrigin::Service,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_on_marker() {
        let proposal = parse_proposal("EXPLANATION: fix it\nCODE: print(1)");
        assert_eq!(proposal.explanation.as_deref(), Some("fix it"));
        assert_eq!(proposal.code, "print(1)");
        assert_eq!(proposal.origin, ProposalOrigin::Service);
    }

    #[test]
    fn test_parse_without_marker_is_all_code() {
        let raw = "def main():\n    pass\n";
        let proposal = parse_proposal(raw);
        assert!(proposal.explanation.is_none());
        assert_eq!(proposal.code, raw);
    }

    #[test]
    fn test_parse_keeps_indentation_after_marker_line() {
        let raw = "Explanation: missing colon\nCODE:\n```python\nclass A:\n    x = 1\n```\n";
        let proposal = parse_proposal(raw);
        assert_eq!(proposal.explanation.as_deref(), Some("missing colon"));
        assert_eq!(proposal.code, "\n```python\nclass A:\n    x = 1\n```");
    }

    #[test]
    fn test_parse_splits_on_first_marker_only() {
        let proposal = parse_proposal("CODE: s = 'CODE: inside'\nprint(s)");
        assert!(proposal.explanation.is_none());
        assert_eq!(proposal.code, "s = 'CODE: inside'\nprint(s)");
    }

    #[test]
    fn test_label_only_stripped_at_start() {
        let proposal = parse_proposal("The explanation: typo\nCODE: x");
        assert_eq!(proposal.explanation.as_deref(), Some("The explanation: typo"));
    }

    #[test]
    fn test_usable_requires_non_blank_code() {
        assert!(!parse_proposal("EXPLANATION: nothing\nCODE:   \n").is_usable());
        assert!(RepairProposal::manual("print(2)").is_usable());
        assert_eq!(
            RepairProposal::from_backup("x").origin,
            ProposalOrigin::Backup
        );
    }
}
