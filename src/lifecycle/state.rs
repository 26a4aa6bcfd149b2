use thiserror::Error;

use crate::models::QuoteStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Cannot move quote from {current} to {attempted}")]
    ImmutableState {
        current: QuoteStatus,
        attempted: QuoteStatus,
    },
}

/// True when `from -> to` is an edge of the status graph.
pub fn can_transition(from: QuoteStatus, to: QuoteStatus) -> bool {
    use QuoteStatus::*;

    if from.is_terminal() {
        return false;
    }
    match (from, to) {
        (_, Withdrawn) => true,
        (Received, Processing) => true,
        (Processing, Standardized | NeedsClarification) => true,
        (NeedsClarification, Updated) => true,
        (Updated, Processing) => true,
        (Standardized, Reviewed) => true,
        (Reviewed, Accepted | Rejected) => true,
        (Standardized | Reviewed, NeedsClarification) => true,
        _ => false,
    }
}

/// Validate a transition, returning the new status.
pub fn transition(current: QuoteStatus, attempted: QuoteStatus) -> Result<QuoteStatus, LifecycleError> {
    if can_transition(current, attempted) {
        Ok(attempted)
    } else {
        Err(LifecycleError::ImmutableState { current, attempted })
    }
}

/// Whether a new version may be started on top of a lineage head in `status`.
/// Accepted and rejected lineages are closed.
pub fn accepts_new_version(head: QuoteStatus) -> bool {
    !matches!(head, QuoteStatus::Accepted | QuoteStatus::Rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use QuoteStatus::*;

    const EDGES: &[(QuoteStatus, QuoteStatus)] = &[
        (Received, Processing),
        (Received, Withdrawn),
        (Processing, Standardized),
        (Processing, NeedsClarification),
        (Processing, Withdrawn),
        (NeedsClarification, Updated),
        (NeedsClarification, Withdrawn),
        (Updated, Processing),
        (Updated, Withdrawn),
        (Standardized, Reviewed),
        (Standardized, NeedsClarification),
        (Standardized, Withdrawn),
        (Reviewed, Accepted),
        (Reviewed, Rejected),
        (Reviewed, NeedsClarification),
        (Reviewed, Withdrawn),
    ];

    #[test]
    fn every_state_pair_matches_the_graph() {
        for from in QuoteStatus::all() {
            for to in QuoteStatus::all() {
                let expected = EDGES.contains(&(*from, *to));
                assert_eq!(can_transition(*from, *to), expected, "{from} -> {to}");
                match transition(*from, *to) {
                    Ok(status) => assert_eq!(status, *to),
                    Err(LifecycleError::ImmutableState { current, attempted }) => {
                        assert!(!expected);
                        assert_eq!((current, attempted), (*from, *to));
                    }
                }
            }
        }
    }

    #[test]
    fn terminal_states_are_final() {
        for from in [Accepted, Rejected, Withdrawn] {
            for to in QuoteStatus::all() {
                assert!(!can_transition(from, *to));
            }
        }
    }

    #[test]
    fn error_names_both_states() {
        let err = transition(Accepted, Processing).unwrap_err();
        assert_eq!(err.to_string(), "Cannot move quote from accepted to processing");
    }

    #[test]
    fn closed_lineages_refuse_new_versions() {
        assert!(!accepts_new_version(Accepted));
        assert!(!accepts_new_version(Rejected));
        assert!(accepts_new_version(Withdrawn));
        assert!(accepts_new_version(NeedsClarification));
    }
}
