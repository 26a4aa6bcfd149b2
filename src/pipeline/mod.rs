pub mod intake;
pub mod extraction;
pub mod standardize; // Candidate selection, confidence scoring, reconciliation
