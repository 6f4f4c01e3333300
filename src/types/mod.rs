//! Type definitions for the loan approval decision core

pub mod applicant;
pub mod decision;

pub use applicant::{ApplicantField, ApplicantInput, FieldValue};
pub use decision::{Attribution, Decision, PredictionReport, ProbabilityPair, Verdict};
