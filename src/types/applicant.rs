//! Raw applicant input as entered in the application form

use serde::{Deserialize, Serialize};
use std::fmt;

/// Every attribute an applicant form can collect.
///
/// Which of these a model actually consumes is decided by the schema shipped
/// with the model artifact, not by this list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicantField {
    Dependents,
    Education,
    SelfEmployed,
    IncomeAnnum,
    LoanAmount,
    LoanTerm,
    CreditScore,
    ResidentialAssets,
    CommercialAssets,
    LuxuryAssets,
    BankAssets,
    TotalAssets,
}

/// Validation class of an applicant field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Enumerated string, encoded through the artifact's encoding table
    Categorical,
    /// Non-negative integer with optional inclusive bounds
    Integer { min: u32, max: Option<u32> },
    /// Non-negative finite amount
    Amount,
}

impl ApplicantField {
    pub const ALL: [ApplicantField; 12] = [
        ApplicantField::Dependents,
        ApplicantField::Education,
        ApplicantField::SelfEmployed,
        ApplicantField::IncomeAnnum,
        ApplicantField::LoanAmount,
        ApplicantField::LoanTerm,
        ApplicantField::CreditScore,
        ApplicantField::ResidentialAssets,
        ApplicantField::CommercialAssets,
        ApplicantField::LuxuryAssets,
        ApplicantField::BankAssets,
        ApplicantField::TotalAssets,
    ];

    /// Canonical input field name.
    pub fn name(self) -> &'static str {
        match self {
            ApplicantField::Dependents => "dependents",
            ApplicantField::Education => "education",
            ApplicantField::SelfEmployed => "self_employed",
            ApplicantField::IncomeAnnum => "income_annum",
            ApplicantField::LoanAmount => "loan_amount",
            ApplicantField::LoanTerm => "loan_term",
            ApplicantField::CreditScore => "credit_score",
            ApplicantField::ResidentialAssets => "residential_assets",
            ApplicantField::CommercialAssets => "commercial_assets",
            ApplicantField::LuxuryAssets => "luxury_assets",
            ApplicantField::BankAssets => "bank_assets",
            ApplicantField::TotalAssets => "total_assets",
        }
    }

    /// Resolve a training column name to the field that feeds it.
    ///
    /// Accepts the canonical name and the column aliases used by the
    /// training datasets (`no_of_dependents`, `cibil_score`, ...).
    pub fn from_column(column: &str) -> Option<Self> {
        let field = match column.trim() {
            "dependents" | "no_of_dependents" => ApplicantField::Dependents,
            "education" => ApplicantField::Education,
            "self_employed" => ApplicantField::SelfEmployed,
            "income_annum" | "annual_income" | "income" => ApplicantField::IncomeAnnum,
            "loan_amount" => ApplicantField::LoanAmount,
            "loan_term" => ApplicantField::LoanTerm,
            "credit_score" | "cibil_score" => ApplicantField::CreditScore,
            "residential_assets_value" | "residential_assets" => ApplicantField::ResidentialAssets,
            "commercial_assets_value" | "commercial_assets" => ApplicantField::CommercialAssets,
            "luxury_assets_value" | "luxury_assets" => ApplicantField::LuxuryAssets,
            "bank_asset_value" | "bank_assets" => ApplicantField::BankAssets,
            "asset_value" | "total_assets" => ApplicantField::TotalAssets,
            _ => return None,
        };
        Some(field)
    }

    pub fn kind(self) -> FieldKind {
        match self {
            ApplicantField::Education | ApplicantField::SelfEmployed => FieldKind::Categorical,
            ApplicantField::Dependents => FieldKind::Integer { min: 0, max: None },
            // Months
            ApplicantField::LoanTerm => FieldKind::Integer {
                min: 1,
                max: Some(600),
            },
            // Wider than any bureau's training range: out-of-range scores are
            // still scored, only nonsensical values are refused.
            ApplicantField::CreditScore => FieldKind::Integer {
                min: 0,
                max: Some(900),
            },
            _ => FieldKind::Amount,
        }
    }

    pub fn is_categorical(self) -> bool {
        self.kind() == FieldKind::Categorical
    }
}

impl fmt::Display for ApplicantField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single raw value read from an [`ApplicantInput`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawValue<'a> {
    Number(f64),
    Category(&'a str),
    /// JSON type that no attribute accepts (boolean, array, object)
    Unsupported(&'static str),
}

/// One attribute value as submitted, before any type check.
///
/// Attributes are not typed at parse time so that a number sent for a
/// category, or text sent for a number, is refused by the encoder with the
/// offending field named.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn raw(&self) -> RawValue<'_> {
        match self {
            FieldValue::Number(n) => RawValue::Number(*n),
            FieldValue::Text(s) => RawValue::Category(s),
            FieldValue::Other(value) => RawValue::Unsupported(match value {
                serde_json::Value::Bool(_) => "boolean",
                serde_json::Value::Array(_) => "array",
                serde_json::Value::Object(_) => "object",
                serde_json::Value::Null => "null",
                serde_json::Value::Number(_) => "number",
                serde_json::Value::String(_) => "string",
            }),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// Applicant attributes as entered by the user.
///
/// All attributes are optional here; the model schema decides which are
/// required and the encoder checks their types and ranges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicantInput {
    /// Number of dependents
    #[serde(default, alias = "no_of_dependents")]
    pub dependents: Option<FieldValue>,

    /// Education level ("Graduate" / "Not Graduate")
    #[serde(default)]
    pub education: Option<FieldValue>,

    /// Self-employment status ("Yes" / "No")
    #[serde(default)]
    pub self_employed: Option<FieldValue>,

    /// Annual income
    #[serde(default, alias = "annual_income", alias = "income")]
    pub income_annum: Option<FieldValue>,

    /// Requested loan amount
    #[serde(default)]
    pub loan_amount: Option<FieldValue>,

    /// Loan term in months
    #[serde(default)]
    pub loan_term: Option<FieldValue>,

    /// Credit bureau score
    #[serde(default, alias = "cibil_score")]
    pub credit_score: Option<FieldValue>,

    #[serde(default, alias = "residential_assets_value")]
    pub residential_assets: Option<FieldValue>,

    #[serde(default, alias = "commercial_assets_value")]
    pub commercial_assets: Option<FieldValue>,

    #[serde(default, alias = "luxury_assets_value")]
    pub luxury_assets: Option<FieldValue>,

    #[serde(default, alias = "bank_asset_value")]
    pub bank_assets: Option<FieldValue>,

    /// Total asset value, for schemas that do not break assets down
    #[serde(default, alias = "asset_value")]
    pub total_assets: Option<FieldValue>,
}

impl ApplicantInput {
    /// Read the raw value backing a field, if the applicant provided it.
    pub fn value(&self, field: ApplicantField) -> Option<RawValue<'_>> {
        let value = match field {
            ApplicantField::Dependents => &self.dependents,
            ApplicantField::Education => &self.education,
            ApplicantField::SelfEmployed => &self.self_employed,
            ApplicantField::IncomeAnnum => &self.income_annum,
            ApplicantField::LoanAmount => &self.loan_amount,
            ApplicantField::LoanTerm => &self.loan_term,
            ApplicantField::CreditScore => &self.credit_score,
            ApplicantField::ResidentialAssets => &self.residential_assets,
            ApplicantField::CommercialAssets => &self.commercial_assets,
            ApplicantField::LuxuryAssets => &self.luxury_assets,
            ApplicantField::BankAssets => &self.bank_assets,
            ApplicantField::TotalAssets => &self.total_assets,
        };
        value.as_ref().map(FieldValue::raw)
    }
}
