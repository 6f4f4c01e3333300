//! Sample Applicant Generator
//!
//! Writes random loan applicants to stdout, one JSON object per line, for
//! piping into the `loan-approval` binary.
//!
//! Usage: sample-applicants [count] [risky_rate] [seed]

use loan_approval::types::FieldValue;
use loan_approval::ApplicantInput;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{BufWriter, Write};
use tracing::info;

/// Applicant generator for exercising the service
struct ApplicantGenerator {
    rng: StdRng,
}

impl ApplicantGenerator {
    fn new(seed: Option<u64>) -> Self {
        Self {
            rng: match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            },
        }
    }

    /// Generate an applicant with a strong profile
    fn generate_strong(&mut self) -> ApplicantInput {
        let income = self.rng.gen_range(600_000.0..10_000_000.0_f64).round();
        let loan_amount = (income * self.rng.gen_range(1.0..3.0_f64)).round();
        with_total_assets(ApplicantInput {
            dependents: Some((self.rng.gen_range(0..4) as f64).into()),
            education: Some(self.random_choice(&["Graduate", "Graduate", "Not Graduate"]).to_string().into()),
            self_employed: Some(self.random_choice(&["Yes", "No"]).to_string().into()),
            income_annum: Some(income.into()),
            loan_amount: Some(loan_amount.into()),
            loan_term: Some((self.rng.gen_range(2..=20) as f64 * 12.0).into()),
            credit_score: Some((self.rng.gen_range(650..=900) as f64).into()),
            residential_assets: Some((income * self.rng.gen_range(0.5..4.0_f64)).round().into()),
            commercial_assets: Some((income * self.rng.gen_range(0.0..2.0_f64)).round().into()),
            luxury_assets: Some((income * self.rng.gen_range(0.5..3.0_f64)).round().into()),
            bank_assets: Some((income * self.rng.gen_range(0.2..1.5_f64)).round().into()),
            ..Default::default()
        })
    }

    /// Generate an applicant with a weak credit history and thin assets
    fn generate_risky(&mut self) -> ApplicantInput {
        let income = self.rng.gen_range(200_000.0..3_000_000.0_f64).round();
        let loan_amount = (income * self.rng.gen_range(3.0..6.0_f64)).round();
        with_total_assets(ApplicantInput {
            dependents: Some((self.rng.gen_range(2..=5) as f64).into()),
            education: Some(self.random_choice(&["Graduate", "Not Graduate"]).to_string().into()),
            self_employed: Some(self.random_choice(&["Yes", "No"]).to_string().into()),
            income_annum: Some(income.into()),
            loan_amount: Some(loan_amount.into()),
            loan_term: Some((self.rng.gen_range(1..=6) as f64 * 12.0).into()),
            credit_score: Some((self.rng.gen_range(300..550) as f64).into()),
            residential_assets: Some((income * self.rng.gen_range(0.0..0.5_f64)).round().into()),
            commercial_assets: Some(0.0.into()),
            luxury_assets: Some((income * self.rng.gen_range(0.0..0.5_f64)).round().into()),
            bank_assets: Some((income * self.rng.gen_range(0.0..0.1_f64)).round().into()),
            ..Default::default()
        })
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

fn with_total_assets(mut applicant: ApplicantInput) -> ApplicantInput {
    let total: f64 = [
        &applicant.residential_assets,
        &applicant.commercial_assets,
        &applicant.luxury_assets,
        &applicant.bank_assets,
    ]
    .into_iter()
    .flatten()
    .filter_map(FieldValue::as_number)
    .sum();
    applicant.total_assets = Some(total.into());
    applicant
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sample_applicants=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let count: u64 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(10);
    let risky_rate: f64 = args
        .get(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.3_f64)
        .clamp(0.0, 1.0);
    let seed: Option<u64> = args.get(3).and_then(|s| s.parse().ok());

    info!(count = count, risky_rate = risky_rate, seed = ?seed, "Generating applicants");

    let mut generator = ApplicantGenerator::new(seed);
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let mut strong_count = 0;
    let mut risky_count = 0;

    for _ in 0..count {
        let applicant = if generator.rng.gen_bool(risky_rate) {
            risky_count += 1;
            generator.generate_risky()
        } else {
            strong_count += 1;
            generator.generate_strong()
        };

        serde_json::to_writer(&mut out, &applicant)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    info!(
        "Completed! Generated {} applicants ({} strong, {} risky)",
        count, strong_count, risky_count
    );

    Ok(())
}
