use crate::commands::{run_with_database, CommandResult, StepFailure};
use demande_db::{EnrollmentSeedDataset, SeedResult};

pub fn run() -> CommandResult {
    let result = run_with_database("seed", |_, pool| async move {
        let seeded = EnrollmentSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = EnrollmentSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        if !verification.all_present {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            return Err(("seed_verification", verification_message(&failed_checks), 6u8));
        }
        Ok::<SeedResult, StepFailure>(seeded)
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded)),
        Err(failure) => failure,
    }
}

fn summary(seeded: &SeedResult) -> String {
    format!(
        "enrollment seed loaded: {} grades, {} students, {} granted grades",
        seeded.grades_seeded, seeded.students_seeded, seeded.grants_seeded
    )
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use demande_db::SeedResult;

    use super::{summary, verification_message};

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let checks = [("G1", true), ("stu-bruno", false), ("student-grade-grants", false)];
        let failed_checks = checks
            .iter()
            .filter_map(|(check, passed)| (!passed).then_some(*check))
            .collect::<Vec<_>>();

        assert_eq!(
            verification_message(&failed_checks),
            "Seed verification failed for checks: stu-bruno, student-grade-grants"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        assert_eq!(verification_message(&[]), "Some seed data failed to load");
    }

    #[test]
    fn summary_reports_seeded_counts() {
        let seeded = SeedResult { grades_seeded: 4, students_seeded: 3, grants_seeded: 1 };
        assert_eq!(
            summary(&seeded),
            "enrollment seed loaded: 4 grades, 3 students, 1 granted grades"
        );
    }
}
