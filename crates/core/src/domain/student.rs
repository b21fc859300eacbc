use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudentId(pub String);

impl std::fmt::Display for StudentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentProgress {
    Onboarding,
    AwaitingApproval,
    Enrolled,
}

impl StudentProgress {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Enrolled => "enrolled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "onboarding" => Some(Self::Onboarding),
            "awaiting_approval" => Some(Self::AwaitingApproval),
            "enrolled" => Some(Self::Enrolled),
            _ => None,
        }
    }

    /// Progress a student falls back to once a pending request is closed without a grant.
    pub fn settled(owns_grades: bool) -> Self {
        if owns_grades {
            Self::Enrolled
        } else {
            Self::Onboarding
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StudentProgress;

    #[test]
    fn progress_round_trips_through_storage_labels() {
        for progress in [
            StudentProgress::Onboarding,
            StudentProgress::AwaitingApproval,
            StudentProgress::Enrolled,
        ] {
            assert_eq!(StudentProgress::parse(progress.as_str()), Some(progress));
        }
        assert_eq!(StudentProgress::parse("graduated"), None);
    }

    #[test]
    fn settled_progress_depends_on_ownership() {
        assert_eq!(StudentProgress::settled(false), StudentProgress::Onboarding);
        assert_eq!(StudentProgress::settled(true), StudentProgress::Enrolled);
    }
}
