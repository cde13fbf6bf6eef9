//! # Onboarding
//!
//! Step contracts for the sign-up wizard: which fields each step needs,
//! which steps must be done first, and how much each step counts toward
//! the progress bar. Everything here is a static table plus pure functions.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Welcome,
    PersonalInfo,
    PhoneVerification,
    PaymentSetup,
    Permissions,
    Preferences,
    Complete,
}

impl StepId {
    /// Wizard order.
    pub const ALL: [StepId; 7] = [
        StepId::Welcome,
        StepId::PersonalInfo,
        StepId::PhoneVerification,
        StepId::PaymentSetup,
        StepId::Permissions,
        StepId::Preferences,
        StepId::Complete,
    ];

    /// Steps that must be completed before this one can be entered.
    pub fn dependencies(self) -> &'static [StepId] {
        match self {
            StepId::Welcome => &[],
            StepId::PersonalInfo => &[StepId::Welcome],
            StepId::PhoneVerification => &[StepId::PersonalInfo],
            StepId::PaymentSetup => &[StepId::PersonalInfo],
            StepId::Permissions => &[StepId::Welcome],
            StepId::Preferences => &[StepId::PersonalInfo],
            StepId::Complete => &[
                StepId::PhoneVerification,
                StepId::PaymentSetup,
                StepId::Permissions,
            ],
        }
    }

    /// Contribution to the progress bar. The table sums to 100.
    pub fn weight(self) -> u32 {
        match self {
            StepId::Welcome => 5,
            StepId::PersonalInfo => 25,
            StepId::PhoneVerification => 20,
            StepId::PaymentSetup => 20,
            StepId::Permissions => 10,
            StepId::Preferences => 10,
            StepId::Complete => 10,
        }
    }

    fn rules(self) -> &'static [FieldRules] {
        match self {
            StepId::Welcome | StepId::Complete => &[],
            StepId::PersonalInfo => &[
                FieldRules {
                    field: "first_name",
                    rules: &[Rule::Required, Rule::MinLength(2)],
                },
                FieldRules {
                    field: "last_name",
                    rules: &[Rule::Required, Rule::MinLength(2)],
                },
                FieldRules {
                    field: "email",
                    rules: &[Rule::Required, Rule::Pattern(Pattern::Email)],
                },
            ],
            StepId::PhoneVerification => &[
                FieldRules {
                    field: "phone",
                    rules: &[Rule::Required, Rule::Pattern(Pattern::Phone)],
                },
                FieldRules {
                    field: "code",
                    rules: &[Rule::Required, Rule::Pattern(Pattern::OneTimeCode)],
                },
            ],
            StepId::PaymentSetup => &[FieldRules {
                field: "payment_type",
                rules: &[Rule::Required, Rule::Pattern(Pattern::PaymentType)],
            }],
            StepId::Permissions => &[FieldRules {
                field: "location",
                rules: &[Rule::Required, Rule::Pattern(Pattern::Permission)],
            }],
            StepId::Preferences => &[FieldRules {
                field: "language",
                rules: &[Rule::Pattern(Pattern::Language)],
            }],
        }
    }
}

// ============================================================================
// Rules
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Email,
    Phone,
    OneTimeCode,
    PaymentType,
    Permission,
    Language,
}

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9]{10,15}$").expect("valid phone regex"));
static CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{6}$").expect("valid code regex"));
static PAYMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(card|wallet|cash)$").expect("valid payment regex"));
static PERMISSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(granted|denied)$").expect("valid permission regex"));
static LANGUAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(-[A-Z]{2})?$").expect("valid language regex"));

impl Pattern {
    fn regex(self) -> &'static Regex {
        match self {
            Pattern::Email => &EMAIL_RE,
            Pattern::Phone => &PHONE_RE,
            Pattern::OneTimeCode => &CODE_RE,
            Pattern::PaymentType => &PAYMENT_RE,
            Pattern::Permission => &PERMISSION_RE,
            Pattern::Language => &LANGUAGE_RE,
        }
    }

    fn message(self) -> &'static str {
        match self {
            Pattern::Email => "Enter a valid email address",
            Pattern::Phone => "Enter a valid phone number",
            Pattern::OneTimeCode => "Enter the 6-digit code",
            Pattern::PaymentType => "Choose card, wallet or cash",
            Pattern::Permission => "Choose whether to allow access",
            Pattern::Language => "Choose a supported language",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Required,
    MinLength(usize),
    /// Only checked when the field is non-empty.
    Pattern(Pattern),
}

#[derive(Debug)]
struct FieldRules {
    field: &'static str,
    rules: &'static [Rule],
}

impl FieldRules {
    /// First failing rule's message.
    fn check(&self, value: &str) -> Option<String> {
        let value = value.trim();
        for rule in self.rules {
            match rule {
                Rule::Required if value.is_empty() => {
                    return Some(format!("{} is required", humanize(self.field)));
                }
                Rule::MinLength(n) if !value.is_empty() && value.chars().count() < *n => {
                    return Some(format!(
                        "{} must be at least {} characters",
                        humanize(self.field),
                        n
                    ));
                }
                Rule::Pattern(p) if !value.is_empty() && !p.regex().is_match(value) => {
                    return Some(p.message().to_string());
                }
                _ => {}
            }
        }
        None
    }
}

fn humanize(field: &str) -> String {
    let mut out = field.replace('_', " ");
    if let Some(first) = out.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    out
}

// ============================================================================
// Validation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationResult {
    pub valid: bool,
    /// Field name → first error for that field.
    pub errors: BTreeMap<String, String>,
}

pub fn validate_step(step: StepId, form: &HashMap<String, String>) -> ValidationResult {
    let errors: BTreeMap<String, String> = step
        .rules()
        .iter()
        .filter_map(|fr| {
            let value = form.get(fr.field).map(String::as_str).unwrap_or("");
            fr.check(value).map(|msg| (fr.field.to_string(), msg))
        })
        .collect();
    ValidationResult {
        valid: errors.is_empty(),
        errors,
    }
}

// ============================================================================
// Progress
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingProgress {
    pub current_step: StepId,
    pub completed_steps: BTreeSet<StepId>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub step_completed_at: BTreeMap<StepId, DateTime<Utc>>,
}

impl OnboardingProgress {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            current_step: StepId::Welcome,
            completed_steps: BTreeSet::new(),
            started_at: now,
            updated_at: now,
            step_completed_at: BTreeMap::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.completed_steps.contains(&StepId::Complete)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    /// These dependencies are not yet completed.
    Locked(Vec<StepId>),
    Invalid(ValidationResult),
}

/// Dependencies of `step` not yet in `completed_steps`.
pub fn missing_dependencies(step: StepId, progress: &OnboardingProgress) -> Vec<StepId> {
    step.dependencies()
        .iter()
        .copied()
        .filter(|dep| !progress.completed_steps.contains(dep))
        .collect()
}

pub fn can_enter(step: StepId, progress: &OnboardingProgress) -> bool {
    missing_dependencies(step, progress).is_empty()
}

/// Moves to `step` if its dependencies are done.
pub fn enter_step(
    progress: &mut OnboardingProgress,
    step: StepId,
    now: DateTime<Utc>,
) -> Result<(), StepError> {
    let missing = missing_dependencies(step, progress);
    if !missing.is_empty() {
        return Err(StepError::Locked(missing));
    }
    progress.current_step = step;
    progress.updated_at = now;
    Ok(())
}

/// Validates `form` for `step` and marks it complete, then advances
/// `current_step` to the next open step.
pub fn complete_step(
    progress: &mut OnboardingProgress,
    step: StepId,
    form: &HashMap<String, String>,
    now: DateTime<Utc>,
) -> Result<(), StepError> {
    let missing = missing_dependencies(step, progress);
    if !missing.is_empty() {
        debug!("Step {:?} locked by {:?}", step, missing);
        return Err(StepError::Locked(missing));
    }
    let result = validate_step(step, form);
    if !result.valid {
        return Err(StepError::Invalid(result));
    }
    progress.completed_steps.insert(step);
    progress.step_completed_at.insert(step, now);
    progress.updated_at = now;
    if let Some(next) = next_step(progress) {
        progress.current_step = next;
    }
    Ok(())
}

/// First incomplete step, in wizard order, whose dependencies are done.
pub fn next_step(progress: &OnboardingProgress) -> Option<StepId> {
    StepId::ALL
        .into_iter()
        .find(|s| !progress.completed_steps.contains(s) && can_enter(*s, progress))
}

/// Weighted percentage of completed steps, 0..=100.
pub fn progress_percentage(progress: &OnboardingProgress) -> u32 {
    let total: u32 = StepId::ALL.iter().map(|s| s.weight()).sum();
    let done: u32 = progress.completed_steps.iter().map(|s| s.weight()).sum();
    if total == 0 { 0 } else { done * 100 / total }
}
