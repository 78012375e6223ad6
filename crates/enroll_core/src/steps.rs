use serde::{Deserialize, Serialize};

/// Field identifiers shared between step definitions and the controller.
pub const FIELD_SELECTED_PLAN: &str = "selected_plan";
pub const FIELD_EMAIL: &str = "email";
pub const FIELD_PROMO_CODE: &str = "promo_code";
pub const FIELD_CARD_NUMBER: &str = "card_number";
pub const FIELD_EXPIRY_DATE: &str = "expiry_date";
pub const FIELD_CVV: &str = "cvv";
pub const FIELD_PASSWORD: &str = "password";
pub const FIELD_CONFIRM_PASSWORD: &str = "confirm_password";

/// The three fields waived by an applied promo code.
pub const PAYMENT_FIELDS: [&str; 3] = [FIELD_CARD_NUMBER, FIELD_EXPIRY_DATE, FIELD_CVV];

/// One visible section of the multi-part registration form.
///
/// Steps are defined statically and never mutated; ordering follows the
/// page layout: package selection, personal info, payment, password, done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    PackageSelect,
    PersonalInfo,
    Payment,
    Password,
    Submitted,
}

impl WizardStep {
    pub const ORDERED: [WizardStep; 5] = [
        WizardStep::PackageSelect,
        WizardStep::PersonalInfo,
        WizardStep::Payment,
        WizardStep::Password,
        WizardStep::Submitted,
    ];

    pub fn position(self) -> usize {
        match self {
            WizardStep::PackageSelect => 0,
            WizardStep::PersonalInfo => 1,
            WizardStep::Payment => 2,
            WizardStep::Password => 3,
            WizardStep::Submitted => 4,
        }
    }

    /// The step revealed when this one is completed.
    pub fn successor(self) -> Option<WizardStep> {
        Self::ORDERED.get(self.position() + 1).copied()
    }

    /// DOM-facing section identifier for this step.
    pub fn section_id(self) -> &'static str {
        match self {
            WizardStep::PackageSelect => "package-select",
            WizardStep::PersonalInfo => "personal-info",
            WizardStep::Payment => "payment-info",
            WizardStep::Password => "password-info",
            WizardStep::Submitted => "success-message",
        }
    }

    pub fn from_section_id(id: &str) -> Option<WizardStep> {
        Self::ORDERED
            .into_iter()
            .find(|step| step.section_id() == id)
    }

    /// Required field identifiers for this step, in on-page order.
    ///
    /// `address_line2` is deliberately absent: it is the one optional
    /// personal-info field.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            WizardStep::PackageSelect => &[FIELD_SELECTED_PLAN],
            WizardStep::PersonalInfo => &[
                "first_name",
                "last_name",
                "dob",
                FIELD_EMAIL,
                "phone",
                "address_line1",
                "city",
                "country",
                "postcode",
            ],
            WizardStep::Payment => &[FIELD_CARD_NUMBER, FIELD_EXPIRY_DATE, FIELD_CVV],
            WizardStep::Password => &[FIELD_PASSWORD, FIELD_CONFIRM_PASSWORD],
            WizardStep::Submitted => &[],
        }
    }
}

#[cfg(test)]
#[path = "tests/steps_tests.rs"]
mod tests;
