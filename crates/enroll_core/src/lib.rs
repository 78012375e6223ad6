use std::{collections::BTreeMap, sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use shared::{
    domain::{EmailAvailability, PlanPackage},
    error::ApiError,
    protocol::{CheckEmailRequest, CheckEmailResponse, NotificationParams, RegisterResponse},
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

pub mod config;
pub mod steps;
pub mod validate;

pub use config::{load_settings, WizardSettings};
pub use steps::{WizardStep, PAYMENT_FIELDS};

/// Every section transition waits this long before the next section becomes
/// the visible one. Fixed; deliberately not a setting.
const STEP_TRANSITION_DELAY: Duration = Duration::from_millis(200);

const REQUIRED_FIELD_MESSAGE: &str = "This field is required.";
const PROMO_APPLIED_MESSAGE: &str = "Promo applied! No payment required.";
const PROMO_INVALID_MESSAGE: &str = "Invalid promo code.";
const EMAIL_TAKEN_MESSAGE: &str = "This email is already registered. Try logging in instead.";
const EMAIL_UNVERIFIED_MESSAGE: &str = "Email availability could not be verified. Try again.";
const GENERIC_TRANSPORT_MESSAGE: &str = "Something went wrong. Please try again.";

#[derive(Debug, Error)]
pub enum StepError {
    #[error("unknown form section '{0}'")]
    UnknownSection(String),
    #[error("section '{current}' is not the visible section ('{visible}')")]
    NotVisible {
        current: &'static str,
        visible: &'static str,
    },
    #[error("section '{next}' does not follow '{current}'")]
    NotSuccessor {
        current: &'static str,
        next: &'static str,
    },
    #[error("required fields missing in section '{0}'")]
    ValidationFailed(&'static str),
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("cannot submit from section '{0}'")]
    WrongSection(&'static str),
    #[error("form is not valid for submission")]
    Invalid,
    #[error("registration request failed: {0}")]
    Transport(String),
    #[error("registration rejected: {0}")]
    Rejected(String),
}

/// Annotation attached to a single offending input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum WizardEvent {
    PackageSelected {
        plan: String,
    },
    StepShown(WizardStep),
    FieldErrors {
        step: WizardStep,
        errors: Vec<FieldError>,
        /// First offending field in on-page order; input focus moves here.
        focus: Option<String>,
    },
    PromoMessage {
        applied: bool,
        message: String,
    },
    EmailChecked(EmailAvailability),
    RegistrationAccepted {
        message: Option<String>,
    },
    RegistrationFailed(ApiError),
    /// Welcome-email failure after a successful registration; non-fatal.
    NotificationWarning(String),
}

/// Narrow port for the third-party email-notification collaborator.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn send(&self, template_id: &str, params: &NotificationParams) -> Result<()>;
}

pub struct MissingNotifier;

#[async_trait]
impl NotificationPort for MissingNotifier {
    async fn send(&self, template_id: &str, _params: &NotificationParams) -> Result<()> {
        Err(anyhow!(
            "notification service unavailable for template {template_id}"
        ))
    }
}

#[derive(Debug, Serialize)]
struct NotificationSendRequest<'a> {
    template_id: &'a str,
    template_params: &'a NotificationParams,
}

/// Posts notification requests to an HTTP email service endpoint.
pub struct HttpEmailNotifier {
    http: Client,
    endpoint: String,
}

impl HttpEmailNotifier {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: Client::builder().build()?,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl NotificationPort for HttpEmailNotifier {
    async fn send(&self, template_id: &str, params: &NotificationParams) -> Result<()> {
        self.http
            .post(&self.endpoint)
            .json(&NotificationSendRequest {
                template_id,
                template_params: params,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

struct WizardInner {
    visible: WizardStep,
    values: BTreeMap<String, String>,
    field_errors: Vec<FieldError>,
    selected_package: Option<PlanPackage>,
    email_availability: Option<EmailAvailability>,
    checked_email: Option<String>,
    submitting: bool,
    submitted: bool,
}

impl WizardInner {
    fn fresh() -> Self {
        Self {
            visible: WizardStep::PackageSelect,
            values: BTreeMap::new(),
            field_errors: Vec::new(),
            selected_package: None,
            email_availability: None,
            checked_email: None,
            submitting: false,
            submitted: false,
        }
    }
}

/// Drives the user through the ordered registration sections, validating and
/// transitioning between them, and finally submitting the aggregated form.
pub struct RegistrationWizard {
    http: Client,
    backend_base: String,
    settings: WizardSettings,
    notifier: Arc<dyn NotificationPort>,
    inner: Mutex<WizardInner>,
    events: broadcast::Sender<WizardEvent>,
}

impl RegistrationWizard {
    pub fn new(settings: WizardSettings) -> Result<Arc<Self>> {
        Self::new_with_notifier(settings, Arc::new(MissingNotifier))
    }

    pub fn new_with_notifier(
        settings: WizardSettings,
        notifier: Arc<dyn NotificationPort>,
    ) -> Result<Arc<Self>> {
        let backend_base = settings.backend_base()?;
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;
        let (events, _) = broadcast::channel(64);
        Ok(Arc::new(Self {
            http,
            backend_base,
            settings,
            notifier,
            inner: Mutex::new(WizardInner::fresh()),
            events,
        }))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WizardEvent> {
        self.events.subscribe()
    }

    pub async fn visible_step(&self) -> WizardStep {
        self.inner.lock().await.visible
    }

    pub async fn field_value(&self, field: &str) -> Option<String> {
        self.inner.lock().await.values.get(field).cloned()
    }

    pub async fn field_errors(&self) -> Vec<FieldError> {
        self.inner.lock().await.field_errors.clone()
    }

    pub async fn selected_package(&self) -> Option<PlanPackage> {
        self.inner.lock().await.selected_package.clone()
    }

    pub async fn promo_applied(&self) -> bool {
        let inner = self.inner.lock().await;
        self.promo_is_applied(&inner)
    }

    /// Payment inputs reject edits exactly while the promo is applied.
    pub async fn payment_fields_disabled(&self) -> bool {
        self.promo_applied().await
    }

    /// Marks `package` as the one selected plan and reveals the
    /// personal-info section. Selection is exclusive: any previously
    /// selected package is dropped.
    pub async fn select_package(&self, package: PlanPackage) {
        let mut inner = self.inner.lock().await;
        if inner.submitted {
            return;
        }
        let plan = package.label();
        inner
            .values
            .insert(steps::FIELD_SELECTED_PLAN.to_string(), plan.clone());
        inner.selected_package = Some(package);
        inner.visible = WizardStep::PersonalInfo;
        info!(plan = %plan, "wizard: package selected");
        let _ = self.events.send(WizardEvent::PackageSelected { plan });
        let _ = self
            .events
            .send(WizardEvent::StepShown(WizardStep::PersonalInfo));
    }

    /// Records a field edit. Edits to the payment fields are ignored while
    /// the promo is applied (the inputs are disabled); edits to the email
    /// field invalidate any cached availability probe.
    pub async fn set_field(&self, field: &str, value: &str) {
        if field == steps::FIELD_PROMO_CODE {
            self.apply_promo_code(value).await;
            return;
        }
        let mut inner = self.inner.lock().await;
        if inner.submitted {
            return;
        }
        if self.promo_is_applied(&inner) && PAYMENT_FIELDS.iter().any(|f| *f == field) {
            info!(field, "wizard: ignoring edit to disabled payment field");
            return;
        }
        if field == steps::FIELD_EMAIL && inner.checked_email.as_deref() != Some(value) {
            inner.email_availability = None;
            inner.checked_email = None;
        }
        inner.values.insert(field.to_string(), value.to_string());
    }

    /// Exact, case-sensitive match against the configured code. On match the
    /// three payment fields are cleared and stop accepting input; on
    /// mismatch they return to normal required fields. Re-applying the same
    /// value is a no-op beyond re-emitting the feedback message.
    pub async fn apply_promo_code(&self, code: &str) {
        let mut inner = self.inner.lock().await;
        if inner.submitted {
            return;
        }
        inner
            .values
            .insert(steps::FIELD_PROMO_CODE.to_string(), code.to_string());
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return;
        }
        if self.promo_is_applied(&inner) {
            for field in PAYMENT_FIELDS {
                inner.values.remove(field);
            }
            info!("wizard: promo code applied; payment fields waived");
            let _ = self.events.send(WizardEvent::PromoMessage {
                applied: true,
                message: PROMO_APPLIED_MESSAGE.to_string(),
            });
        } else {
            let _ = self.events.send(WizardEvent::PromoMessage {
                applied: false,
                message: PROMO_INVALID_MESSAGE.to_string(),
            });
        }
    }

    /// Probes the backend for an existing account under `email` and caches
    /// the outcome. A probe that cannot reach the backend caches `Unknown`,
    /// which blocks the personal-info step just like `Taken`.
    pub async fn check_email_availability(&self, email: &str) -> EmailAvailability {
        let outcome = match self
            .http
            .post(format!("{}/register/check_email", self.backend_base))
            .json(&CheckEmailRequest {
                email: email.to_string(),
            })
            .send()
            .await
        {
            Ok(response) => match response.error_for_status() {
                Ok(response) => match response.json::<CheckEmailResponse>().await {
                    Ok(body) if body.exists => EmailAvailability::Taken,
                    Ok(_) => EmailAvailability::Available,
                    Err(err) => {
                        warn!(error = %err, "wizard: malformed check_email response");
                        EmailAvailability::Unknown
                    }
                },
                Err(err) => {
                    warn!(error = %err, "wizard: check_email returned error status");
                    EmailAvailability::Unknown
                }
            },
            Err(err) => {
                warn!(error = %err, "wizard: check_email request failed");
                EmailAvailability::Unknown
            }
        };

        {
            let mut inner = self.inner.lock().await;
            inner.email_availability = Some(outcome);
            inner.checked_email = Some(email.to_string());
        }
        let _ = self.events.send(WizardEvent::EmailChecked(outcome));
        outcome
    }

    /// Re-evaluates the step's required fields against current values.
    /// Stale annotations are cleared first, so repeated calls with
    /// unchanged input produce the same annotations and the same verdict.
    pub async fn validate_step(&self, step: WizardStep) -> bool {
        let mut inner = self.inner.lock().await;
        let errors = self.collect_step_errors(&inner, step);
        inner.field_errors = errors.clone();
        if errors.is_empty() {
            return true;
        }
        let focus = errors.first().map(|e| e.field.clone());
        let _ = self.events.send(WizardEvent::FieldErrors {
            step,
            errors,
            focus,
        });
        false
    }

    /// Hides the section identified by `current_id` and shows `next_id`
    /// after the fixed transition delay. Fails fast, with no visual change,
    /// when either id does not name a section, when `current_id` is not the
    /// visible section, or when `next_id` is not its declared successor.
    pub async fn advance_step(
        &self,
        current_id: &str,
        next_id: &str,
    ) -> Result<WizardStep, StepError> {
        let current = WizardStep::from_section_id(current_id)
            .ok_or_else(|| StepError::UnknownSection(current_id.to_string()))?;
        let next = WizardStep::from_section_id(next_id)
            .ok_or_else(|| StepError::UnknownSection(next_id.to_string()))?;

        {
            let inner = self.inner.lock().await;
            if inner.visible != current {
                return Err(StepError::NotVisible {
                    current: current.section_id(),
                    visible: inner.visible.section_id(),
                });
            }
        }
        if current.successor() != Some(next) {
            return Err(StepError::NotSuccessor {
                current: current.section_id(),
                next: next.section_id(),
            });
        }

        if !self.validate_step(current).await {
            return Err(StepError::ValidationFailed(current.section_id()));
        }

        tokio::time::sleep(STEP_TRANSITION_DELAY).await;

        {
            let mut inner = self.inner.lock().await;
            inner.visible = next;
        }
        info!(from = current.section_id(), to = next.section_id(), "wizard: section transition");
        let _ = self.events.send(WizardEvent::StepShown(next));
        Ok(next)
    }

    /// Acceptability of an `MM/YY` card expiry under the configured cutoff.
    pub fn validate_expiry(&self, raw: &str) -> bool {
        validate::validate_expiry(raw, self.settings.expiry_cutoff())
    }

    /// Serializes the collected form fields and posts them to the
    /// registration endpoint. One-shot: a call while a previous one is
    /// still in flight does nothing. The guard is released only when the
    /// backend reports failure, allowing a manual retry.
    pub async fn submit_registration(&self) -> Result<(), SubmitError> {
        let form = {
            let mut inner = self.inner.lock().await;
            if inner.submitted {
                return Ok(());
            }
            if inner.visible != WizardStep::Password {
                return Err(SubmitError::WrongSection(inner.visible.section_id()));
            }
            if inner.submitting {
                info!("wizard: submit ignored; a registration request is in flight");
                return Ok(());
            }
            let errors = self.collect_step_errors(&inner, WizardStep::Password);
            if !errors.is_empty() {
                let focus = errors.first().map(|e| e.field.clone());
                inner.field_errors = errors.clone();
                let _ = self.events.send(WizardEvent::FieldErrors {
                    step: WizardStep::Password,
                    errors,
                    focus,
                });
                return Err(SubmitError::Invalid);
            }
            inner.submitting = true;
            inner
                .values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Vec<_>>()
        };

        match self.post_registration(&form).await {
            Ok(response) if response.success => {
                let params = {
                    let mut inner = self.inner.lock().await;
                    inner.submitting = false;
                    inner.submitted = true;
                    inner.visible = WizardStep::Submitted;
                    notification_params(&inner.values)
                };
                info!("wizard: registration accepted");
                let _ = self.events.send(WizardEvent::RegistrationAccepted {
                    message: response.message,
                });
                let _ = self.events.send(WizardEvent::StepShown(WizardStep::Submitted));
                if let Err(err) = self
                    .notifier
                    .send(&self.settings.notification_template, &params)
                    .await
                {
                    warn!(error = %err, "wizard: welcome notification failed");
                    let _ = self.events.send(WizardEvent::NotificationWarning(format!(
                        "welcome email could not be sent: {err}"
                    )));
                }
                Ok(())
            }
            Ok(response) => {
                self.release_submission_guard().await;
                let message = response
                    .message
                    .unwrap_or_else(|| "Registration failed. Please try again.".to_string());
                warn!(message = %message, "wizard: registration rejected by backend");
                let _ = self
                    .events
                    .send(WizardEvent::RegistrationFailed(ApiError::rejected(&message)));
                Err(SubmitError::Rejected(message))
            }
            Err(err) => {
                self.release_submission_guard().await;
                warn!(error = %err, "wizard: registration request failed");
                let api_error = match &err {
                    SubmitError::Rejected(message) => ApiError::rejected(message),
                    _ => ApiError::transport(GENERIC_TRANSPORT_MESSAGE),
                };
                let _ = self.events.send(WizardEvent::RegistrationFailed(api_error));
                Err(err)
            }
        }
    }

    /// Returns the wizard to its pristine state, unless registration
    /// already succeeded; the success outcome survives a reload.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        if inner.submitted {
            return;
        }
        *inner = WizardInner::fresh();
        let _ = self
            .events
            .send(WizardEvent::StepShown(WizardStep::PackageSelect));
    }

    fn promo_is_applied(&self, inner: &WizardInner) -> bool {
        !self.settings.promo_code.is_empty()
            && inner
                .values
                .get(steps::FIELD_PROMO_CODE)
                .is_some_and(|v| v.trim() == self.settings.promo_code)
    }

    fn collect_step_errors(&self, inner: &WizardInner, step: WizardStep) -> Vec<FieldError> {
        let promo = self.promo_is_applied(inner);
        let mut errors = Vec::new();
        for field in step.required_fields() {
            if step == WizardStep::Payment && promo && PAYMENT_FIELDS.contains(field) {
                continue;
            }
            let value = inner.values.get(*field).map(String::as_str).unwrap_or("");
            if validate::is_blank(value) {
                errors.push(FieldError::new(field, REQUIRED_FIELD_MESSAGE));
                continue;
            }
            if let Some(message) = self.format_error(inner, step, field, value) {
                errors.push(FieldError::new(field, message));
            }
        }
        errors
    }

    /// Format rules applied to non-blank required values.
    fn format_error(
        &self,
        inner: &WizardInner,
        step: WizardStep,
        field: &str,
        value: &str,
    ) -> Option<String> {
        match (step, field) {
            (WizardStep::PersonalInfo, "dob") => validate::dob_error(value).map(str::to_string),
            (WizardStep::PersonalInfo, steps::FIELD_EMAIL) => match inner.email_availability {
                Some(EmailAvailability::Taken) => Some(EMAIL_TAKEN_MESSAGE.to_string()),
                Some(EmailAvailability::Unknown) => Some(EMAIL_UNVERIFIED_MESSAGE.to_string()),
                _ => None,
            },
            (WizardStep::Payment, steps::FIELD_EXPIRY_DATE) => {
                if validate::validate_expiry(value, self.settings.expiry_cutoff()) {
                    None
                } else {
                    Some(self.settings.expiry_cutoff().message())
                }
            }
            (WizardStep::Password, steps::FIELD_PASSWORD) => {
                validate::password_error(value).map(str::to_string)
            }
            (WizardStep::Password, steps::FIELD_CONFIRM_PASSWORD) => {
                let password = inner
                    .values
                    .get(steps::FIELD_PASSWORD)
                    .map(String::as_str)
                    .unwrap_or("");
                validate::confirm_password_error(password, value).map(str::to_string)
            }
            _ => None,
        }
    }

    async fn release_submission_guard(&self) {
        self.inner.lock().await.submitting = false;
    }

    async fn post_registration(
        &self,
        form: &[(String, String)],
    ) -> Result<RegisterResponse, SubmitError> {
        let response = self
            .http
            .post(format!("{}/register/register", self.backend_base))
            .form(&form)
            .send()
            .await
            .map_err(|err| SubmitError::Transport(err.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| SubmitError::Transport(err.to_string()))?;

        if let Ok(body) = serde_json::from_str::<RegisterResponse>(&text) {
            return Ok(body);
        }
        if status.is_success() {
            return Err(SubmitError::Transport(format!(
                "unexpected registration response body ({} bytes)",
                text.len()
            )));
        }
        Err(SubmitError::Rejected(format!(
            "registration endpoint returned {status}"
        )))
    }
}

/// The welcome email is addressed from the registrant's own details.
fn notification_params(values: &BTreeMap<String, String>) -> NotificationParams {
    let first = values.get("first_name").map(String::as_str).unwrap_or("");
    let last = values.get("last_name").map(String::as_str).unwrap_or("");
    NotificationParams {
        name: format!("{first} {last}").trim().to_string(),
        from_email: values
            .get(steps::FIELD_EMAIL)
            .cloned()
            .unwrap_or_default(),
        selected_plan: values
            .get(steps::FIELD_SELECTED_PLAN)
            .cloned()
            .unwrap_or_default(),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
