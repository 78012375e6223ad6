use serde::{Deserialize, Serialize};

/// A subscription package as presented on the package-selection section.
///
/// Price is carried as the display string from the page markup, not a
/// decimal: it is only ever concatenated into the plan label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPackage {
    pub name: String,
    pub price: String,
}

impl PlanPackage {
    pub fn new(name: impl Into<String>, price: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            price: price.into(),
        }
    }

    /// Label written into the `selected_plan` field, e.g. `"Starter - £9.99"`.
    pub fn label(&self) -> String {
        format!("{} - £{}", self.name, self.price)
    }
}

/// Outcome of an email-availability probe against the backend.
///
/// `Unknown` means the probe itself failed (transport error); callers must
/// treat it as blocking rather than assume the address is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailAvailability {
    Available,
    Taken,
    Unknown,
}
