//! # Payment Slice
//!
//! Saved payment methods. Whenever the list is non-empty exactly one
//! method is the default; `normalize_default` restores that after every
//! mutation.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::api::ApiError;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Card,
    Wallet,
    Cash,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PaymentType,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub last4: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl PaymentMethodInfo {
    pub fn label(&self) -> String {
        match (self.kind, &self.brand, &self.last4) {
            (PaymentType::Card, Some(brand), Some(last4)) => format!("{brand} •••• {last4}"),
            (PaymentType::Card, None, Some(last4)) => format!("Card •••• {last4}"),
            (PaymentType::Card, _, None) => "Card".to_string(),
            (PaymentType::Wallet, Some(brand), _) => brand.clone(),
            (PaymentType::Wallet, None, _) => "Wallet".to_string(),
            (PaymentType::Cash, _, _) => "Cash".to_string(),
        }
    }
}

/// A method to register with the backend. Card details are tokenized
/// upstream; only the processor token and display fields travel here.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewPaymentMethod {
    #[serde(rename = "type")]
    pub kind: PaymentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last4: Option<String>,
    #[serde(default)]
    pub make_default: bool,
}

pub fn validate_new_method(method: &NewPaymentMethod) -> Result<(), String> {
    if method.kind != PaymentType::Card {
        return Ok(());
    }
    if method.token.as_deref().is_none_or(|t| t.trim().is_empty()) {
        return Err("Card details are incomplete.".to_string());
    }
    match method.last4.as_deref() {
        Some(last4) if last4.len() == 4 && last4.chars().all(|c| c.is_ascii_digit()) => Ok(()),
        _ => Err("Card number is invalid.".to_string()),
    }
}

#[derive(Debug, Default)]
pub struct PaymentSlice {
    pub methods: Vec<PaymentMethodInfo>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl PaymentSlice {
    pub fn default_method(&self) -> Option<&PaymentMethodInfo> {
        self.methods.iter().find(|m| m.is_default)
    }

    pub fn begin(&mut self) -> bool {
        if self.is_loading {
            return false;
        }
        self.is_loading = true;
        self.error = None;
        true
    }

    pub fn fail(&mut self, error: &ApiError) {
        warn!("Payment request failed: {}", error);
        self.is_loading = false;
        self.error = Some(error.user_message());
    }

    pub fn set_methods(&mut self, methods: Vec<PaymentMethodInfo>) {
        self.is_loading = false;
        self.methods = methods;
        self.normalize_default(None);
    }

    pub fn added(&mut self, method: PaymentMethodInfo) {
        self.is_loading = false;
        let preferred = method.is_default.then(|| method.id.clone());
        self.methods.retain(|m| m.id != method.id);
        self.methods.push(method);
        self.normalize_default(preferred.as_deref());
    }

    pub fn removed(&mut self, id: &str) {
        self.is_loading = false;
        self.methods.retain(|m| m.id != id);
        self.normalize_default(None);
    }

    pub fn default_set(&mut self, id: &str) {
        self.is_loading = false;
        if self.methods.iter().any(|m| m.id == id) {
            self.normalize_default(Some(id));
        }
    }

    /// `preferred` wins; otherwise the first flagged method; otherwise the first.
    fn normalize_default(&mut self, preferred: Option<&str>) {
        let chosen = preferred
            .map(str::to_string)
            .or_else(|| self.default_method().map(|m| m.id.clone()))
            .or_else(|| self.methods.first().map(|m| m.id.clone()));
        for method in &mut self.methods {
            method.is_default = Some(&method.id) == chosen.as_ref();
        }
    }
}
