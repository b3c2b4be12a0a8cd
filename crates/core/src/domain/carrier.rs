use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Carrier {
    pub name: String,
    /// One or more addresses separated by `;`, `,` or `:`.
    pub email: String,
    #[serde(default)]
    pub notes: String,
}

/// Outcome of splitting a carrier's address list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CarrierAddresses {
    pub valid: Vec<String>,
    pub invalid: Vec<String>,
}

impl Carrier {
    /// Name and email are required, and the email field must hold an address.
    pub fn validate(&self) -> Result<(), DomainError> {
        let missing: Vec<String> = [("name", &self.name), ("email", &self.email)]
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| (*field).to_owned())
            .collect();
        if !missing.is_empty() {
            return Err(DomainError::MissingRequiredFields(missing));
        }
        if !self.email.contains('@') {
            return Err(DomainError::InvariantViolation(format!(
                "carrier `{}` has no email address in `{}`",
                self.name, self.email
            )));
        }
        Ok(())
    }

    pub fn addresses(&self) -> CarrierAddresses {
        let mut addresses = CarrierAddresses::default();
        let normalized = self.email.replace([';', ':'], ",");
        for entry in normalized.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            if entry.contains('@') {
                addresses.valid.push(entry.to_owned());
            } else {
                addresses.invalid.push(entry.to_owned());
            }
        }
        addresses
    }
}

/// Checks a whole carrier list, naming every invalid row (1-based).
pub fn validate_roster(carriers: &[Carrier]) -> Result<(), DomainError> {
    let invalid: Vec<String> = carriers
        .iter()
        .enumerate()
        .filter(|(_, carrier)| carrier.validate().is_err())
        .map(|(index, _)| (index + 1).to_string())
        .collect();
    if invalid.is_empty() {
        return Ok(());
    }
    Err(DomainError::InvariantViolation(format!(
        "invalid carrier rows {}: name and email are required, email must contain `@`",
        invalid.join(", ")
    )))
}

/// Legal and banking master data for a carrier, read only when a contract
/// is materialized. Every column is optional in the source table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarrierProfile {
    pub name: String,
    pub email: String,
    pub legal_name: String,
    pub inn: String,
    pub kpp: String,
    pub ogrn: String,
    pub address: String,
    pub bank_name: String,
    pub bik: String,
    pub rs: String,
    pub ks: String,
    pub contract_number: String,
    pub contract_date: String,
}

impl CarrierProfile {
    pub fn fields(&self) -> [(&'static str, &str); 13] {
        [
            ("name", &self.name),
            ("email", &self.email),
            ("legal_name", &self.legal_name),
            ("inn", &self.inn),
            ("kpp", &self.kpp),
            ("ogrn", &self.ogrn),
            ("address", &self.address),
            ("bank_name", &self.bank_name),
            ("bik", &self.bik),
            ("rs", &self.rs),
            ("ks", &self.ks),
            ("contract_number", &self.contract_number),
            ("contract_date", &self.contract_date),
        ]
    }
}

/// Exact-name lookup over carrier master data.
pub trait CarrierDirectory {
    fn lookup(&self, carrier_name: &str) -> Option<CarrierProfile>;
}

impl CarrierDirectory for [CarrierProfile] {
    fn lookup(&self, carrier_name: &str) -> Option<CarrierProfile> {
        self.iter().find(|profile| profile.name == carrier_name).cloned()
    }
}

impl CarrierDirectory for Vec<CarrierProfile> {
    fn lookup(&self, carrier_name: &str) -> Option<CarrierProfile> {
        self.as_slice().lookup(carrier_name)
    }
}
