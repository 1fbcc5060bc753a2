//! Pre-flight checks for payment requests.

use crate::amount;
use crate::config::AddressFormat;
use crate::error::ValidationError;
use crate::types::{MinorAmount, PaymentRequest};

/// Checks a request against the token precision and the chain's address syntax.
///
/// Pure and synchronous; the orchestrator runs it before any chain call.
#[derive(Debug, Clone)]
pub struct PaymentValidator {
    decimals: u8,
    address_format: AddressFormat,
}

impl PaymentValidator {
    pub fn new(decimals: u8, address_format: AddressFormat) -> Self {
        Self {
            decimals,
            address_format,
        }
    }

    /// Validate a request, returning its amount in minor units.
    pub fn validate(&self, request: &PaymentRequest) -> Result<MinorAmount, ValidationError> {
        let amount = self.validate_amount(&request.amount)?;
        self.validate_address(&request.recipient)?;
        Ok(amount)
    }

    /// The amount must encode to a strictly positive number of minor units.
    pub fn validate_amount(&self, value: &str) -> Result<MinorAmount, ValidationError> {
        let amount = amount::encode(value, self.decimals)
            .map_err(|e| ValidationError::NonPositiveAmount(e.to_string()))?;

        if amount.is_zero() {
            return Err(ValidationError::NonPositiveAmount(format!(
                "{:?} is not greater than zero at {} decimals",
                value, self.decimals
            )));
        }

        Ok(amount)
    }

    pub fn validate_address(&self, address: &str) -> Result<(), ValidationError> {
        let format = &self.address_format;

        let body = address.strip_prefix(format.prefix.as_str()).ok_or_else(|| {
            ValidationError::MalformedAddress(format!(
                "{:?} must start with {:?}",
                address, format.prefix
            ))
        })?;

        if address.len() != format.length {
            return Err(ValidationError::MalformedAddress(format!(
                "length must be {}, got {}",
                format.length,
                address.len()
            )));
        }

        if format.hex_body && hex::decode(body).is_err() {
            return Err(ValidationError::MalformedAddress(format!(
                "{:?} is not hex-encoded",
                address
            )));
        }

        Ok(())
    }
}

impl Default for PaymentValidator {
    fn default() -> Self {
        Self::new(6, AddressFormat::default())
    }
}
