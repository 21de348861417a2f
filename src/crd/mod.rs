//! Custom Resource Definitions (CRDs) for vault-operator.
//!
//! - `Vault`: a Vault deployment managed by the operator

mod vault;

pub use vault::*;

use crate::manager::{AddToScheme, Scheme, SchemeError};

/// Register every type the operator's controllers use
pub fn add_to_scheme(scheme: &mut Scheme) -> Result<(), SchemeError> {
    scheme.add::<Vault>()?;
    Ok(())
}

/// Scheme builder for the operator's API types
#[derive(Debug, Clone, Copy, Default)]
pub struct Apis;

impl AddToScheme for Apis {
    fn add_to_scheme(&self, scheme: &mut Scheme) -> Result<(), SchemeError> {
        add_to_scheme(scheme)
    }
}
