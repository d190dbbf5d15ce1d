//! Return-address resolution for dispatched requests.

use crate::error::ResolveError;
use crate::routing::{LookupType, Router};
use courier_types::{Address, Header};

/// Work out where responses to `header.from` should be sealed and sent.
///
/// A directly reachable sender is used as-is and the router is not consulted.
/// Otherwise the router is asked by alias when the sender carries one, or by
/// fingerprint when it does not. The directory's answer must name the same
/// identity that signed the request and, once the signer's keys are attached,
/// be directly reachable.
pub async fn resolve(router: Option<&dyn Router>, header: &Header) -> Result<Address, ResolveError> {
    let sender = &header.from;
    if sender.can_send() {
        return Ok(sender.clone());
    }

    let router = router.ok_or(ResolveError::NoRouter)?;
    let resolved = match sender.alias() {
        Some(alias) => router.lookup_alias(alias, LookupType::Default).await?,
        None => router.lookup(sender.fingerprint(), LookupType::Default).await?,
    };

    if resolved.fingerprint() != sender.fingerprint() || !resolved.is_consistent() {
        return Err(mismatch(sender, &resolved));
    }

    // Directory entries may omit keys; the signer's keys are already verified.
    let resolved = match sender.keys() {
        Some(keys) => resolved
            .clone()
            .with_keys(*keys)
            .map_err(|_| mismatch(sender, &resolved))?,
        None => resolved,
    };
    if !resolved.can_send() {
        return Err(ResolveError::Unreachable(resolved.fingerprint().to_string()));
    }
    Ok(resolved)
}

fn mismatch(sender: &Address, returned: &Address) -> ResolveError {
    ResolveError::Mismatch {
        sender: sender.fingerprint().to_string(),
        returned: returned.fingerprint().to_string(),
    }
}
