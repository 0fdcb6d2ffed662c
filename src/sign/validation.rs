//! Namespace and request checks shared by both sides of a session.

use crate::constants::WEEK;
use crate::error::{Error, Result};
use crate::types::{Namespace, Namespaces};
use crate::utils::{AccountId, is_caip2};

// Keys are either a namespace (`eip155`) or a chain (`eip155:1`)
fn chains_of<'a>(key: &'a str, namespace: &'a Namespace) -> Result<Vec<&'a str>> {
    if key.contains(':') {
        if !is_caip2(key) {
            return Err(Error::InvalidNamespaces(format!("{key} is not a chain id")));
        }
        if !namespace.chains.is_empty() && namespace.chains.iter().any(|c| c != key) {
            return Err(Error::InvalidNamespaces(format!(
                "{key} lists other chains"
            )));
        }
        return Ok(vec![key]);
    }

    if namespace.chains.is_empty() {
        return Err(Error::InvalidNamespaces(format!("{key} has no chains")));
    }
    for chain in &namespace.chains {
        if !is_caip2(chain) {
            return Err(Error::InvalidNamespaces(format!("{chain} is not a chain id")));
        }
        if chain.split(':').next() != Some(key) {
            return Err(Error::InvalidNamespaces(format!(
                "{chain} does not belong to {key}"
            )));
        }
    }
    Ok(namespace.chains.iter().map(String::as_str).collect())
}

/// Checks the namespaces a dApp asks for.
pub fn validate_proposal_namespaces(namespaces: &Namespaces) -> Result<()> {
    for (key, namespace) in namespaces {
        if key.is_empty() {
            return Err(Error::InvalidNamespaces("empty namespace key".to_string()));
        }
        chains_of(key, namespace)?;
    }
    Ok(())
}

/// Checks the namespaces a wallet grants: every account must be a valid
/// CAIP-10 id on one of the namespace chains.
pub fn validate_session_namespaces(namespaces: &Namespaces) -> Result<()> {
    if namespaces.is_empty() {
        return Err(Error::InvalidNamespaces("no namespaces".to_string()));
    }

    for (key, namespace) in namespaces {
        let chains = chains_of(key, namespace)?;
        let accounts = namespace.accounts.as_deref().unwrap_or_default();
        if accounts.is_empty() {
            return Err(Error::InvalidNamespaces(format!("{key} has no accounts")));
        }
        for account in accounts {
            let account: AccountId = account.parse()?;
            if !chains.contains(&account.chain_id().as_str()) {
                return Err(Error::InvalidNamespaces(format!(
                    "account {account} is not on a {key} chain"
                )));
            }
        }
    }
    Ok(())
}

/// Every required namespace must be covered by the granted ones.
pub fn validate_required_namespaces(required: &Namespaces, granted: &Namespaces) -> Result<()> {
    for (key, requested) in required {
        let requested_chains = chains_of(key, requested)?;
        for chain in requested_chains {
            if !is_chain_authorized(granted, chain) {
                return Err(Error::UnauthorizedChain(chain.to_string()));
            }
            for method in &requested.methods {
                if !is_method_authorized(granted, chain, method) {
                    return Err(Error::UnauthorizedMethod(method.clone()));
                }
            }
            for event in &requested.events {
                if !is_event_authorized(granted, chain, event) {
                    return Err(Error::UnauthorizedEvent(event.clone()));
                }
            }
        }
    }
    Ok(())
}

fn namespaces_for_chain<'a>(
    namespaces: &'a Namespaces,
    chain: &'a str,
) -> impl Iterator<Item = &'a Namespace> {
    namespaces.iter().filter_map(move |(key, namespace)| {
        let covers = if key.contains(':') {
            key == chain
        } else {
            namespace.chains.iter().any(|c| c == chain)
                || namespace
                    .accounts
                    .iter()
                    .flatten()
                    .any(|a| a.rsplit_once(':').is_some_and(|(c, _)| c == chain))
        };
        covers.then_some(namespace)
    })
}

pub fn is_chain_authorized(namespaces: &Namespaces, chain: &str) -> bool {
    namespaces_for_chain(namespaces, chain).next().is_some()
}

pub fn is_method_authorized(namespaces: &Namespaces, chain: &str, method: &str) -> bool {
    namespaces_for_chain(namespaces, chain).any(|n| n.methods.iter().any(|m| m == method))
}

pub fn is_event_authorized(namespaces: &Namespaces, chain: &str, event: &str) -> bool {
    namespaces_for_chain(namespaces, chain).any(|n| n.events.iter().any(|e| e == event))
}

/// A new expiry may not move backwards or past a week from now.
pub fn validate_extend(expiry: u64, current: u64, now: u64) -> Result<()> {
    if expiry < current || expiry > now + WEEK {
        return Err(Error::InvalidExpiry(expiry));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "0x0000000000000000000000000000000000000123";

    fn eip155(chains: &[&str], accounts: Option<Vec<String>>) -> Namespaces {
        Namespaces::from([(
            "eip155".to_string(),
            Namespace {
                accounts,
                chains: chains.iter().map(|c| c.to_string()).collect(),
                methods: vec!["eth_sendTransaction".to_string()],
                events: vec!["chainChanged".to_string()],
            },
        )])
    }

    #[test]
    fn test_proposal_namespaces() {
        assert!(validate_proposal_namespaces(&eip155(&["eip155:1"], None)).is_ok());
        assert!(validate_proposal_namespaces(&eip155(&[], None)).is_err());
        assert!(validate_proposal_namespaces(&eip155(&["solana:1"], None)).is_err());
        assert!(validate_proposal_namespaces(&eip155(&["eip155"], None)).is_err());

        let chain_keyed = Namespaces::from([("eip155:10".to_string(), Namespace::default())]);
        assert!(validate_proposal_namespaces(&chain_keyed).is_ok());
    }

    #[test]
    fn test_session_namespaces() {
        let good = eip155(&["eip155:1"], Some(vec![format!("eip155:1:{ADDRESS}")]));
        assert!(validate_session_namespaces(&good).is_ok());

        let other_chain = eip155(&["eip155:1"], Some(vec![format!("eip155:5:{ADDRESS}")]));
        assert!(validate_session_namespaces(&other_chain).is_err());

        let bad_address = eip155(&["eip155:1"], Some(vec!["eip155:1:0x12".to_string()]));
        assert!(matches!(
            validate_session_namespaces(&bad_address),
            Err(Error::InvalidAccount(_))
        ));

        assert!(validate_session_namespaces(&eip155(&["eip155:1"], None)).is_err());
    }

    #[test]
    fn test_required_namespaces_are_covered() {
        let required = eip155(&["eip155:1"], None);
        let granted = eip155(&["eip155:1", "eip155:10"], None);
        assert!(validate_required_namespaces(&required, &granted).is_ok());

        let missing_chain = eip155(&["eip155:10"], None);
        assert!(matches!(
            validate_required_namespaces(&required, &missing_chain),
            Err(Error::UnauthorizedChain(_))
        ));
    }

    #[test]
    fn test_authorization() {
        let granted = eip155(&["eip155:1"], None);
        assert!(is_method_authorized(&granted, "eip155:1", "eth_sendTransaction"));
        assert!(!is_method_authorized(&granted, "eip155:1", "eth_sign"));
        assert!(!is_method_authorized(&granted, "eip155:5", "eth_sendTransaction"));
        assert!(is_event_authorized(&granted, "eip155:1", "chainChanged"));
        assert!(!is_chain_authorized(&granted, "eip155:5"));
    }

    #[test]
    fn test_extend_window() {
        let now = 1_000_000;
        assert!(validate_extend(now + WEEK, now + 10, now).is_ok());
        assert!(validate_extend(now + WEEK + 1, now + 10, now).is_err());
        assert!(validate_extend(now + 5, now + 10, now).is_err());
    }
}
