use std::net::IpAddr;

use ipnet::IpNet;

use super::{split_list, Strategy};
use crate::{models::Parameters, Context};

/// Always matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStrategy;

impl Strategy for DefaultStrategy {
    fn name(&self) -> &str {
        "default"
    }

    fn is_enabled(&self, _parameters: &Parameters, _context: &Context) -> bool {
        true
    }
}

/// Matches users listed in the comma-separated `userIds` parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserWithIdStrategy;

impl Strategy for UserWithIdStrategy {
    fn name(&self) -> &str {
        "userWithId"
    }

    fn is_enabled(&self, parameters: &Parameters, context: &Context) -> bool {
        let Some(user_id) = context.get_field("userId") else {
            return false;
        };
        parameters
            .get("userIds")
            .is_some_and(|ids| split_list(ids).any(|id| id == &*user_id))
    }
}

/// Matches callers whose `remoteAddress` equals or falls within one of the `IPs` entries.
///
/// Entries may be plain addresses or CIDR ranges.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteAddressStrategy;

impl Strategy for RemoteAddressStrategy {
    fn name(&self) -> &str {
        "remoteAddress"
    }

    fn is_enabled(&self, parameters: &Parameters, context: &Context) -> bool {
        let Some(remote_address) = context.get_field("remoteAddress") else {
            return false;
        };
        let Some(ips) = parameters.get("IPs") else {
            return false;
        };
        let parsed = remote_address.trim().parse::<IpAddr>().ok();

        split_list(ips).any(|entry| {
            if entry == remote_address.trim() {
                return true;
            }
            match (entry.parse::<IpNet>(), parsed) {
                (Ok(range), Some(address)) => range.contains(&address),
                _ => false,
            }
        })
    }
}

/// Matches if the host running the engine is listed in the `hostNames` parameter.
///
/// The hostname is resolved once, at construction.
#[derive(Debug, Clone)]
pub struct ApplicationHostnameStrategy {
    hostname: String,
}

impl ApplicationHostnameStrategy {
    /// Resolve the hostname from the `HOSTNAME` environment variable or the operating system.
    pub fn new() -> ApplicationHostnameStrategy {
        let hostname = std::env::var("HOSTNAME")
            .ok()
            .filter(|name| !name.is_empty())
            .or_else(|| {
                hostname::get()
                    .ok()
                    .and_then(|name| name.into_string().ok())
            })
            .unwrap_or_else(|| "undefined".to_owned());
        ApplicationHostnameStrategy::with_hostname(hostname)
    }

    /// Use a fixed hostname.
    pub fn with_hostname(hostname: impl Into<String>) -> ApplicationHostnameStrategy {
        ApplicationHostnameStrategy {
            hostname: hostname.into().to_lowercase(),
        }
    }

    /// The hostname compared against `hostNames`.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}

impl Default for ApplicationHostnameStrategy {
    fn default() -> ApplicationHostnameStrategy {
        ApplicationHostnameStrategy::new()
    }
}

impl Strategy for ApplicationHostnameStrategy {
    fn name(&self) -> &str {
        "applicationHostname"
    }

    fn is_enabled(&self, parameters: &Parameters, _context: &Context) -> bool {
        parameters.get("hostNames").is_some_and(|names| {
            split_list(names).any(|name| name.to_lowercase() == self.hostname)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(name: &str, value: &str) -> Parameters {
        Parameters::from([(name.to_owned(), value.to_owned())])
    }

    #[test]
    fn default_always_matches() {
        assert!(DefaultStrategy.is_enabled(&Parameters::new(), &Context::new()));
    }

    #[test]
    fn user_with_id() {
        let parameters = params("userIds", "123, 456 ,789");
        assert!(UserWithIdStrategy.is_enabled(&parameters, &Context::new().with_user_id("456")));
        assert!(!UserWithIdStrategy.is_enabled(&parameters, &Context::new().with_user_id("45")));
        assert!(!UserWithIdStrategy.is_enabled(&parameters, &Context::new()));
        assert!(!UserWithIdStrategy
            .is_enabled(&Parameters::new(), &Context::new().with_user_id("123")));
    }

    #[test]
    fn remote_address_exact_match() {
        let parameters = params("IPs", "10.0.0.1, 192.168.1.7");
        let strategy = RemoteAddressStrategy;
        assert!(strategy.is_enabled(
            &parameters,
            &Context::new().with_remote_address("192.168.1.7")
        ));
        assert!(!strategy.is_enabled(&parameters, &Context::new().with_remote_address("10.0.0.2")));
        assert!(!strategy.is_enabled(&parameters, &Context::new()));
    }

    #[test]
    fn remote_address_cidr_match() {
        let parameters = params("IPs", "10.0.0.0/24,2001:db8::/32");
        let strategy = RemoteAddressStrategy;
        assert!(strategy.is_enabled(&parameters, &Context::new().with_remote_address("10.0.0.77")));
        assert!(!strategy.is_enabled(&parameters, &Context::new().with_remote_address("10.0.1.1")));
        assert!(strategy.is_enabled(
            &parameters,
            &Context::new().with_remote_address("2001:db8::1")
        ));
        assert!(!strategy.is_enabled(
            &parameters,
            &Context::new().with_remote_address("not-an-ip")
        ));
    }

    #[test]
    fn application_hostname() {
        let strategy = ApplicationHostnameStrategy::with_hostname("Web-01");
        assert_eq!(strategy.hostname(), "web-01");
        assert!(strategy.is_enabled(&params("hostNames", "db-01, WEB-01"), &Context::new()));
        assert!(!strategy.is_enabled(&params("hostNames", "db-01"), &Context::new()));
        assert!(!strategy.is_enabled(&Parameters::new(), &Context::new()));
    }

    #[test]
    fn application_hostname_is_resolved() {
        assert!(!ApplicationHostnameStrategy::new().hostname().is_empty());
    }
}
