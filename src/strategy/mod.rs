//! Provider identification and probe sequencing.
//!
//! The decision tables live in [`tables`]; this module derives the provider
//! tag from the address domain and its MX records and exposes the probe order
//! the engine walks.

pub mod tables;

use std::fmt;

use tables::ProviderTag;

/// Provider tag derived from the domain and MX records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    Gmail,
    Microsoft,
    Yahoo,
    Proton,
    Zoho,
    MailRu,
    Yandex,
    /// Google Workspace hosted domain (Google MX, not gmail.com).
    CustomGoogle,
    /// Unknown provider; SMTP with catch-all detection only.
    Custom,
    /// Known provider-domain without a dedicated tag (e.g. aol.com).
    Other(String),
}

impl Provider {
    /// Label used in results and statistics.
    pub fn label(&self) -> &str {
        match self {
            Self::Gmail => "gmail.com",
            Self::Microsoft => "Microsoft",
            Self::Yahoo => "yahoo.com",
            Self::Proton => "proton.me",
            Self::Zoho => "zoho.com",
            Self::MailRu => "mail.ru",
            Self::Yandex => "yandex.ru",
            Self::CustomGoogle => "customGoogle",
            Self::Custom => "Custom",
            Self::Other(domain) => domain,
        }
    }

    pub fn login_url(&self) -> Option<&'static str> {
        tables::login_url(self)
    }

    pub fn is_microsoft(&self) -> bool {
        matches!(self, Self::Microsoft)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The probes the engine can sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Api,
    Browser,
    Smtp,
}

fn from_tag(tag: ProviderTag, domain: &str) -> Provider {
    match tag {
        ProviderTag::Gmail => {
            if domain == "gmail.com" || domain == "googlemail.com" {
                Provider::Gmail
            } else {
                Provider::CustomGoogle
            }
        }
        ProviderTag::Microsoft => Provider::Microsoft,
        ProviderTag::Yahoo => Provider::Yahoo,
        ProviderTag::Aol => Provider::Other("aol.com".to_string()),
        ProviderTag::Proton => Provider::Proton,
        ProviderTag::Zoho => Provider::Zoho,
        ProviderTag::MailRu => Provider::MailRu,
        ProviderTag::Yandex => Provider::Yandex,
    }
}

/// Derive the provider for `domain`, consulting MX hosts when the domain is
/// not in the fixed map.
pub fn identify(domain: &str, mx_hosts: &[String]) -> Provider {
    if let Some(tag) = tables::KNOWN_DOMAINS.get(domain) {
        return from_tag(*tag, domain);
    }

    for mx in mx_hosts {
        let mx = mx.to_lowercase();
        for (needle, tag) in tables::MX_SUBSTRINGS {
            if mx.contains(needle) {
                return from_tag(*tag, domain);
            }
        }
    }

    Provider::Custom
}

/// Probe order for a provider; a thin re-export of the decision table.
pub fn probe_order(provider: &Provider) -> &'static [ProbeKind] {
    tables::probe_order(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn fixed_map_wins_over_mx() {
        assert_eq!(identify("gmail.com", &hosts(&[])), Provider::Gmail);
        assert_eq!(identify("hotmail.com", &hosts(&[])), Provider::Microsoft);
        assert_eq!(identify("yandex.ru", &hosts(&[])), Provider::Yandex);
        assert_eq!(
            identify("aol.com", &hosts(&[])),
            Provider::Other("aol.com".to_string())
        );
    }

    #[test]
    fn google_mx_on_foreign_domain_is_custom_google() {
        assert_eq!(
            identify("corp.example", &hosts(&["aspmx.l.google.com"])),
            Provider::CustomGoogle
        );
    }

    #[test]
    fn microsoft_mx_substrings() {
        assert_eq!(
            identify("corp.example", &hosts(&["corp-example.mail.protection.outlook.com"])),
            Provider::Microsoft
        );
        assert_eq!(
            identify("corp.example", &hosts(&["mx.office365.us"])),
            Provider::Microsoft
        );
    }

    #[test]
    fn unknown_mx_is_custom() {
        assert_eq!(
            identify("corp.example", &hosts(&["mail.corp.example"])),
            Provider::Custom
        );
        assert_eq!(identify("corp.example", &hosts(&[])), Provider::Custom);
    }

    #[test]
    fn probe_orders_match_the_table() {
        assert_eq!(
            probe_order(&Provider::Microsoft),
            &[ProbeKind::Api, ProbeKind::Browser, ProbeKind::Smtp]
        );
        assert_eq!(
            probe_order(&Provider::Gmail),
            &[ProbeKind::Smtp, ProbeKind::Browser]
        );
        assert_eq!(
            probe_order(&Provider::CustomGoogle),
            &[ProbeKind::Browser, ProbeKind::Smtp]
        );
        assert_eq!(probe_order(&Provider::Custom), &[ProbeKind::Smtp]);
        assert_eq!(
            probe_order(&Provider::Yahoo),
            &[ProbeKind::Browser, ProbeKind::Smtp]
        );
    }

    #[test]
    fn login_urls_exist_for_browser_providers() {
        for provider in [
            Provider::Gmail,
            Provider::Microsoft,
            Provider::Yahoo,
            Provider::Proton,
            Provider::Zoho,
            Provider::MailRu,
            Provider::Yandex,
            Provider::CustomGoogle,
        ] {
            assert!(provider.login_url().is_some(), "{provider}");
        }
        assert!(Provider::Custom.login_url().is_none());
    }
}
