//! Static provider tables: known domains, login pages and probe orders.

use phf::phf_map;

use super::{ProbeKind, Provider};

/// Fixed map of well-known mail domains to provider tags.
pub static KNOWN_DOMAINS: phf::Map<&'static str, ProviderTag> = phf_map! {
    "gmail.com" => ProviderTag::Gmail,
    "googlemail.com" => ProviderTag::Gmail,
    "outlook.com" => ProviderTag::Microsoft,
    "hotmail.com" => ProviderTag::Microsoft,
    "live.com" => ProviderTag::Microsoft,
    "microsoft.com" => ProviderTag::Microsoft,
    "office365.com" => ProviderTag::Microsoft,
    "yahoo.com" => ProviderTag::Yahoo,
    "aol.com" => ProviderTag::Aol,
    "protonmail.com" => ProviderTag::Proton,
    "proton.me" => ProviderTag::Proton,
    "zoho.com" => ProviderTag::Zoho,
    "mail.ru" => ProviderTag::MailRu,
    "yandex.ru" => ProviderTag::Yandex,
};

/// Copyable tag used inside the phf map (phf cannot hold `String` payloads).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderTag {
    Gmail,
    Microsoft,
    Yahoo,
    Aol,
    Proton,
    Zoho,
    MailRu,
    Yandex,
}

/// MX-host substrings that identify a provider when the domain is unknown.
pub const MX_SUBSTRINGS: &[(&str, ProviderTag)] = &[
    ("google", ProviderTag::Gmail),
    ("gmail", ProviderTag::Gmail),
    ("outlook", ProviderTag::Microsoft),
    ("microsoft", ProviderTag::Microsoft),
    ("office365", ProviderTag::Microsoft),
    ("yahoo", ProviderTag::Yahoo),
    ("protonmail", ProviderTag::Proton),
    ("proton.me", ProviderTag::Proton),
    ("zoho", ProviderTag::Zoho),
    ("mail.ru", ProviderTag::MailRu),
    ("yandex", ProviderTag::Yandex),
];

pub const GOOGLE_LOGIN_URL: &str =
    "https://accounts.google.com/v3/signin/identifier?flowName=GlifWebSignIn";
pub const MICROSOFT_LOGIN_URL: &str = "https://login.microsoftonline.com";
pub const MICROSOFT_FALLBACK_LOGIN_URL: &str = "https://login.live.com";

/// Login pages per provider tag.
pub fn login_url(provider: &Provider) -> Option<&'static str> {
    match provider {
        Provider::Gmail | Provider::CustomGoogle => Some(GOOGLE_LOGIN_URL),
        Provider::Microsoft => Some(MICROSOFT_LOGIN_URL),
        Provider::Yahoo => Some("https://login.yahoo.com"),
        Provider::Proton => Some("https://mail.proton.me/login"),
        Provider::Zoho => Some("https://accounts.zoho.com/signin"),
        Provider::MailRu => Some("https://account.mail.ru/login"),
        Provider::Yandex => Some("https://passport.yandex.ru/auth"),
        Provider::Other(domain) if domain == "aol.com" => Some("https://login.aol.com"),
        Provider::Other(_) | Provider::Custom => None,
    }
}

/// Per-provider probe order. The first definitive outcome wins.
pub fn probe_order(provider: &Provider) -> &'static [ProbeKind] {
    match provider {
        Provider::Microsoft => &[ProbeKind::Api, ProbeKind::Browser, ProbeKind::Smtp],
        Provider::Gmail => &[ProbeKind::Smtp, ProbeKind::Browser],
        Provider::CustomGoogle => &[ProbeKind::Browser, ProbeKind::Smtp],
        Provider::Custom => &[ProbeKind::Smtp],
        _ => &[ProbeKind::Browser, ProbeKind::Smtp],
    }
}
