//! Discovery and signal tables.
//!
//! Everything the probe matches against lives here as data: input selectors,
//! button ids, multi-language button captions, per-provider error phrases and
//! the markers that hide a password field from real users.

use crate::strategy::Provider;

/// Ordered selectors for the address input.
pub const EMAIL_FIELD_SELECTORS: &[&str] = &[
    "input[type='email']",
    "input[name='email']",
    "input[name='username']",
    "input[name='loginfmt']",
    "input#identifierId",
    "input#login-username",
];

/// Known ids and generic fallbacks for the submit button, tried after the
/// caption match.
pub const NEXT_BUTTON_SELECTORS: &[&str] = &[
    "#identifierNext",
    "#idSIButton9",
    "#login-signin",
    "button[type='submit']",
    "input[type='submit']",
];

/// Button captions in the languages the login pages localize to.
pub const NEXT_BUTTON_TEXTS: &[&str] = &[
    "Next", "Suivant", "Continuer", "Continue", "Weiter", "Siguiente", "Próximo", "Avanti",
    "Volgende", "Далее", "下一步", "次へ", "다음", "التالي", "Tiếp theo",
];

/// Google's inline error node on the identifier page.
pub const GOOGLE_ERROR_NODE: &str = r#"div.dMNVAe[jsname="OZNMeb"]"#;

/// Yahoo's inline username error.
pub const YAHOO_ERROR_NODE: &str = "p#username-error.error-msg";

/// Microsoft's inline username error.
pub const MICROSOFT_ERROR_NODE: &str = "#usernameError";

/// Description node shown when one address maps to several Microsoft accounts.
pub const MICROSOFT_LOGIN_DESCRIPTION: &str = "#loginDescription";

pub const MICROSOFT_MULTI_ACCOUNT_PHRASES: &[&str] = &[
    "this email is used with more than one account",
    "we're having trouble locating your account",
    "il semble que ce courriel est utilisé avec plus d'un compte microsoft",
    "nous rencontrons des problèmes pour localiser votre compte",
];

/// Class names providers use to keep a decoy password field off screen.
pub const HIDDEN_PASSWORD_CLASSES: &[&str] = &["moveOffScreen", "Hvu6D", "hidden"];

/// CAPTCHA markers: element selectors checked for visibility.
pub const CAPTCHA_SELECTORS: &[&str] = &[
    "#captchaimg",
    ".g-recaptcha",
    "iframe[src*='recaptcha']",
    "input[name='ca']",
];

const GOOGLE_NOT_FOUND_PHRASES: &[&str] = &[
    "couldn't find your google account",
    "couldn't find your account",
    "no account found with that email",
    "couldn't find an account with that email",
];

const MICROSOFT_NOT_FOUND_PHRASES: &[&str] = &[
    "we couldn't find an account with that username",
    "that microsoft account doesn't exist",
    "no account found",
    "this username may be incorrect",
    "ce nom d'utilisateur est peut-être incorrect",
];

const YAHOO_NOT_FOUND_PHRASES: &[&str] = &[
    "we couldn't find this account",
    "we don't recognize this email",
    "no account exists with this email address",
    "désolé, nous ne reconnaissons pas cette adresse mail",
];

const GENERIC_NOT_FOUND_PHRASES: &[&str] = &[
    "email not found",
    "user not found",
    "account not found",
    "no account",
    "doesn't exist",
    "invalid email",
    "email address is incorrect",
];

/// Lowercased phrases indicating nonexistence, provider-specific first.
pub fn not_found_phrases(provider: &Provider) -> Vec<&'static str> {
    let specific: &[&str] = match provider {
        Provider::Gmail | Provider::CustomGoogle => GOOGLE_NOT_FOUND_PHRASES,
        Provider::Microsoft => MICROSOFT_NOT_FOUND_PHRASES,
        Provider::Yahoo => YAHOO_NOT_FOUND_PHRASES,
        _ => &[],
    };
    specific
        .iter()
        .chain(GENERIC_NOT_FOUND_PHRASES.iter())
        .copied()
        .collect()
}

/// Whether a password input is a decoy based on its attributes.
pub fn is_hidden_password(
    class: Option<&str>,
    aria_hidden: Option<&str>,
    tabindex: Option<&str>,
) -> bool {
    if aria_hidden == Some("true") || tabindex == Some("-1") {
        return true;
    }
    class.is_some_and(|classes| {
        HIDDEN_PASSWORD_CLASSES
            .iter()
            .any(|hidden| classes.contains(hidden))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_phrases_include_generics() {
        let phrases = not_found_phrases(&Provider::Gmail);
        assert!(phrases.contains(&"couldn't find your google account"));
        assert!(phrases.contains(&"user not found"));

        let custom = not_found_phrases(&Provider::Custom);
        assert!(custom.contains(&"account not found"));
        assert!(!custom.contains(&"couldn't find your google account"));
    }

    #[test]
    fn hidden_password_markers() {
        assert!(is_hidden_password(None, Some("true"), None));
        assert!(is_hidden_password(None, None, Some("-1")));
        assert!(is_hidden_password(Some("input moveOffScreen"), None, None));
        assert!(is_hidden_password(Some("x Hvu6D y"), None, None));
        assert!(!is_hidden_password(Some("form-control"), Some("false"), Some("0")));
    }

    #[test]
    fn selector_tables_are_nonempty() {
        assert!(!EMAIL_FIELD_SELECTORS.is_empty());
        assert!(!NEXT_BUTTON_SELECTORS.is_empty());
        assert!(NEXT_BUTTON_TEXTS.contains(&"Next"));
    }
}
