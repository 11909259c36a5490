//! Token and link helpers for the email sign-in flow.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use url::Url;

/// Random URL-safe token, 32 bytes of entropy.
fn generate_token(purpose: &str) -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .with_context(|| format!("failed to generate {purpose} token"))?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Token mailed to the user; only its hash is stored.
pub(super) fn generate_verification_token() -> Result<String> {
    generate_token("verification")
}

/// Session token set in the cookie and stored as the session key.
pub(super) fn generate_session_token() -> Result<String> {
    generate_token("session")
}

/// Hash a verification token with the auth secret, hex encoded.
pub(super) fn hash_verification_token(token: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Link sent in the sign-in email.
pub(super) fn build_callback_url(
    base: &Url,
    callback_url: &Url,
    token: &str,
    email: &str,
) -> Result<Url> {
    let mut url = base
        .join("/api/auth/callback/email")
        .context("failed to build email callback URL")?;
    url.query_pairs_mut()
        .append_pair("callbackUrl", callback_url.as_str())
        .append_pair("token", token)
        .append_pair("email", email);
    Ok(url)
}

/// Subject, text and HTML bodies of the sign-in email.
pub(super) fn sign_in_email(url: &Url, host: &str) -> (String, String, String) {
    let subject = format!("Sign in to {host}");
    let text = format!("Sign in to {host}\n{url}\n\n");
    let html = format!(
        "<p>Sign in to <strong>{host}</strong></p>\
         <p><a href=\"{url}\">Sign in</a></p>\
         <p>If you did not request this email you can safely ignore it.</p>"
    );
    (subject, text, html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_decode_to_32_bytes() {
        let decoded_len = generate_verification_token()
            .ok()
            .and_then(|token| Base64UrlUnpadded::decode_vec(&token).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
    }

    #[test]
    fn generated_tokens_differ() {
        let first = generate_session_token().ok();
        let second = generate_session_token().ok();
        assert!(first.is_some());
        assert_ne!(first, second);
    }

    #[test]
    fn hash_depends_on_token_and_secret() {
        let hash = hash_verification_token("token", "secret");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_verification_token("token", "secret"));
        assert_ne!(hash, hash_verification_token("other", "secret"));
        assert_ne!(hash, hash_verification_token("token", "other"));
    }

    #[test]
    fn hash_matches_sha256_of_token_then_secret() {
        // sha256("abc")
        assert_eq!(
            hash_verification_token("a", "bc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn callback_url_carries_token_email_and_destination() -> Result<()> {
        let base = Url::parse("https://fluent-flow.dev/")?;
        let destination = Url::parse("https://fluent-flow.dev/lists")?;
        let url = build_callback_url(&base, &destination, "t0k", "a+b@example.com")?;

        assert_eq!(url.path(), "/api/auth/callback/email");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("callbackUrl".to_string(), destination.to_string()),
                ("token".to_string(), "t0k".to_string()),
                ("email".to_string(), "a+b@example.com".to_string()),
            ]
        );
        Ok(())
    }

    #[test]
    fn sign_in_email_mentions_host_and_link() -> Result<()> {
        let url = Url::parse("https://fluent-flow.dev/api/auth/callback/email?token=x")?;
        let (subject, text, html) = sign_in_email(&url, "fluent-flow.dev");
        assert_eq!(subject, "Sign in to fluent-flow.dev");
        assert!(text.contains(url.as_str()));
        assert!(html.contains(url.as_str()));
        Ok(())
    }
}
