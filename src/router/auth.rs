use std::collections::HashMap;

use thiserror::Error;

use crate::models::identity::Identity;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,

    #[error("invalid credential")]
    InvalidCredential,
}

/// Resolves a bearer credential presented at connect time.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, credential: &str) -> Result<Identity, AuthError>;
}

/// Fixed token table, loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenAuthenticator {
    pub fn new(tokens: HashMap<String, Identity>) -> Self {
        Self { tokens }
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn authenticate(&self, credential: &str) -> Result<Identity, AuthError> {
        self.tokens
            .get(credential)
            .copied()
            .ok_or(AuthError::InvalidCredential)
    }
}

/// Parses `token=kind:id` pairs separated by `;`.
pub fn parse_token_table(raw: &str) -> Result<HashMap<String, Identity>, String> {
    let mut tokens = HashMap::new();

    for pair in raw.split(';').map(str::trim).filter(|pair| !pair.is_empty()) {
        let (token, identity) = pair
            .split_once('=')
            .ok_or_else(|| format!("token entry `{pair}` must look like token=kind:id"))?;

        let token = token.trim();
        if token.is_empty() {
            return Err(format!("token entry `{pair}` has an empty token"));
        }

        tokens.insert(token.to_string(), identity.parse::<Identity>()?);
    }

    Ok(tokens)
}

/// Picks the credential from an `Authorization: Bearer` header, falling back
/// to a `token` query parameter for browser clients.
pub fn bearer_credential<'a>(
    authorization: Option<&'a str>,
    query_token: Option<&'a str>,
) -> Option<&'a str> {
    let from_header = authorization
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    from_header.or_else(|| query_token.map(str::trim).filter(|token| !token.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::{AuthError, Authenticator, StaticTokenAuthenticator, bearer_credential, parse_token_table};
    use crate::models::identity::Identity;

    #[test]
    fn parses_token_table() {
        let tokens = parse_token_table("abc=driver:7; def=rider:3;;ghi=admin:1").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens["abc"], Identity::driver(7));
        assert_eq!(tokens["ghi"], Identity::admin(1));

        assert!(parse_token_table("abc").is_err());
        assert!(parse_token_table("=driver:1").is_err());
        assert!(parse_token_table("abc=pilot:1").is_err());
    }

    #[test]
    fn unknown_tokens_are_rejected() {
        let auth = StaticTokenAuthenticator::new(parse_token_table("abc=driver:7").unwrap());
        assert_eq!(auth.authenticate("abc"), Ok(Identity::driver(7)));
        assert_eq!(auth.authenticate("nope"), Err(AuthError::InvalidCredential));
    }

    #[test]
    fn header_wins_over_query() {
        assert_eq!(bearer_credential(Some("Bearer abc"), Some("def")), Some("abc"));
        assert_eq!(bearer_credential(Some("Basic abc"), Some("def")), Some("def"));
        assert_eq!(bearer_credential(None, Some(" ")), None);
        assert_eq!(bearer_credential(None, None), None);
    }
}
