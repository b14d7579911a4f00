use messenger_shared::types::auth::verify_access_token;

/// Extract the `token` parameter from a handshake query string.
pub fn token_from_query(query: Option<&str>) -> Option<&str> {
    query?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == "token" && !value.is_empty()).then_some(value)
    })
}

/// Resolve the caller id carried by the handshake, if any. Failed
/// verification is not fatal: the connection stays open without an identity.
pub fn resolve(query: Option<&str>, secret: &str, leeway_secs: u64) -> Option<i64> {
    let token = token_from_query(query)?;
    match verify_access_token(token, secret, leeway_secs) {
        Ok(user) => Some(user.id),
        Err(e) => {
            tracing::warn!(error = %e, code = ?e.code(), "socket token rejected, connection stays anonymous");
            None
        }
    }
}
