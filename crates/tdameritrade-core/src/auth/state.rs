use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

use super::AuthError;

const STATE_BYTE_LEN: usize = 32;

/// Generate an unguessable CSRF state value: 256 bits from the OS RNG, base64url without padding.
pub fn generate_state() -> Result<String, AuthError> {
    let mut bytes = [0u8; STATE_BYTE_LEN];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(AuthError::RandomnessUnavailable)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn state_is_url_safe_and_unpadded() {
        let state = generate_state().unwrap();
        assert_eq!(state.len(), 43);
        assert!(state
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn state_differs_between_calls() {
        let seen: HashSet<String> = (0..64).map(|_| generate_state().unwrap()).collect();
        assert_eq!(seen.len(), 64);
    }
}
