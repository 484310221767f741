//! Cross-site request forgery protection.
//!
//! Each session is issued a random seed on first contact. The token forms
//! must submit is `sign(seed, secret)`: it is never stored, only recomputed
//! and published on the request's scratch flags for templates to embed.
//!
//! `sign` hashes `seed || secret` with SHA-1. That is plain concatenation,
//! not an HMAC; it is kept so tokens stay compatible with existing clients.

use rand::RngCore;
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::controller::Controller;
use crate::error::ControllerError;
use crate::transport::Payload;

/// Parameter name used when none is configured.
pub const DEFAULT_PARAM: &str = "authenticity_token";

/// Only this method is verified; every other method passes unchecked.
const MUTATING_METHOD: &str = "POST";

const SEED_BYTES: usize = 16;

fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Hex SHA-1 of the seed followed by the secret.
pub fn sign(seed: &str, secret: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(seed.as_bytes());
    hasher.update(secret.as_bytes());
    bytes_to_hex(&hasher.finalize())
}

/// A fresh random session seed.
pub fn generate_seed() -> String {
    let mut seed = [0u8; SEED_BYTES];
    rand::thread_rng().fill_bytes(&mut seed);
    bytes_to_hex(&seed)
}

/// Constant-time token comparison.
pub fn tokens_match(submitted: &str, expected: &str) -> bool {
    submitted.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Package [`Controller::protect_from_forgery`] as a before-filter.
pub fn filter(
    secret: impl Into<String>,
    param_name: Option<&str>,
) -> impl Fn(&mut Controller<'_>) -> Result<(), ControllerError> + Send + Sync + 'static {
    let secret = secret.into();
    let param_name = param_name.map(str::to_string);
    move |controller| controller.protect_from_forgery(&secret, param_name.as_deref())
}

enum Verdict {
    Advance,
    Reject,
}

impl<'a> Controller<'a> {
    /// Verify the request's CSRF token, issuing a seed on first contact.
    ///
    /// Requests without a session and non-POST requests always advance. A
    /// POST against an established seed must carry `param_name` equal to the
    /// current token, otherwise the response becomes a 403 and the chain
    /// stops here.
    pub fn protect_from_forgery(
        &mut self,
        secret: &str,
        param_name: Option<&str>,
    ) -> Result<(), ControllerError> {
        let param_name = param_name.unwrap_or(DEFAULT_PARAM);
        let request = self.request_mut()?;

        let verdict = match request.session.as_mut() {
            None => Verdict::Advance,
            Some(session) => match session.csrf_seed() {
                None => {
                    let seed = generate_seed();
                    session.set_csrf_seed(seed.as_str());
                    request.scratch.csrf_param = Some(param_name.to_string());
                    request.scratch.csrf_token = Some(sign(&seed, secret));
                    Verdict::Advance
                }
                Some(seed) => {
                    let token = sign(&seed, secret);
                    let verdict = if request.original_method != MUTATING_METHOD {
                        Verdict::Advance
                    } else {
                        match request.param_str(param_name) {
                            Some(submitted) if tokens_match(submitted, &token) => {
                                Verdict::Advance
                            }
                            _ => Verdict::Reject,
                        }
                    };
                    request.scratch.csrf_param = Some(param_name.to_string());
                    request.scratch.csrf_token = Some(token);
                    verdict
                }
            },
        };

        match verdict {
            Verdict::Advance => {
                self.next();
                Ok(())
            }
            Verdict::Reject => {
                warn!(
                    controller = %self.controller_name(),
                    path = %self.request()?.path,
                    "Incorrect authenticity token"
                );
                self.send(Payload::Status(403))
            }
        }
    }

    /// Whether a CSRF token was published for this request.
    pub fn protected_from_forgery(&self) -> bool {
        self.request()
            .map(|req| req.scratch.csrf_token.is_some() && req.scratch.csrf_param.is_some())
            .unwrap_or(false)
    }
}
