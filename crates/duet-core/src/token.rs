//! Random token generation for project-scoped API tokens.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand_core::{OsRng, RngCore as _};

/// Prefix marking a token as project-scoped (safe to embed in client code).
pub const PROJECT_TOKEN_PREFIX: &str = "phc_";

const TOKEN_BYTES: usize = 32;

/// A URL-safe random token with `nbytes` bytes of entropy.
pub fn generate_random_token(nbytes: usize) -> String {
  let mut buf = vec![0u8; nbytes];
  OsRng.fill_bytes(&mut buf);
  URL_SAFE_NO_PAD.encode(buf)
}

/// A fresh project API token, e.g. `phc_3q2...`.
pub fn generate_project_token() -> String {
  format!("{PROJECT_TOKEN_PREFIX}{}", generate_random_token(TOKEN_BYTES))
}
