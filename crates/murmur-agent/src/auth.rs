//! API key lookup for the generative model endpoint

use murmur_core::{MurmurError, Result};
use std::env;

/// Read the API key from the environment variable named by `api_key_env`
pub fn get_api_key(api_key_env: &str) -> Result<String> {
    match env::var(api_key_env) {
        Ok(key) if !key.trim().is_empty() => {
            tracing::info!("Using API key from {}", api_key_env);
            Ok(key.trim().to_string())
        }
        _ => Err(MurmurError::Auth(format!(
            "No API key found. Set {}=<key> (or change model.api_key_env in murmur.toml)",
            api_key_env
        ))),
    }
}
