//! `SecretsProvider` backed by process environment variables. `Config`
//! reads `EXCHANGE_KEY`/`EXCHANGE_SECRET` itself only to validate presence
//! at startup; runtime adapters go through this instead so the raw strings
//! don't get threaded through bootstrap as plain fields.

use anyhow::Result;

use crate::domain::ports::SecretsProvider;

pub struct EnvSecretsProvider {
    exchange_api_key: String,
    exchange_api_secret: String,
}

impl EnvSecretsProvider {
    pub fn new(exchange_api_key: String, exchange_api_secret: String) -> Self {
        Self { exchange_api_key, exchange_api_secret }
    }
}

impl SecretsProvider for EnvSecretsProvider {
    fn exchange_api_key(&self) -> Result<String> {
        if self.exchange_api_key.is_empty() {
            anyhow::bail!("EXCHANGE_KEY is not set");
        }
        Ok(self.exchange_api_key.clone())
    }

    fn exchange_api_secret(&self) -> Result<String> {
        if self.exchange_api_secret.is_empty() {
            anyhow::bail!("EXCHANGE_SECRET is not set");
        }
        Ok(self.exchange_api_secret.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_secret_is_an_error() {
        let provider = EnvSecretsProvider::new(String::new(), "s".to_string());
        assert!(provider.exchange_api_key().is_err());
    }

    #[test]
    fn present_secrets_are_returned() {
        let provider = EnvSecretsProvider::new("k".to_string(), "s".to_string());
        assert_eq!(provider.exchange_api_key().unwrap(), "k");
        assert_eq!(provider.exchange_api_secret().unwrap(), "s");
    }
}
