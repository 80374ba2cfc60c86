//! Provider credentials for the insight call, kept in `<home>/auth.json`.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use crate::insight::Provider;
use crate::state::ensure_tally_home;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AuthState {
    pub anthropic_token: Option<String>,
    pub openai_api_key: Option<String>,
}

impl AuthState {
    pub fn key_for(&self, provider: Provider) -> Option<&str> {
        let key = match provider {
            Provider::Anthropic => &self.anthropic_token,
            Provider::OpenAI => &self.openai_api_key,
        };
        key.as_deref().filter(|k| !k.is_empty())
    }

    /// Store a pasted key after checking the provider's prefix.
    pub fn set_key(&mut self, provider: Provider, key: &str) -> Result<()> {
        let key = key.trim();
        if !key.starts_with(provider.key_prefix()) {
            bail!(
                "that doesn't look like an {} key (expected prefix {})",
                provider.label(),
                provider.key_prefix()
            );
        }
        let slot = match provider {
            Provider::Anthropic => &mut self.anthropic_token,
            Provider::OpenAI => &mut self.openai_api_key,
        };
        *slot = Some(key.to_string());
        Ok(())
    }
}

fn auth_path() -> Result<PathBuf> {
    Ok(ensure_tally_home()?.join("auth.json"))
}

pub fn load_auth() -> Result<AuthState> {
    load_auth_from(&auth_path()?)
}

/// A missing file means no stored keys.
pub fn load_auth_from(p: &Path) -> Result<AuthState> {
    if !p.exists() {
        return Ok(AuthState::default());
    }
    let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

/// Written owner-only on unix.
pub fn save_auth_to(p: &Path, auth: &AuthState) -> Result<()> {
    let s = serde_json::to_string_pretty(auth)?;
    fs::write(p, s).with_context(|| format!("write {}", p.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(p, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("chmod {}", p.display()))?;
    }
    Ok(())
}

/// `sk-ant-…wxyz`
fn masked(key: &str) -> String {
    let tail: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    let head: String = key.chars().take(7).collect();
    format!("{head}…{tail}")
}

fn read_secret(input: &mut impl BufRead, label: &str) -> Result<String> {
    print!("{label}: ");
    io::stdout().flush().ok();
    let mut s = String::new();
    input.read_line(&mut s).context("read key from stdin")?;
    Ok(s.trim().to_string())
}

/// `tally auth paste-*`: read one key from stdin and store it.
pub fn paste_key(provider: Provider) -> Result<()> {
    let path = auth_path()?;
    let mut auth = load_auth_from(&path)?;
    let label = format!("Paste {} API key (starts with {})", provider.label(), provider.key_prefix());
    let key = read_secret(&mut io::stdin().lock(), &label)?;
    auth.set_key(provider, &key)?;
    save_auth_to(&path, &auth)?;
    println!("Saved {} key {} to {}", provider.label(), masked(&key), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_key_checks_prefix() {
        let mut auth = AuthState::default();
        assert!(auth.set_key(Provider::Anthropic, "sk-proj-123").is_err());
        assert_eq!(auth.key_for(Provider::Anthropic), None);

        auth.set_key(Provider::Anthropic, "  sk-ant-abc123\n").unwrap();
        auth.set_key(Provider::OpenAI, "sk-test-999").unwrap();
        assert_eq!(auth.key_for(Provider::Anthropic), Some("sk-ant-abc123"));
        assert_eq!(auth.key_for(Provider::OpenAI), Some("sk-test-999"));
    }

    #[test]
    fn test_empty_key_counts_as_missing() {
        let auth = AuthState {
            openai_api_key: Some(String::new()),
            ..AuthState::default()
        };
        assert_eq!(auth.key_for(Provider::OpenAI), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("auth.json");
        assert_eq!(load_auth_from(&p).unwrap(), AuthState::default());

        let mut auth = AuthState::default();
        auth.set_key(Provider::OpenAI, "sk-live").unwrap();
        save_auth_to(&p, &auth).unwrap();
        assert_eq!(load_auth_from(&p).unwrap(), auth);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&p).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_read_secret_trims() {
        let mut input = io::Cursor::new("  sk-ant-xyz  \n");
        assert_eq!(read_secret(&mut input, "key").unwrap(), "sk-ant-xyz");
    }

    #[test]
    fn test_masked() {
        assert_eq!(masked("sk-ant-api03-abcdwxyz"), "sk-ant-…wxyz");
    }
}
