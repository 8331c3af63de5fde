//! The files of a local agent.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bsky_auth::SecretKey;
use serde::{Deserialize, Serialize};

/// Server used when none is given.
pub const DEFAULT_SERVER: &str = "http://localhost:8080";

/// Resource kind for account attenuations, must match the server.
pub const DEFAULT_ACCOUNT_KIND: &str = "bsky";

/// Who the agent acts for, stored as `account.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    pub did: String,
    pub server: String,
    #[serde(default = "default_account_kind")]
    pub account_kind: String,
}

fn default_account_kind() -> String {
    DEFAULT_ACCOUNT_KIND.to_string()
}

/// Layout of an agent directory.
#[derive(Debug, Clone)]
pub struct AgentDir {
    root: PathBuf,
}

impl AgentDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$BSKY_DIR`, or `bsky` in the platform data directory.
    pub fn from_env() -> Result<Self> {
        let root = match std::env::var_os("BSKY_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs_next::data_dir()
                .context("operating environment provides no directory for application data")?
                .join("bsky"),
        };
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn account_path(&self) -> PathBuf {
        self.root.join("account.json")
    }

    pub fn key_path(&self) -> PathBuf {
        self.root.join("bsky.key")
    }

    pub fn blocks_path(&self) -> PathBuf {
        self.root.join("blocks.db")
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join("index.db")
    }

    pub fn exists(&self) -> bool {
        self.account_path().exists()
    }

    pub fn load_account(&self) -> Result<Account> {
        let path = self.account_path();
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("invalid {}", path.display()))
    }

    pub fn save_account(&self, account: &Account) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        let data = serde_json::to_string_pretty(account)?;
        std::fs::write(self.account_path(), data)?;
        Ok(())
    }

    pub fn load_key(&self) -> Result<SecretKey> {
        let path = self.key_path();
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(data.parse()?)
    }

    pub fn save_key(&self, key: &SecretKey) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(self.key_path(), key.to_string())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_files() -> testresult::TestResult {
        let tmp = tempfile::tempdir()?;
        let dir = AgentDir::new(tmp.path().join("agent"));
        assert!(!dir.exists());

        let key = SecretKey::generate();
        let account = Account {
            name: "alice".into(),
            did: key.did(),
            server: DEFAULT_SERVER.into(),
            account_kind: DEFAULT_ACCOUNT_KIND.into(),
        };
        dir.save_account(&account)?;
        dir.save_key(&key)?;
        assert!(dir.exists());
        assert_eq!(dir.load_account()?, account);
        assert_eq!(dir.load_key()?.did(), key.did());
        Ok(())
    }

    #[test]
    fn account_kind_defaults() -> testresult::TestResult {
        let account: Account =
            serde_json::from_str(r#"{"name":"a","did":"did:key:z","server":"http://x"}"#)?;
        assert_eq!(account.account_kind, DEFAULT_ACCOUNT_KIND);
        Ok(())
    }
}
