//! Wallet credentials loaded from the environment
//!
//! `PRIVATE_KEYS` holds a comma separated list of signing keys. An optional
//! `WALLET_ADDRESSES` list, when present, must name the same wallets in the
//! same order. On a terminal the operator can enter wallets interactively,
//! which (re)writes the `.env` file.

use crate::error::{CyclerError, CyclerResult};

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use ethers::utils::to_checksum;
use std::fmt;
use std::io::IsTerminal;
use std::path::Path;
use tracing::{debug, info, warn};

/// Credential file read by [`load_credentials`]
pub const ENV_FILE: &str = ".env";

/// Address and signing key of one wallet; held only in memory
#[derive(Clone)]
pub struct WalletCredential {
    address: Address,
    signer: LocalWallet,
}

impl WalletCredential {
    /// Parse a hex private key and bind it to `chain_id`
    pub fn from_private_key(key: &str, chain_id: u64) -> CyclerResult<Self> {
        let signer = key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| CyclerError::Wallet(format!("Invalid private key: {}", e)))?
            .with_chain_id(chain_id);

        Ok(Self {
            address: signer.address(),
            signer,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn signer(&self) -> &LocalWallet {
        &self.signer
    }
}

impl fmt::Debug for WalletCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletCredential")
            .field("address", &self.address)
            .field("signing_key", &"***REDACTED***")
            .finish()
    }
}

/// Offer interactive wallet entry before credentials are loaded.
///
/// Prompts when `path` does not exist, or when it does and the operator
/// declines to reuse it. Does nothing when stdin is not a terminal.
pub fn setup_env_interactive(path: &Path) -> CyclerResult<()> {
    if !std::io::stdin().is_terminal() {
        debug!("stdin is not a terminal, skipping interactive wallet setup");
        return Ok(());
    }

    let theme = ColorfulTheme::default();
    if path.exists() {
        let reuse = Confirm::with_theme(&theme)
            .with_prompt(format!("{} file already exists. Use previous wallets?", path.display()))
            .default(true)
            .interact()
            .map_err(prompt_error)?;
        if reuse {
            info!("Using existing {}", path.display());
            return Ok(());
        }
    }

    let wallets = prompt_wallets(&theme)?;
    write_env_file(path, &wallets)?;
    info!("Wrote {} wallets to {}", wallets.len(), path.display());
    Ok(())
}

fn prompt_wallets(theme: &ColorfulTheme) -> CyclerResult<Vec<(Address, String)>> {
    println!("=== Multi-wallet Setup ===");
    let count: usize = Input::with_theme(theme)
        .with_prompt("How many wallets do you want to configure?")
        .validate_with(|n: &usize| if *n > 0 { Ok(()) } else { Err("enter at least 1") })
        .interact_text()
        .map_err(prompt_error)?;

    let mut wallets = Vec::with_capacity(count);
    for i in 0..count {
        println!("\nWallet #{}:", i + 1);
        let address: Address = Input::<String>::with_theme(theme)
            .with_prompt("Public address (0x...)")
            .validate_with(|s: &String| {
                s.trim().parse::<Address>().map(|_| ()).map_err(|e| e.to_string())
            })
            .interact_text()
            .map_err(prompt_error)?
            .trim()
            .parse()
            .map_err(|e| CyclerError::Wallet(format!("Invalid address: {}", e)))?;

        // Re-ask until the key actually controls the address
        let key = loop {
            let key = Password::with_theme(theme)
                .with_prompt("Private key")
                .interact()
                .map_err(prompt_error)?;
            match key.trim().parse::<LocalWallet>() {
                Ok(signer) if signer.address() == address => break key.trim().to_string(),
                Ok(signer) => warn!("Key belongs to {:?}, not {:?}", signer.address(), address),
                Err(e) => warn!("Invalid private key: {}", e),
            }
        };
        wallets.push((address, key));
    }
    Ok(wallets)
}

/// `.env` contents listing the wallets in order
fn render_env(wallets: &[(Address, String)]) -> String {
    let addresses: Vec<String> = wallets.iter().map(|(a, _)| to_checksum(a, None)).collect();
    let keys: Vec<&str> = wallets.iter().map(|(_, k)| k.as_str()).collect();
    format!(
        "WALLET_ADDRESSES={}\nPRIVATE_KEYS={}\n",
        addresses.join(","),
        keys.join(",")
    )
}

fn write_env_file(path: &Path, wallets: &[(Address, String)]) -> CyclerResult<()> {
    std::fs::write(path, render_env(wallets))
        .map_err(|e| CyclerError::Wallet(format!("Failed to write {}: {}", path.display(), e)))
}

fn prompt_error(err: dialoguer::Error) -> CyclerError {
    CyclerError::Wallet(format!("Wallet prompt failed: {}", err))
}

/// Load credentials from the process environment (and `.env`, if present)
pub fn load_credentials(chain_id: u64) -> CyclerResult<Vec<WalletCredential>> {
    if dotenv::dotenv().is_ok() {
        debug!("Loaded .env file");
    }

    let keys = std::env::var("PRIVATE_KEYS").map_err(|_| {
        CyclerError::Wallet("No wallets configured. Set PRIVATE_KEYS in the environment or .env".to_string())
    })?;
    let addresses = std::env::var("WALLET_ADDRESSES").ok();

    let credentials = parse_credentials(&keys, addresses.as_deref(), chain_id)?;
    info!("Loaded {} wallets", credentials.len());
    Ok(credentials)
}

/// Parse comma separated keys, checking them against the expected addresses
fn parse_credentials(
    keys: &str,
    addresses: Option<&str>,
    chain_id: u64,
) -> CyclerResult<Vec<WalletCredential>> {
    let credentials = split_list(keys)
        .into_iter()
        .map(|key| WalletCredential::from_private_key(key, chain_id))
        .collect::<CyclerResult<Vec<_>>>()?;

    if credentials.is_empty() {
        return Err(CyclerError::Wallet("PRIVATE_KEYS is empty".to_string()));
    }

    if let Some(addresses) = addresses {
        let expected = split_list(addresses);
        if expected.len() != credentials.len() {
            return Err(CyclerError::Wallet(format!(
                "WALLET_ADDRESSES lists {} wallets but PRIVATE_KEYS lists {}",
                expected.len(),
                credentials.len()
            )));
        }

        for (i, (raw, credential)) in expected.iter().zip(&credentials).enumerate() {
            let address = raw.parse::<Address>().map_err(|e| {
                CyclerError::Wallet(format!("Invalid address for wallet #{}: {}", i + 1, e))
            })?;
            if address != credential.address() {
                return Err(CyclerError::Wallet(format!(
                    "Wallet #{} key belongs to {:?}, not {:?}",
                    i + 1,
                    credential.address(),
                    address
                )));
            }
        }
    }

    Ok(credentials)
}

fn split_list(input: &str) -> Vec<&str> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
