use seed_vault::{FileStore, MnemonicStrength, SecureMnemonic, Vault, VaultConfig, VaultStatus};
use std::io::{self, Write};
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Seed Vault Demo");
    println!("===============");

    let storage_dir = Path::new("./wallet-data");
    let config_path = storage_dir.join("vault.json");
    let config = if config_path.exists() {
        VaultConfig::from_json_file(&config_path)?
    } else {
        VaultConfig::default()
    };

    let store = FileStore::new(storage_dir, "main")?;
    let mut vault = Vault::open(store, config)?;

    match vault.status() {
        VaultStatus::Locked => {
            println!("Loading existing wallet...");
            loop {
                let password = prompt_password("Enter your wallet password: ")?;
                match vault.unlock(&password) {
                    Ok(()) => break,
                    Err(seed_vault::VaultError::InvalidPassword) => {
                        println!("Wrong password ({} failed attempts)", vault.failed_unlock_attempts());
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        _ => {
            println!("Creating new wallet...");
            let mnemonic = SecureMnemonic::generate(MnemonicStrength::Words12)?;

            println!("\nIMPORTANT: Write down your mnemonic phrase and store it securely!");
            println!("Mnemonic: {}\n", mnemonic.phrase());

            let password = prompt_password("Choose a wallet password: ")?;
            let confirmation = prompt_password("Confirm the password: ")?;
            vault.create_with_mnemonic(mnemonic, &password, &confirmation)?;
        }
    }

    vault.add_account()?;

    println!("\nAccounts:");
    for keypair in vault.keypairs()? {
        println!(
            "  #{:<3} {}",
            keypair.account_index(),
            keypair.public_key_base58()
        );
    }

    vault.lock();
    println!("\nVault locked.");
    Ok(())
}

fn prompt_password(prompt: &str) -> Result<String, Box<dyn std::error::Error>> {
    print!("{}", prompt);
    io::stdout().flush()?;
    Ok(rpassword::read_password()?)
}
